//! RMI4 function discovery and decoding
//!
//! Built on the register transport from `rmi4-transport`:
//!
//! - [`pdt::scan`] walks the Page Description Table,
//! - [`f11`] and [`f30`] read the touch sensor and button controller
//!   parameters and decode their attention data,
//! - [`AttentionDispatcher`] splits attention reports between functions,
//! - [`Rmi4Device`] ties it together behind `initialize` / `on_report` /
//!   `shutdown`.

pub mod device;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod f11;
pub mod f30;
pub mod function;
pub mod pdt;

pub use device::{Capabilities, Consumed, DeviceState, Rmi4Device};
pub use dispatch::{AttentionDispatcher, FunctionHandler};
pub use error::{DecodeError, DeviceError};
pub use events::{InputEvent, InputSink, RecordingSink, TouchContact};
pub use f11::TouchFunction;
pub use f30::ButtonFunction;
pub use function::{FunctionDescriptor, F11, F30};
pub use pdt::FunctionRegistry;

// Re-export the transport so consumers need a single dependency
pub use rmi4_transport;
