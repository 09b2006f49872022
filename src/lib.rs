// RMI4-over-HID touchpad driver - shared library
// Configuration, hidraw discovery and the uinput output device

pub mod config;
pub mod discovery;
pub mod uinput;

pub use config::{DeviceId, DriverConfig};
pub use discovery::{list_devices, open_device, select_device};
pub use uinput::{FrameBuilder, UinputError, UinputSink};
