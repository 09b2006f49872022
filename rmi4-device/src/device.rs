//! RMI4 device lifecycle
//!
//! ```text
//!            initialize()            mouse report [01][00]
//!   IDLE ──────────────────► ARMED ─────────────────────► RESETTING
//!    ▲                         ▲                               │
//!    │ shutdown()              └──── reset worker: set_mode ───┘
//!    └──────────────── (any state)
//! ```
//!
//! Attention reports are decoded only while ARMED. The re-arm after a
//! fallback to mouse mode runs on a dedicated worker thread: the report
//! delivery path must never block on the transport.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use rmi4_transport::report::{self, InboundReport};
use rmi4_transport::{PagedTransport, RmiMode, TransportError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::{AttentionDispatcher, FunctionHandler};
use crate::error::DeviceError;
use crate::events::InputSink;
use crate::f11::{self, TouchFunction};
use crate::f30::{self, ButtonFunction};
use crate::pdt;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    /// Not started or shut down
    Idle = 0,
    /// Attention reports are being decoded
    Armed = 1,
    /// Device fell back to mouse mode; a re-arm is queued
    Resetting = 2,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Armed,
            2 => Self::Resetting,
            _ => Self::Idle,
        }
    }
}

/// State shared between the delivery path and the reset worker
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(DeviceState::Idle as u8))
    }

    fn load(&self) -> DeviceState {
        DeviceState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: DeviceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`; false if the state was not `from`
    fn transition(&self, from: DeviceState, to: DeviceState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Whether `on_report` acted on a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    Handled,
    Ignored,
}

/// What the device can report, for registering it with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub max_fingers: u8,
    pub max_x: u16,
    pub max_y: u16,
    pub x_size_mm: Option<u16>,
    pub y_size_mm: Option<u16>,
    /// Units per millimeter (x, y)
    pub resolution: Option<(u16, u16)>,
    pub button_count: u8,
    /// A single button under the whole surface (clickpad)
    pub is_buttonpad: bool,
}

impl Capabilities {
    pub fn new(touch: &TouchFunction, buttons: Option<&ButtonFunction>) -> Self {
        let button_count = buttons.map_or(0, ButtonFunction::button_count);
        Self {
            max_fingers: touch.max_fingers,
            max_x: touch.max_x,
            max_y: touch.max_y,
            x_size_mm: touch.x_size_mm,
            y_size_mm: touch.y_size_mm,
            resolution: touch.resolution(),
            button_count,
            is_buttonpad: button_count == 1,
        }
    }
}

/// Worker thread that re-issues the mode-select command
struct ResetWorker {
    tx: Option<mpsc::UnboundedSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ResetWorker {
    fn spawn(transport: Arc<PagedTransport>, state: Arc<StateCell>) -> Result<Self, DeviceError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let handle = std::thread::Builder::new()
            .name("rmi-reset".into())
            .spawn(move || {
                debug!("Reset worker started");
                while rx.blocking_recv().is_some() {
                    // set_mode logs its own failure
                    if transport.set_mode(RmiMode::AttnReports).is_ok() {
                        info!("Attention reports re-armed");
                    }
                    // Back to ARMED either way so the next mouse report retries
                    state.transition(DeviceState::Resetting, DeviceState::Armed);
                }
                debug!("Reset worker exiting");
            })
            .map_err(|e| TransportError::Internal(format!("spawn reset worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn schedule(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(()).is_ok())
    }

    fn stop(&mut self) {
        // Closing the channel ends the worker loop
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Reset worker thread panicked");
            }
        }
    }
}

impl Drop for ResetWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// An RMI4 touchpad behind a paged HID transport
///
/// Inbound reports from the device must be fed to [`Rmi4Device::on_report`],
/// including while [`Rmi4Device::initialize`] is running: register reads are
/// answered through the same path.
pub struct Rmi4Device {
    transport: Arc<PagedTransport>,
    sink: Arc<dyn InputSink>,
    state: Arc<StateCell>,
    dispatcher: RwLock<Option<AttentionDispatcher>>,
    capabilities: Mutex<Option<Capabilities>>,
    /// Also serializes initialize against shutdown
    reset_worker: Mutex<Option<ResetWorker>>,
}

impl Rmi4Device {
    pub fn new(transport: Arc<PagedTransport>, sink: Arc<dyn InputSink>) -> Self {
        Self {
            transport,
            sink,
            state: Arc::new(StateCell::new()),
            dispatcher: RwLock::new(None),
            capabilities: Mutex::new(None),
            reset_worker: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &Arc<PagedTransport> {
        &self.transport
    }

    pub fn state(&self) -> DeviceState {
        self.state.load()
    }

    /// Capabilities found by the last successful `initialize`
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.lock().clone()
    }

    /// Switch the device to attention reports, discover its functions and
    /// start decoding
    ///
    /// On failure nothing is armed and the device stays IDLE.
    pub fn initialize(&self) -> Result<Capabilities, DeviceError> {
        let mut worker_slot = self.reset_worker.lock();
        if worker_slot.is_some() || self.state.load() != DeviceState::Idle {
            return Err(DeviceError::AlreadyStarted);
        }

        self.transport.set_mode(RmiMode::AttnReports)?;
        self.transport
            .set_page(0)
            .inspect_err(|e| error!("Failed to set page select to 0: {}", e))?;

        let registry = pdt::scan(&*self.transport)?;

        let touch_descriptor = registry.touch.ok_or_else(|| {
            error!("No 2D sensor found, giving up");
            DeviceError::Capability("no F11 2D sensor".into())
        })?;
        let touch = f11::populate(&*self.transport, touch_descriptor)
            .inspect_err(|e| error!("Error while initializing F11: {}", e))?;

        let buttons = match registry.buttons {
            Some(descriptor) => match f30::populate(&*self.transport, descriptor) {
                Ok(buttons) => Some(buttons),
                Err(e) => {
                    warn!("Error while initializing F30: {}", e);
                    None
                }
            },
            None => {
                warn!("No GPIO/LEDs found, no buttons");
                None
            }
        };

        let capabilities = Capabilities::new(&touch, buttons.as_ref());

        let mut handlers: Vec<Box<dyn FunctionHandler>> = vec![Box::new(touch)];
        if let Some(buttons) = buttons {
            handlers.push(Box::new(buttons));
        }
        let dispatcher = AttentionDispatcher::new(handlers, registry.irq_mask());

        let worker = ResetWorker::spawn(Arc::clone(&self.transport), Arc::clone(&self.state))?;

        *self.dispatcher.write() = Some(dispatcher);
        *self.capabilities.lock() = Some(capabilities.clone());
        *worker_slot = Some(worker);
        self.state.store(DeviceState::Armed);

        info!(
            "RMI4 device started: {} fingers, {}x{}, {} buttons",
            capabilities.max_fingers,
            capabilities.max_x,
            capabilities.max_y,
            capabilities.button_count
        );
        Ok(capabilities)
    }

    /// Feed one inbound report from the delivery path
    pub fn on_report(&self, report: &[u8]) -> Consumed {
        match report::classify(report) {
            Some(InboundReport::ReadData(data)) => match self.transport.deliver_read_data(data) {
                Ok(()) => Consumed::Handled,
                Err(_) => Consumed::Ignored,
            },
            Some(InboundReport::Attention(attention)) => {
                if self.state.load() != DeviceState::Armed {
                    debug!("Attention report while not armed, dropping");
                    return Consumed::Ignored;
                }
                match self.dispatcher.read().as_ref() {
                    Some(dispatcher) => {
                        dispatcher.dispatch(&attention, &*self.sink);
                        Consumed::Handled
                    }
                    None => {
                        debug!("Attention report with no dispatcher, dropping");
                        Consumed::Ignored
                    }
                }
            }
            Some(InboundReport::MouseEmulation { legacy: true }) => {
                self.schedule_reset();
                Consumed::Ignored
            }
            Some(InboundReport::MouseEmulation { legacy: false })
            | Some(InboundReport::Other(_))
            | None => Consumed::Ignored,
        }
    }

    fn schedule_reset(&self) {
        if !self
            .state
            .transition(DeviceState::Armed, DeviceState::Resetting)
        {
            return;
        }
        info!("Device fell back to mouse mode, scheduling re-arm");
        let scheduled = self
            .reset_worker
            .lock()
            .as_ref()
            .is_some_and(ResetWorker::schedule);
        if !scheduled {
            warn!("Reset worker unavailable, re-arm not scheduled");
            self.state
                .transition(DeviceState::Resetting, DeviceState::Armed);
        }
    }

    /// Stop decoding and stop the reset worker
    ///
    /// Waits for a concurrent `initialize` to finish, then leaves the device
    /// IDLE.
    pub fn shutdown(&self) {
        let worker = {
            let mut worker_slot = self.reset_worker.lock();
            self.state.store(DeviceState::Idle);
            worker_slot.take()
        };
        if let Some(mut worker) = worker {
            worker.stop();
            info!("RMI4 device stopped");
        }
        self.dispatcher.write().take();
    }
}

impl Drop for Rmi4Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}
