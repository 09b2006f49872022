//! Decoded input events and the sink they are delivered to

use parking_lot::Mutex;

/// One finger on the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchContact {
    pub x: u16,
    /// Already inverted so that 0 is the top edge
    pub y: u16,
    pub pressure: u8,
    pub touch_major: u8,
    pub touch_minor: u8,
    /// 1 when the contact is wider than it is tall
    pub orientation: u8,
}

/// Event produced by a function decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Slot update; `None` means the slot has no finger
    Contact {
        slot: u8,
        contact: Option<TouchContact>,
    },
    /// Logical button `index` (BTN_LEFT + index)
    Button { index: u8, pressed: bool },
    /// End of a frame
    Sync,
}

/// Consumer of decoded events
///
/// Called from the report delivery path, so implementations must not block
/// for long.
pub trait InputSink: Send + Sync {
    fn emit(&self, event: InputEvent);
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<InputEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events
    pub fn take(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl InputSink for RecordingSink {
    fn emit(&self, event: InputEvent) {
        self.events.lock().push(event);
    }
}
