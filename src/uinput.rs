//! Virtual multi-touch touchpad using evdev/uinput
//!
//! Decoded contacts become type B multi-touch slots with tracking ids.
//! Single-touch pointer emulation (ABS_X/ABS_Y, BTN_TOUCH and the
//! BTN_TOOL_* finger count) is derived from the slots at every frame end.

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent as EvdevEvent, Key, PropType,
    UinputAbsSetup,
};
use parking_lot::Mutex;
use rmi4_device::{Capabilities, InputEvent, InputSink, TouchContact};
use thiserror::Error;
use tracing::{debug, warn};

const PRESSURE_MAX: i32 = 0xff;
const TOUCH_AXIS_MAX: i32 = 0x0f;
const TRACKING_ID_MAX: i32 = 0xffff;

/// BTN_TOOL_* for one to five fingers
const TOOL_KEYS: [Key; 5] = [
    Key::BTN_TOOL_FINGER,
    Key::BTN_TOOL_DOUBLETAP,
    Key::BTN_TOOL_TRIPLETAP,
    Key::BTN_TOOL_QUADTAP,
    Key::BTN_TOOL_QUINTTAP,
];

/// Errors from virtual touchpad operations
#[derive(Debug, Error)]
pub enum UinputError {
    #[error("Failed to create virtual device: {0}")]
    CreateDevice(#[source] std::io::Error),
    #[error("Failed to emit event: {0}")]
    EmitEvent(#[source] std::io::Error),
    #[error("Virtual device already created")]
    AlreadyCreated,
}

fn button_key(index: u8) -> Key {
    Key::new(Key::BTN_LEFT.code() + u16::from(index))
}

fn abs(code: AbsoluteAxisType, value: i32) -> EvdevEvent {
    EvdevEvent::new_now(EventType::ABSOLUTE, code.0, value)
}

fn key(code: Key, pressed: bool) -> EvdevEvent {
    EvdevEvent::new_now(EventType::KEY, code.code(), i32::from(pressed))
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    tracking_id: Option<i32>,
    contact: Option<TouchContact>,
}

/// Translates decoded events into evdev frames
#[derive(Debug)]
pub struct FrameBuilder {
    slots: Vec<Slot>,
    next_tracking_id: i32,
    pending: Vec<EvdevEvent>,
    /// A contact changed since the last frame
    touched: bool,
}

impl FrameBuilder {
    pub fn new(max_fingers: u8) -> Self {
        Self {
            slots: vec![Slot::default(); usize::from(max_fingers)],
            next_tracking_id: 0,
            pending: Vec::new(),
            touched: false,
        }
    }

    /// Feed one event; returns the finished frame on `Sync`
    pub fn push(&mut self, event: InputEvent) -> Option<Vec<EvdevEvent>> {
        match event {
            InputEvent::Contact { slot, contact } => {
                self.contact(slot, contact);
                None
            }
            InputEvent::Button { index, pressed } => {
                self.pending.push(key(button_key(index), pressed));
                None
            }
            InputEvent::Sync => {
                if self.touched {
                    self.pointer_emulation();
                    self.touched = false;
                }
                Some(std::mem::take(&mut self.pending))
            }
        }
    }

    fn contact(&mut self, index: u8, contact: Option<TouchContact>) {
        let Some(slot) = self.slots.get_mut(usize::from(index)) else {
            debug!("Contact for unknown slot {}", index);
            return;
        };
        self.touched = true;
        self.pending
            .push(abs(AbsoluteAxisType::ABS_MT_SLOT, i32::from(index)));

        match contact {
            Some(c) => {
                if slot.tracking_id.is_none() {
                    let id = self.next_tracking_id;
                    self.next_tracking_id = (id + 1) % (TRACKING_ID_MAX + 1);
                    slot.tracking_id = Some(id);
                    self.pending
                        .push(abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, id));
                }
                slot.contact = Some(c);
                self.pending.extend([
                    abs(AbsoluteAxisType::ABS_MT_POSITION_X, i32::from(c.x)),
                    abs(AbsoluteAxisType::ABS_MT_POSITION_Y, i32::from(c.y)),
                    abs(AbsoluteAxisType::ABS_MT_ORIENTATION, i32::from(c.orientation)),
                    abs(AbsoluteAxisType::ABS_MT_PRESSURE, i32::from(c.pressure)),
                    abs(AbsoluteAxisType::ABS_MT_TOUCH_MAJOR, i32::from(c.touch_major)),
                    abs(AbsoluteAxisType::ABS_MT_TOUCH_MINOR, i32::from(c.touch_minor)),
                ]);
            }
            None => {
                if slot.tracking_id.take().is_some() {
                    self.pending
                        .push(abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, -1));
                }
                slot.contact = None;
            }
        }
    }

    /// Single-touch state from the oldest active contact
    fn pointer_emulation(&mut self) {
        let active: Vec<&Slot> = self.slots.iter().filter(|s| s.contact.is_some()).collect();
        let count = active.len();

        // Tracking ids grow with age until they wrap
        let oldest = active
            .iter()
            .min_by_key(|s| s.tracking_id.unwrap_or(i32::MAX))
            .and_then(|s| s.contact);
        if let Some(c) = oldest {
            self.pending.extend([
                abs(AbsoluteAxisType::ABS_X, i32::from(c.x)),
                abs(AbsoluteAxisType::ABS_Y, i32::from(c.y)),
                abs(AbsoluteAxisType::ABS_PRESSURE, i32::from(c.pressure)),
            ]);
        } else {
            self.pending.push(abs(AbsoluteAxisType::ABS_PRESSURE, 0));
        }

        self.pending.push(key(Key::BTN_TOUCH, count > 0));
        for (i, tool) in TOOL_KEYS.iter().enumerate() {
            // Five or more fingers all report as QUINTTAP
            let selected = count > 0 && count.min(TOOL_KEYS.len()) == i + 1;
            self.pending.push(key(*tool, selected));
        }
    }
}

/// Build the uinput device matching the touchpad's capabilities
fn build_device(name: &str, caps: &Capabilities) -> Result<VirtualDevice, UinputError> {
    let mut builder = VirtualDeviceBuilder::new()
        .map_err(UinputError::CreateDevice)?
        .name(name);

    let mut keys = AttributeSet::<Key>::new();
    keys.insert(Key::BTN_TOUCH);
    for tool in TOOL_KEYS {
        keys.insert(tool);
    }
    for i in 0..caps.button_count {
        keys.insert(button_key(i));
    }
    builder = builder.with_keys(&keys).map_err(UinputError::CreateDevice)?;

    let mut props = AttributeSet::<PropType>::new();
    props.insert(PropType::POINTER);
    if caps.is_buttonpad {
        props.insert(PropType::BUTTONPAD);
    }
    builder = builder
        .with_properties(&props)
        .map_err(UinputError::CreateDevice)?;

    let (res_x, res_y) = caps.resolution.unwrap_or((0, 0));
    let max_x = i32::from(caps.max_x);
    let max_y = i32::from(caps.max_y);
    let last_slot = i32::from(caps.max_fingers.saturating_sub(1));
    let axes = [
        (AbsoluteAxisType::ABS_X, 1, max_x, i32::from(res_x)),
        (AbsoluteAxisType::ABS_Y, 1, max_y, i32::from(res_y)),
        (AbsoluteAxisType::ABS_PRESSURE, 0, PRESSURE_MAX, 0),
        (AbsoluteAxisType::ABS_MT_SLOT, 0, last_slot, 0),
        (AbsoluteAxisType::ABS_MT_TRACKING_ID, 0, TRACKING_ID_MAX, 0),
        (AbsoluteAxisType::ABS_MT_POSITION_X, 1, max_x, i32::from(res_x)),
        (AbsoluteAxisType::ABS_MT_POSITION_Y, 1, max_y, i32::from(res_y)),
        (AbsoluteAxisType::ABS_MT_ORIENTATION, 0, 1, 0),
        (AbsoluteAxisType::ABS_MT_PRESSURE, 0, PRESSURE_MAX, 0),
        (AbsoluteAxisType::ABS_MT_TOUCH_MAJOR, 0, TOUCH_AXIS_MAX, 0),
        (AbsoluteAxisType::ABS_MT_TOUCH_MINOR, 0, TOUCH_AXIS_MAX, 0),
    ];
    for (code, min, max, resolution) in axes {
        let setup = UinputAbsSetup::new(code, AbsInfo::new(0, min, max, 0, 0, resolution));
        builder = builder
            .with_absolute_axis(&setup)
            .map_err(UinputError::CreateDevice)?;
    }

    builder.build().map_err(UinputError::CreateDevice)
}

struct VirtualTouchpad {
    device: VirtualDevice,
    frames: FrameBuilder,
}

/// Input sink forwarding decoded events to a uinput touchpad
///
/// The uinput device is created once the touchpad's capabilities are known
/// (after `initialize`); events arriving before that are dropped.
#[derive(Default)]
pub struct UinputSink {
    inner: Mutex<Option<VirtualTouchpad>>,
}

impl UinputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the uinput device for `caps`
    pub fn create(&self, name: &str, caps: &Capabilities) -> Result<(), UinputError> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Err(UinputError::AlreadyCreated);
        }
        let mut device = build_device(name, caps)?;
        if let Ok(mut nodes) = device.enumerate_dev_nodes_blocking() {
            if let Some(Ok(path)) = nodes.next() {
                debug!("Virtual touchpad node: {}", path.display());
            }
        }
        *inner = Some(VirtualTouchpad {
            device,
            frames: FrameBuilder::new(caps.max_fingers),
        });
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl InputSink for UinputSink {
    fn emit(&self, event: InputEvent) {
        let mut inner = self.inner.lock();
        let Some(touchpad) = inner.as_mut() else {
            return;
        };
        if let Some(frame) = touchpad.frames.push(event) {
            // emit() appends the SYN_REPORT
            if let Err(e) = touchpad.device.emit(&frame) {
                warn!("{}", UinputError::EmitEvent(e));
            }
        }
    }
}
