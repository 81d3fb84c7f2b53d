//! Device data model (Section 3) plus the enumerator (4.A) and hot-plug
//! monitor (4.B). `Device Enumerator` and `Device Monitor` are pure discovery:
//! neither one opens a device for reading, that's the capture engine's job.

mod enumerator;
mod monitor;

pub use enumerator::{DeviceEnumerator, EnumerateError};
pub use monitor::{DeviceEvent, DeviceMonitor};

use std::path::PathBuf;

bitflags::bitflags! {
    /// Which evdev event types/capabilities a node exposes, as far as this
    /// engine cares. Not a full mirror of the kernel's capability bitmask.
    #[derive(Default)]
    pub struct Capabilities: u8 {
        /// Reports REL_X and REL_Y with at least one pointer button.
        const POINTER = 1 << 0;
        /// Reports a full letter-key range (KEY_A present).
        const KEYBOARD = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Pointer,
    Keyboard,
    Combo,
    Other,
}

impl Capabilities {
    /// Classification used by the interactive device-picker collaborator.
    pub fn classify(self) -> DeviceClass {
        match (
            self.contains(Capabilities::POINTER),
            self.contains(Capabilities::KEYBOARD),
        ) {
            (true, true) => DeviceClass::Combo,
            (true, false) => DeviceClass::Pointer,
            (false, true) => DeviceClass::Keyboard,
            (false, false) => DeviceClass::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Open,
    Grabbed,
    Released,
}

/// Identity and metadata for one kernel input node. Identity is the node
/// path plus a stable id resolved, in order of preference, from a by-id
/// symlink, a by-path symlink, or a sysfs physical-location string.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub node_path: PathBuf,
    pub stable_id: String,
    pub name: String,
    pub capabilities: Capabilities,
    /// True for console/power/lid/speakup-like nodes rejected by the
    /// enumerator's substring deny-list; kept around for diagnostics rather
    /// than silently vanishing from listings.
    pub excluded: bool,
    pub ownership: Ownership,
}

impl DeviceDescriptor {
    pub fn class(&self) -> DeviceClass {
        self.capabilities.classify()
    }
}

/// Node names rejected outright regardless of capability bits: these report
/// keys but are not something a user types on.
pub(crate) const NAME_DENY_LIST: &[&str] = &[
    "power button",
    "lid switch",
    "sleep button",
    "video bus",
    "speakup",
];

pub(crate) fn name_is_denied(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    NAME_DENY_LIST.iter().any(|deny| lower.contains(deny))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_combo_device() {
        let caps = Capabilities::POINTER | Capabilities::KEYBOARD;
        assert_eq!(caps.classify(), DeviceClass::Combo);
    }

    #[test]
    fn classify_bare_pointer() {
        assert_eq!(Capabilities::POINTER.classify(), DeviceClass::Pointer);
    }

    #[test]
    fn deny_list_matches_case_insensitively() {
        assert!(name_is_denied("Power Button"));
        assert!(name_is_denied("Lid Switch"));
        assert!(!name_is_denied("Logitech USB Keyboard"));
    }
}
