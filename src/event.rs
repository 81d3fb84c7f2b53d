//! The normalized input event: the single data type that crosses every
//! boundary in the pipeline -- capture to aggregator, aggregator to switch
//! manager and transport, transport to injection engine.
//!
//! Every event carries a monotonic timestamp and a source identifier so a
//! receiver can attribute and order events without reaching back into capture
//! state. At most one payload variant is populated per event; that invariant
//! is enforced by construction (`EventKind` is a single enum, not a struct of
//! optionals).

use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on `InputEvent::source` length. The wire encoder (out of scope
/// here) is expected to reject or truncate anything longer; we cap it at
/// construction so in-process callers never build an oversized one.
pub const MAX_SOURCE_LEN: usize = 64;

/// A single normalized input event, the unit exchanged between capture,
/// aggregation, switching, transport, and injection.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Nanoseconds since an arbitrary but monotonic epoch (see `monotonic_now_ns`).
    pub timestamp_ns: u64,
    /// Identifies the originating device or logical source (e.g. "mouse0",
    /// "kbd0"). Bounded to `MAX_SOURCE_LEN` bytes.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Relative pointer motion, in device units.
    Motion { dx: f64, dy: f64 },
    /// Pointer button 1..=5 (left, right, middle, side, extra).
    Button { button: u8, pressed: bool },
    /// Scroll wheel delta, in wheel units.
    Scroll { dx: f64, dy: f64 },
    /// Key press/release with a modifier snapshot taken at observation time.
    Key {
        code: u32,
        pressed: bool,
        modifiers: Modifiers,
    },
}

impl InputEvent {
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        let mut source = source.into();
        source.truncate(MAX_SOURCE_LEN);
        Self {
            kind,
            timestamp_ns: monotonic_now_ns(),
            source,
        }
    }
}

/// Nanoseconds since `UNIX_EPOCH`, clamped to zero if the clock is somehow
/// before it. Not truly monotonic across clock adjustments, but `Instant`
/// cannot be serialized for the transport boundary, so callers that need
/// strict monotonicity within a process should compare `Instant`s directly
/// and only use this for the value attached to outbound events.
pub fn monotonic_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

bitflags::bitflags! {
    /// Modifier bitmask, fixed layout per the wire contract: bit 0 Shift,
    /// bit 1 CapsLock, bit 2 Ctrl, bit 3 Alt, bit 6 Meta/Super. Bits 4-5 and
    /// 7-31 are reserved.
    #[derive(Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const META = 1 << 6;
    }
}

impl Modifiers {
    /// Applies a physical modifier key transition to the bitmask: CapsLock
    /// toggles on press, all others track press/release of either side.
    /// Non-modifier keys are a no-op (callers should check `bit_for_key` first).
    pub fn apply(&mut self, bit: Modifiers, pressed: bool) {
        if bit == Modifiers::CAPS_LOCK {
            if pressed {
                self.toggle(Modifiers::CAPS_LOCK);
            }
        } else {
            self.set(bit, pressed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_truncated() {
        let long = "x".repeat(MAX_SOURCE_LEN + 10);
        let ev = InputEvent::new(EventKind::Button { button: 1, pressed: true }, long);
        assert_eq!(ev.source.len(), MAX_SOURCE_LEN);
    }

    #[test]
    fn caps_lock_toggles_on_press_only() {
        let mut mods = Modifiers::empty();
        mods.apply(Modifiers::CAPS_LOCK, true);
        assert!(mods.contains(Modifiers::CAPS_LOCK));
        mods.apply(Modifiers::CAPS_LOCK, false);
        assert!(mods.contains(Modifiers::CAPS_LOCK));
        mods.apply(Modifiers::CAPS_LOCK, true);
        assert!(!mods.contains(Modifiers::CAPS_LOCK));
    }

    #[test]
    fn ctrl_tracks_press_and_release() {
        let mut mods = Modifiers::empty();
        mods.apply(Modifiers::CTRL, true);
        assert!(mods.contains(Modifiers::CTRL));
        mods.apply(Modifiers::CTRL, false);
        assert!(!mods.contains(Modifiers::CTRL));
    }
}
