//! Hotkey Watcher (4.G): detects the panic-release chord against the raw
//! keyboard stream, independently of whatever the engine does with the
//! event afterwards. It keeps its own modifier state rather than reading the
//! engine's snapshot, so it still works if it's ever wired up ahead of
//! modifier tracking in some other pipeline arrangement.

use crate::event::Modifiers;

/// A chord is a set of modifier keys plus a trigger key. The watcher fires
/// on press of the trigger while exactly the required modifiers are held,
/// and never on autorepeat (repeats aren't reported as a second press here;
/// callers only call `feed` on real press/release transitions).
#[derive(Debug, Clone, Copy)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub trigger: u32,
}

impl Default for Chord {
    /// Ctrl+Escape, the default panic-release chord.
    fn default() -> Self {
        Self {
            modifiers: Modifiers::CTRL,
            trigger: crate::inject::keycodes::EVDEV_ESC,
        }
    }
}

pub struct HotkeyWatcher {
    chord: Chord,
    modifiers: Modifiers,
}

impl HotkeyWatcher {
    pub fn new(chord: Chord) -> Self {
        Self {
            chord,
            modifiers: Modifiers::empty(),
        }
    }

    /// Feeds one raw key transition. Returns true exactly when this
    /// transition completes the configured chord: `code` is the trigger key,
    /// `pressed` is true, and the modifier state held at that instant is
    /// exactly the chord's required set (no more, no less).
    pub fn feed(&mut self, code: u32, pressed: bool, bit: Option<Modifiers>) -> bool {
        if let Some(bit) = bit {
            self.modifiers.apply(bit, pressed);
            // A modifier key itself never completes the chord.
            return false;
        }

        pressed && code == self.chord.trigger && self.modifiers == self.chord.modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_ctrl_escape() {
        let mut w = HotkeyWatcher::new(Chord::default());
        assert!(!w.feed(29, true, Some(Modifiers::CTRL))); // Ctrl down
        assert!(w.feed(1, true, None)); // Escape down, trigger fires
    }

    #[test]
    fn does_not_fire_without_ctrl() {
        let mut w = HotkeyWatcher::new(Chord::default());
        assert!(!w.feed(1, true, None));
    }

    #[test]
    fn does_not_fire_with_extra_modifiers() {
        let mut w = HotkeyWatcher::new(Chord::default());
        w.feed(29, true, Some(Modifiers::CTRL));
        w.feed(42, true, Some(Modifiers::SHIFT));
        assert!(!w.feed(1, true, None));
    }

    #[test]
    fn release_of_trigger_does_not_fire() {
        let mut w = HotkeyWatcher::new(Chord::default());
        w.feed(29, true, Some(Modifiers::CTRL));
        assert!(!w.feed(1, false, None));
    }
}
