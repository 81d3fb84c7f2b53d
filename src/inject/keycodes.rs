//! Linux evdev keycode tables used by the injection engine: the modifier
//! bit -> keycode mapping from the modifier-sync protocol (4.H), the Linux
//! button-code table, and a handful of named constants used elsewhere in the
//! crate (the panic-chord trigger, mainly).
//!
//! These are the raw `input-event-codes.h` `KEY_*`/`BTN_*` values, not XKB
//! keysyms -- the virtual keyboard protocol wants evdev codes on the wire,
//! XKB only enters the picture when building the keymap blob (see
//! `inject::keymap`).

/// `KEY_ESC`. Default panic-release trigger (qualified by Ctrl in
/// `capture::hotkey::Chord::default`).
pub const EVDEV_ESC: u32 = 1;

pub const KEY_LEFT_SHIFT: u32 = 42;
pub const KEY_RIGHT_SHIFT: u32 = 54;
pub const KEY_CAPS_LOCK: u32 = 58;
pub const KEY_LEFT_CTRL: u32 = 29;
pub const KEY_RIGHT_CTRL: u32 = 97;
pub const KEY_LEFT_ALT: u32 = 56;
pub const KEY_RIGHT_ALT: u32 = 100;
pub const KEY_LEFT_META: u32 = 125;
pub const KEY_RIGHT_META: u32 = 126;

/// Linux pointer button codes, as consumed by the virtual-pointer protocol's
/// button request.
pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
pub const BTN_MIDDLE: u32 = 0x112;
pub const BTN_SIDE: u32 = 0x113;
pub const BTN_EXTRA: u32 = 0x114;

/// Maps a normalized button number (1..=5: left, right, middle, side, extra)
/// to its Linux button code. Returns `None` outside that range.
pub fn button_code(button: u8) -> Option<u32> {
    match button {
        1 => Some(BTN_LEFT),
        2 => Some(BTN_RIGHT),
        3 => Some(BTN_MIDDLE),
        4 => Some(BTN_SIDE),
        5 => Some(BTN_EXTRA),
        _ => None,
    }
}

/// Canonical keycode used to synchronize a single modifier bit toward the
/// compositor. Each bit has one representative key (the left-hand variant);
/// the capture side folds left/right into the same bit in `Modifiers::apply`,
/// so there is never a need to pick between the two here.
pub fn modifier_keycode(bit: crate::event::Modifiers) -> Option<u32> {
    use crate::event::Modifiers;
    match bit {
        Modifiers::SHIFT => Some(KEY_LEFT_SHIFT),
        Modifiers::CAPS_LOCK => Some(KEY_CAPS_LOCK),
        Modifiers::CTRL => Some(KEY_LEFT_CTRL),
        Modifiers::ALT => Some(KEY_LEFT_ALT),
        Modifiers::META => Some(KEY_LEFT_META),
        _ => None,
    }
}

/// All modifier bits in the fixed wire order, used when iterating a bitmask
/// difference (see `inject::wlroots`'s modifier-sync routine).
pub const MODIFIER_BITS: [crate::event::Modifiers; 5] = {
    use crate::event::Modifiers;
    [
        Modifiers::SHIFT,
        Modifiers::CAPS_LOCK,
        Modifiers::CTRL,
        Modifiers::ALT,
        Modifiers::META,
    ]
};

/// Returns the modifier bit that `code` physically represents, if any. Used
/// by the capture-path reader to decide whether a key transition updates the
/// modifier bitmask (`Modifiers::apply`) rather than being forwarded as an
/// ordinary key event only.
pub fn bit_for_key(code: u32) -> Option<crate::event::Modifiers> {
    use crate::event::Modifiers;
    match code {
        KEY_LEFT_SHIFT | KEY_RIGHT_SHIFT => Some(Modifiers::SHIFT),
        KEY_CAPS_LOCK => Some(Modifiers::CAPS_LOCK),
        KEY_LEFT_CTRL | KEY_RIGHT_CTRL => Some(Modifiers::CTRL),
        KEY_LEFT_ALT | KEY_RIGHT_ALT => Some(Modifiers::ALT),
        KEY_LEFT_META | KEY_RIGHT_META => Some(Modifiers::META),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Modifiers;

    #[test]
    fn button_codes_match_linux_constants() {
        assert_eq!(button_code(1), Some(0x110));
        assert_eq!(button_code(5), Some(0x114));
        assert_eq!(button_code(0), None);
        assert_eq!(button_code(6), None);
    }

    #[test]
    fn bit_for_key_round_trips_through_modifier_keycode() {
        for bit in MODIFIER_BITS {
            let code = modifier_keycode(bit).expect("representative key");
            assert_eq!(bit_for_key(code), Some(bit));
        }
    }

    #[test]
    fn non_modifier_key_has_no_bit() {
        assert_eq!(bit_for_key(30 /* KEY_A */), None);
        assert_eq!(modifier_keycode(Modifiers::empty()), None);
    }
}
