//! Injection Engine (4.H): applies normalized events to the local compositor
//! via the wlr virtual-pointer and virtual-keyboard protocols, and keeps the
//! compositor's modifier state synchronized with every key event's snapshot.
//!
//! Unlike the Capture Engine, this is not an actor task: per §5, "the
//! injection path on the remote host is single-threaded", so this is a plain
//! struct whose methods serialize naturally through `&mut self` -- whatever
//! owns it (the transport's receive callback) calls its methods directly.

use std::os::fd::AsFd;
use std::time::{SystemTime, UNIX_EPOCH};

use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{
    wl_keyboard,
    wl_pointer::{self, Axis, AxisSource},
    wl_registry, wl_seat, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, QueueHandle};

use wayland_protocols::wp::keyboard_shortcuts_inhibit::zv1::client::{
    zwp_keyboard_shortcuts_inhibit_manager_v1::ZwpKeyboardShortcutsInhibitManagerV1,
    zwp_keyboard_shortcuts_inhibitor_v1::ZwpKeyboardShortcutsInhibitorV1,
};
use wayland_protocols::wp::pointer_constraints::zv1::client::{
    zwp_locked_pointer_v1::ZwpLockedPointerV1,
    zwp_pointer_constraints_v1::{Lifetime, ZwpPointerConstraintsV1},
};
use wayland_protocols_misc::zwp_virtual_keyboard_v1::client::{
    zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1,
    zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1,
};
use wayland_protocols_wlr::virtual_pointer::v1::client::{
    zwlr_virtual_pointer_manager_v1::ZwlrVirtualPointerManagerV1,
    zwlr_virtual_pointer_v1::ZwlrVirtualPointerV1,
};

use crate::error::{Result, WaymonError};
use crate::event::Modifiers;

use super::keycodes::{self, MODIFIER_BITS};
use super::keymap;

struct State {
    seat: wl_seat::WlSeat,
    /// The real local pointer, obtained purely as an exclusive-capture
    /// target -- this engine never reads its events, only locks it while a
    /// remote host has control, so the local physical mouse can't fight
    /// with injected motion.
    local_pointer: Option<wl_pointer::WlPointer>,
    pointer_constraints: Option<ZwpPointerConstraintsV1>,
    shortcuts_inhibit_manager: Option<ZwpKeyboardShortcutsInhibitManagerV1>,
    locked_pointer: Option<ZwpLockedPointerV1>,
    shortcuts_inhibitor: Option<ZwpKeyboardShortcutsInhibitorV1>,
}

/// Applies normalized events to a compositor. One instance per host; the
/// virtual pointer and keyboard are created once at construction and live
/// for the process lifetime, not per remote peer.
pub struct InjectionEngine {
    queue: EventQueue<State>,
    state: State,
    qh: QueueHandle<State>,
    pointer: ZwlrVirtualPointerV1,
    keyboard: ZwpVirtualKeyboardV1,
    /// Exclusive-capture surface, if the embedding application has one.
    /// Pointer lock and shortcuts inhibit are no-ops without it -- both are
    /// best-effort per §4.H and this crate has no windowing surface of its
    /// own to offer.
    surface: Option<wl_surface::WlSurface>,
    /// The modifier state this engine has last communicated to the
    /// compositor. Owned independently of the Capture Engine's bitmask (§5).
    current_modifiers: Modifiers,
    last_flush_failed: bool,
}

impl InjectionEngine {
    pub fn new(surface: Option<wl_surface::WlSurface>) -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| WaymonError::UnsupportedProtocol(format!("wayland connect: {e}")))?;
        let (globals, queue) = registry_queue_init::<State>(&conn)
            .map_err(|e| WaymonError::UnsupportedProtocol(format!("registry init: {e}")))?;
        let qh = queue.handle();

        let seat: wl_seat::WlSeat = globals
            .bind(&qh, 1..=8, ())
            .map_err(|e| WaymonError::UnsupportedProtocol(format!("wl_seat: {e}")))?;
        let vpm: ZwlrVirtualPointerManagerV1 = globals.bind(&qh, 1..=1, ()).map_err(|e| {
            WaymonError::UnsupportedProtocol(format!("wlr-virtual-pointer-unstable-v1: {e}"))
        })?;
        let vkm: ZwpVirtualKeyboardManagerV1 = globals.bind(&qh, 1..=1, ()).map_err(|e| {
            WaymonError::UnsupportedProtocol(format!("virtual-keyboard-unstable-v1: {e}"))
        })?;

        // Best-effort: a compositor that doesn't support these just gets
        // no exclusive capture, not a hard failure (§4.H Lifecycle).
        let pointer_constraints: Option<ZwpPointerConstraintsV1> = globals.bind(&qh, 1..=1, ()).ok();
        let shortcuts_inhibit_manager: Option<ZwpKeyboardShortcutsInhibitManagerV1> =
            globals.bind(&qh, 1..=1, ()).ok();
        let local_pointer = pointer_constraints.as_ref().map(|_| seat.get_pointer(&qh, ()));

        let pointer = vpm.create_virtual_pointer(None, &qh, ());
        let keyboard = vkm.create_virtual_keyboard(&seat, &qh, ());

        let (fd, size) = keymap::build()?;
        keyboard.keymap(wl_keyboard::KeymapFormat::XkbV1.into(), fd.as_fd(), size);

        let mut engine = Self {
            queue,
            state: State {
                seat,
                local_pointer,
                pointer_constraints,
                shortcuts_inhibit_manager,
                locked_pointer: None,
                shortcuts_inhibitor: None,
            },
            qh,
            pointer,
            keyboard,
            surface,
            current_modifiers: Modifiers::empty(),
            last_flush_failed: false,
        };
        engine.flush()?;
        Ok(engine)
    }

    fn now_ms(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u32
    }

    /// Flushes queued requests. A `WouldBlock` write error means the
    /// compositor can't keep up; the event is logged and dropped rather than
    /// blocking the caller, matching the capture path's drop-on-full policy.
    fn flush(&mut self) -> Result<()> {
        match self.queue.flush() {
            Ok(()) => {
                self.last_flush_failed = false;
                Ok(())
            }
            Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.last_flush_failed = true;
                log::warn!("compositor can't keep up, dropping queued input request");
                Ok(())
            }
            Err(e) => Err(WaymonError::Injection(format!("wayland flush: {e}"))),
        }
    }

    /// Relative-motion request followed by a frame boundary.
    pub fn inject_motion(&mut self, dx: f64, dy: f64) -> Result<()> {
        let time = self.now_ms();
        self.pointer.motion(time, dx, dy);
        self.pointer.frame();
        self.flush()
    }

    /// Absolute-motion variant with an explicit extent rectangle, used for
    /// warp/enter when a remote session takes over at a known edge position.
    pub fn inject_absolute(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        let (x, y): (u32, u32) = (
            x.try_into()
                .map_err(|_| WaymonError::Injection("negative absolute x".into()))?,
            y.try_into()
                .map_err(|_| WaymonError::Injection("negative absolute y".into()))?,
        );
        let time = self.now_ms();
        self.pointer.motion_absolute(time, x, y, width, height);
        self.pointer.frame();
        self.flush()
    }

    pub fn inject_button(&mut self, button: u8, pressed: bool) -> Result<()> {
        let code =
            keycodes::button_code(button).ok_or_else(|| WaymonError::Injection(format!("button {button} out of range")))?;
        let time = self.now_ms();
        let state = if pressed {
            wl_pointer::ButtonState::Pressed
        } else {
            wl_pointer::ButtonState::Released
        };
        self.pointer.button(time, code, state);
        self.pointer.frame();
        self.flush()
    }

    /// Sets the axis source to "wheel" and emits a vertical axis for nonzero
    /// `dy` (sign-flipped to match compositor convention) and/or a
    /// horizontal axis for nonzero `dx`, then a frame.
    pub fn inject_scroll(&mut self, dx: f64, dy: f64) -> Result<()> {
        let time = self.now_ms();
        self.pointer.axis_source(AxisSource::Wheel);
        if dy != 0.0 {
            self.pointer.axis(time, Axis::VerticalScroll, -dy);
        }
        if dx != 0.0 {
            self.pointer.axis(time, Axis::HorizontalScroll, dx);
        }
        self.pointer.frame();
        self.flush()
    }

    /// Modifier protocol (§4.H, the critical correctness point). `code` is
    /// the evdev keycode being injected; `modifiers` is the snapshot the
    /// capture side recorded for this event.
    ///
    /// For a modifier key itself, the key event IS the transition: update
    /// `current_modifiers` from the event and send the key with no separate
    /// sync step. For any other key, diff `modifiers` against
    /// `current_modifiers` and synthesize each differing modifier key's
    /// press/release plus one consolidated `modifiers` request reflecting
    /// the fully updated mask -- but the real key and the sync step trade
    /// places depending on direction (§8 scenario 5): on press, the
    /// modifiers must already be down before the real key goes down, so the
    /// sync happens first; on release, the real key releases before the
    /// modifiers that were qualifying it, so the sync happens last. This
    /// also covers "release with an empty snapshot releases every held
    /// modifier" -- that's just the diff against an all-clear snapshot.
    pub fn inject_key(&mut self, code: u32, pressed: bool, modifiers: Modifiers) -> Result<()> {
        let time = self.now_ms();

        if let Some(bit) = keycodes::bit_for_key(code) {
            self.current_modifiers.apply(bit, pressed);
            self.keyboard.key(time, code, pressed as u32);
            return self.flush();
        }

        if pressed {
            self.sync_modifiers(modifiers);
            self.keyboard.key(time, code, pressed as u32);
        } else {
            self.keyboard.key(time, code, pressed as u32);
            self.sync_modifiers(modifiers);
        }
        self.flush()
    }

    /// Diffs `modifiers` against `current_modifiers`, synthesizing each
    /// differing bit's key press/release and one consolidated
    /// `modifiers` request if anything changed. Shared by both the
    /// before-key (press) and after-key (release) orderings of `inject_key`.
    fn sync_modifiers(&mut self, modifiers: Modifiers) {
        let diff = self.current_modifiers ^ modifiers;
        if diff.is_empty() {
            return;
        }
        for bit in MODIFIER_BITS {
            if !diff.contains(bit) {
                continue;
            }
            let want_pressed = modifiers.contains(bit);
            if let Some(mod_code) = keycodes::modifier_keycode(bit) {
                let t = self.now_ms();
                self.keyboard.key(t, mod_code, want_pressed as u32);
            }
            self.current_modifiers.apply(bit, want_pressed);
        }
        self.send_modifiers_state();
    }

    fn send_modifiers_state(&mut self) {
        let depressed = (self.current_modifiers & !Modifiers::CAPS_LOCK).bits() as u32;
        let locked = if self.current_modifiers.contains(Modifiers::CAPS_LOCK) {
            Modifiers::CAPS_LOCK.bits() as u32
        } else {
            0
        };
        self.keyboard.modifiers(depressed, 0, locked, 0);
    }

    /// Best-effort exclusive capture: locks the real local pointer (so it
    /// can't fight with injected motion) and inhibits compositor keyboard
    /// shortcuts on the configured surface. Failure only logs a warning
    /// (§4.H Lifecycle); a compositor lacking either protocol just runs
    /// without that half of exclusive capture.
    pub fn activate(&mut self) {
        let Some(surface) = self.surface.clone() else {
            return;
        };
        if let (Some(constraints), Some(pointer)) =
            (&self.state.pointer_constraints, &self.state.local_pointer)
        {
            let locked = constraints.lock_pointer(
                &surface,
                pointer,
                None,
                Lifetime::Persistent,
                &self.qh,
                (),
            );
            self.state.locked_pointer = Some(locked);
        }
        if let Some(manager) = &self.state.shortcuts_inhibit_manager {
            let inhibitor = manager.inhibit_shortcuts(&surface, &self.state.seat, &self.qh, ());
            self.state.shortcuts_inhibitor = Some(inhibitor);
        }
        if let Err(e) = self.flush() {
            log::warn!("activate exclusive capture: {e}");
        }
    }

    pub fn deactivate(&mut self) {
        if let Some(locked) = self.state.locked_pointer.take() {
            locked.destroy();
        }
        if let Some(inhibitor) = self.state.shortcuts_inhibitor.take() {
            inhibitor.destroy();
        }
        if let Err(e) = self.flush() {
            log::warn!("deactivate exclusive capture: {e}");
        }
    }
}

delegate_noop!(State: ignore ZwlrVirtualPointerV1);
delegate_noop!(State: ignore ZwpVirtualKeyboardV1);
delegate_noop!(State: ignore ZwlrVirtualPointerManagerV1);
delegate_noop!(State: ignore ZwpVirtualKeyboardManagerV1);
delegate_noop!(State: ignore ZwpPointerConstraintsV1);
delegate_noop!(State: ignore ZwpLockedPointerV1);
delegate_noop!(State: ignore ZwpKeyboardShortcutsInhibitManagerV1);
delegate_noop!(State: ignore ZwpKeyboardShortcutsInhibitorV1);

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for State {
    fn event(
        _: &mut Self,
        _: &wl_registry::WlRegistry,
        _: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for State {
    fn event(
        _: &mut Self,
        _: &wl_seat::WlSeat,
        _: wl_seat::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Capabilities announcements don't matter here: the virtual
        // keyboard is created against the seat object itself, not a real
        // physical keyboard obtained through it.
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for State {
    fn event(
        _: &mut Self,
        _: &wl_pointer::WlPointer,
        _: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Only held as a lock target; its motion/button events are the
        // local input this whole crate exists to route elsewhere instead.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_diff_covers_release_all_case() {
        let current = Modifiers::SHIFT | Modifiers::CTRL;
        let incoming = Modifiers::empty();
        let diff = current ^ incoming;
        assert_eq!(diff, current);
    }

    #[test]
    fn send_modifiers_state_splits_capslock_into_locked() {
        let mods = Modifiers::SHIFT | Modifiers::CAPS_LOCK;
        let depressed = (mods & !Modifiers::CAPS_LOCK).bits() as u32;
        let locked = if mods.contains(Modifiers::CAPS_LOCK) {
            Modifiers::CAPS_LOCK.bits() as u32
        } else {
            0
        };
        assert_eq!(depressed, Modifiers::SHIFT.bits() as u32);
        assert_eq!(locked, Modifiers::CAPS_LOCK.bits() as u32);
    }
}
