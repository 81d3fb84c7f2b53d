//! Event Aggregator (4.D): reduces the event rate without changing
//! observable semantics for anything but motion.
//!
//! Motion is accumulated and flushed at most once per ~16ms tick (60Hz) or
//! whenever a non-motion event arrives, whichever is first -- the latter
//! preserves relative ordering between motion and buttons/keys. Scroll and
//! keyboard events pass straight through, scaled or filtered respectively.
//! A short dedup window absorbs true repeats (e.g. a device that reports the
//! same button state twice in a row, or a pointer reporting sub-unit jitter
//! twice in a row); an optional rate limiter caps the frequency of a given
//! event kind independently of dedup.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::event::{EventKind, InputEvent};

const DEDUP_WINDOW: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EventSignature {
    Button(u8),
    Key(u32),
}

pub struct Aggregator {
    sensitivity: f64,
    scroll_speed: f64,
    enable_keyboard: bool,
    rate_limit: Option<Duration>,

    pending_motion: Option<(f64, f64, String)>,
    last_seen: HashMap<EventSignature, (Instant, bool)>,
    last_emitted_at: HashMap<EventSignature, Instant>,
    /// Last sub-unit motion sample seen, for the motion dedup filter: (when,
    /// whether that sample itself had sub-unit deltas).
    last_motion: Option<(Instant, bool)>,
}

impl Aggregator {
    pub fn new(sensitivity: f64, scroll_speed: f64, enable_keyboard: bool) -> Self {
        Self {
            sensitivity,
            scroll_speed,
            enable_keyboard,
            rate_limit: None,
            pending_motion: None,
            last_seen: HashMap::new(),
            last_emitted_at: HashMap::new(),
            last_motion: None,
        }
    }

    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.rate_limit = Some(min_interval);
        self
    }

    /// Accepts one raw event from the capture engine. Returns the events that
    /// should be emitted *now*, in order -- for a non-motion event this is
    /// `[flushed_motion?, event]`; for motion it is always empty (motion is
    /// only released by `tick()` or by the next non-motion arrival).
    pub fn push(&mut self, event: InputEvent) -> Vec<InputEvent> {
        match event.kind {
            EventKind::Motion { dx, dy } => {
                if self.accept_motion(dx, dy) {
                    self.accumulate(dx, dy, event.source);
                }
                Vec::new()
            }
            EventKind::Scroll { dx, dy } => {
                let mut out = self.flush_motion();
                let scaled = InputEvent {
                    kind: EventKind::Scroll {
                        dx: dx * self.scroll_speed,
                        dy: dy * self.scroll_speed,
                    },
                    ..event
                };
                out.push(scaled);
                out
            }
            EventKind::Button { button, pressed } => {
                let mut out = self.flush_motion();
                if self.accept(EventSignature::Button(button), pressed) {
                    out.push(event);
                }
                out
            }
            EventKind::Key { code, pressed, .. } => {
                let mut out = self.flush_motion();
                if self.enable_keyboard && self.accept(EventSignature::Key(code), pressed) {
                    out.push(event);
                }
                out
            }
        }
    }

    /// Called by the ~16ms ticker. Releases accumulated motion, if any.
    pub fn tick(&mut self) -> Option<InputEvent> {
        self.flush_motion().into_iter().next()
    }

    fn accumulate(&mut self, dx: f64, dy: f64, source: String) {
        match &mut self.pending_motion {
            Some((acc_x, acc_y, _)) => {
                *acc_x += dx;
                *acc_y += dy;
            }
            None => self.pending_motion = Some((dx, dy, source)),
        }
    }

    fn flush_motion(&mut self) -> Vec<InputEvent> {
        match self.pending_motion.take() {
            None => Vec::new(),
            Some((dx, dy, source)) if dx == 0.0 && dy == 0.0 => {
                let _ = source;
                Vec::new()
            }
            Some((dx, dy, source)) => vec![InputEvent::new(
                EventKind::Motion {
                    dx: dx * self.sensitivity,
                    dy: dy * self.sensitivity,
                },
                source,
            )],
        }
    }

    /// Motion-specific dedup: drops a sample within `DEDUP_WINDOW` of the
    /// last one when both samples have sub-unit deltas on both axes --
    /// jitter a device reports at rest, not real movement. Anything with a
    /// whole-unit-or-larger delta on either axis always accumulates.
    fn accept_motion(&mut self, dx: f64, dy: f64) -> bool {
        let now = Instant::now();
        let sub_unit = dx.abs() < 1.0 && dy.abs() < 1.0;

        if sub_unit {
            if let Some((last_at, last_sub_unit)) = self.last_motion {
                if last_sub_unit && now.duration_since(last_at) < DEDUP_WINDOW {
                    return false;
                }
            }
        }
        self.last_motion = Some((now, sub_unit));
        true
    }

    /// Applies the dedup and rate-limit filters to a non-motion event,
    /// keyed by its kind. Returns false when the event should be dropped.
    fn accept(&mut self, sig: EventSignature, pressed: bool) -> bool {
        let now = Instant::now();

        if let Some((last_at, last_pressed)) = self.last_seen.get(&sig) {
            if *last_pressed == pressed && now.duration_since(*last_at) < DEDUP_WINDOW {
                return false;
            }
        }
        self.last_seen.insert(sig, (now, pressed));

        if let Some(min_interval) = self.rate_limit {
            if let Some(last_emit) = self.last_emitted_at.get(&sig) {
                if now.duration_since(*last_emit) < min_interval {
                    return false;
                }
            }
            self.last_emitted_at.insert(sig, now);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_coalesces_until_tick() {
        let mut agg = Aggregator::new(1.0, 1.0, true);
        for _ in 0..5 {
            assert!(agg
                .push(InputEvent::new(EventKind::Motion { dx: 1.0, dy: 0.0 }, "mouse0"))
                .is_empty());
        }
        for _ in 0..3 {
            assert!(agg
                .push(InputEvent::new(EventKind::Motion { dx: 0.0, dy: -1.0 }, "mouse0"))
                .is_empty());
        }
        let flushed = agg.tick().expect("motion pending");
        match flushed.kind {
            EventKind::Motion { dx, dy } => {
                assert_eq!(dx, 5.0);
                assert_eq!(dy, -3.0);
            }
            _ => panic!("expected motion"),
        }
        assert!(agg.tick().is_none());
    }

    #[test]
    fn non_motion_flushes_pending_motion_first() {
        let mut agg = Aggregator::new(1.0, 1.0, true);
        agg.push(InputEvent::new(EventKind::Motion { dx: 3.0, dy: 0.0 }, "m"));
        let out = agg.push(InputEvent::new(
            EventKind::Button {
                button: 1,
                pressed: true,
            },
            "m",
        ));
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].kind, EventKind::Motion { .. }));
        assert!(matches!(out[1].kind, EventKind::Button { .. }));
    }

    #[test]
    fn sensitivity_scales_motion() {
        let mut agg = Aggregator::new(2.0, 1.0, true);
        agg.push(InputEvent::new(EventKind::Motion { dx: 2.0, dy: 1.0 }, "m"));
        let flushed = agg.tick().unwrap();
        assert_eq!(flushed.kind, EventKind::Motion { dx: 4.0, dy: 2.0 });
    }

    #[test]
    fn scroll_speed_scales_immediately() {
        let mut agg = Aggregator::new(1.0, 3.0, true);
        let out = agg.push(InputEvent::new(EventKind::Scroll { dx: 0.0, dy: 1.0 }, "m"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Scroll { dx: 0.0, dy: 3.0 });
    }

    #[test]
    fn disabled_keyboard_drops_keys() {
        let mut agg = Aggregator::new(1.0, 1.0, false);
        let out = agg.push(InputEvent::new(
            EventKind::Key {
                code: 30,
                pressed: true,
                modifiers: Default::default(),
            },
            "k",
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn sub_unit_motion_jitter_within_window_is_dropped() {
        let mut agg = Aggregator::new(1.0, 1.0, true);
        agg.push(InputEvent::new(
            EventKind::Motion { dx: 0.2, dy: -0.1 },
            "m",
        ));
        agg.push(InputEvent::new(
            EventKind::Motion { dx: 0.3, dy: -0.2 },
            "m",
        ));
        // Only the first sub-unit sample accumulated; the second was
        // deduped as jitter, so the flushed total is just the first.
        let flushed = agg.tick().expect("motion pending");
        assert_eq!(flushed.kind, EventKind::Motion { dx: 0.2, dy: -0.1 });
    }

    #[test]
    fn whole_unit_motion_is_never_deduped() {
        let mut agg = Aggregator::new(1.0, 1.0, true);
        agg.push(InputEvent::new(EventKind::Motion { dx: 2.0, dy: 0.0 }, "m"));
        agg.push(InputEvent::new(EventKind::Motion { dx: 3.0, dy: 0.0 }, "m"));
        let flushed = agg.tick().expect("motion pending");
        assert_eq!(flushed.kind, EventKind::Motion { dx: 5.0, dy: 0.0 });
    }

    #[test]
    fn duplicate_button_within_window_is_dropped() {
        let mut agg = Aggregator::new(1.0, 1.0, true);
        let mk = || {
            InputEvent::new(
                EventKind::Button {
                    button: 1,
                    pressed: true,
                },
                "m",
            )
        };
        assert_eq!(agg.push(mk()).len(), 1);
        assert_eq!(agg.push(mk()).len(), 0);
    }
}
