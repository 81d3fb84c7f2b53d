//! Per-device reader (4.C): owns one kernel device exclusively, turns its
//! raw evdev events into normalized `InputEvent`s, and is the only place that
//! ever calls a blocking kernel read. Everything else about the engine is
//! driven off what this task sends over its outbound channel.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use evdev::{Device, InputEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::{EventKind, InputEvent, Modifiers};
use crate::inject::keycodes::bit_for_key;

use super::hotkey::HotkeyWatcher;

/// Minimum spacing between motion flushes, per-device. An independent ticker
/// at the same interval flushes a nonzero accumulator even if no further
/// axis events arrive, so a lone slow drag is never held back indefinitely.
const FLUSH_INTERVAL: Duration = Duration::from_micros(500);

/// Outbound channel capacity. Sized so a burst from a fast mouse never backs
/// up into the kernel read call; events are dropped, not queued, past this.
pub const CHANNEL_CAPACITY: usize = 4096;

pub enum ReaderCommand {
    Grab(tokio::sync::oneshot::Sender<Result<(), String>>),
    Release(tokio::sync::oneshot::Sender<Result<(), String>>),
}

pub enum ReaderEvent {
    Normalized(InputEvent),
    /// The trigger key of the panic chord completed while the reader's own
    /// watcher copy was armed. The engine decides what to do with this;
    /// the reader only detects it.
    PanicChord,
    /// The device disappeared or its read loop hit a fatal (non-EAGAIN) error.
    Stopped(PathBuf),
}

/// Shared pressed-keys/modifier state, read and written only from reader
/// tasks (each key code is only ever reported by one device) and snapshotted
/// by the engine under its own lock for release-on-switch bookkeeping. Also
/// carries the channel-full drop counter (error category iii), since every
/// reader that might drop an event shares this one instance.
#[derive(Default)]
pub struct KeyState {
    pub modifiers: Mutex<Modifiers>,
    pub pressed: Mutex<std::collections::HashSet<u32>>,
    pub dropped: std::sync::atomic::AtomicU64,
}

pub struct DeviceReader {
    cmd_tx: mpsc::UnboundedSender<ReaderCommand>,
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl DeviceReader {
    /// Spawns the reader task for an already-opened device. `source` is the
    /// short identifier attached to every event this device produces.
    pub fn spawn(
        path: PathBuf,
        device: Device,
        source: String,
        keys: Arc<KeyState>,
        chord: super::hotkey::Chord,
        out_tx: mpsc::Sender<ReaderEvent>,
    ) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ReaderCommand>();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut stream = match device.into_event_stream() {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("{}: could not open event stream: {e}", path.display());
                    let _ = out_tx.send(ReaderEvent::Stopped(path)).await;
                    return;
                }
            };

            let mut acc_x = 0.0f64;
            let mut acc_y = 0.0f64;
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            let mut hotkey = HotkeyWatcher::new(chord);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        return;
                    }
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ReaderCommand::Grab(ack)) => {
                            let result = stream.device_mut().grab().map_err(|e| e.to_string());
                            if let Err(e) = &result {
                                log::warn!("grab failed on {}: {e}", path.display());
                            }
                            let _ = ack.send(result);
                        }
                        Some(ReaderCommand::Release(ack)) => {
                            let result = stream.device_mut().ungrab().map_err(|e| e.to_string());
                            if let Err(e) = &result {
                                log::warn!("ungrab failed on {}: {e}", path.display());
                            }
                            let _ = ack.send(result);
                        }
                        None => return,
                    },
                    _ = ticker.tick() => {
                        if let Some(ev) = flush(&mut acc_x, &mut acc_y, &source) {
                            if out_tx.try_send(ReaderEvent::Normalized(ev)).is_err() {
                                keys.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                log::debug!("outbound channel full, dropping motion flush");
                            }
                        }
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(raw)) => {
                                if let Some(ev) = handle_raw(
                                    raw,
                                    &mut acc_x,
                                    &mut acc_y,
                                    &source,
                                    &keys,
                                    &mut hotkey,
                                ) {
                                    match ev {
                                        Handled::Event(ev) => {
                                            if out_tx.try_send(ReaderEvent::Normalized(ev)).is_err() {
                                                keys.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                                log::debug!("outbound channel full, dropping event");
                                            }
                                        }
                                        Handled::Panic => {
                                            if out_tx.send(ReaderEvent::PanicChord).await.is_err() {
                                                return;
                                            }
                                        }
                                    }
                                }
                            }
                            Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                                tokio::time::sleep(Duration::from_millis(1)).await;
                            }
                            Some(Err(e)) => {
                                log::info!("reader for {} terminating: {e}", path.display());
                                let _ = out_tx.send(ReaderEvent::Stopped(path.clone())).await;
                                return;
                            }
                            None => {
                                let _ = out_tx.send(ReaderEvent::Stopped(path.clone())).await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self {
            cmd_tx,
            handle: Some(handle),
            cancel,
        }
    }

    /// Requests exclusive ownership of the device and waits for the ioctl
    /// result. Fails if the reader task has already exited.
    pub async fn grab(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(ReaderCommand::Grab(ack_tx))
            .map_err(|_| "reader task gone".to_string())?;
        ack_rx.await.map_err(|_| "reader task gone".to_string())?
    }

    pub async fn release(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(ReaderCommand::Release(ack_tx))
            .map_err(|_| "reader task gone".to_string())?;
        ack_rx.await.map_err(|_| "reader task gone".to_string())?
    }

    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DeviceReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Handled {
    Event(InputEvent),
    Panic,
}

fn flush(acc_x: &mut f64, acc_y: &mut f64, source: &str) -> Option<InputEvent> {
    if *acc_x == 0.0 && *acc_y == 0.0 {
        return None;
    }
    let ev = InputEvent::new(
        EventKind::Motion {
            dx: *acc_x,
            dy: *acc_y,
        },
        source,
    );
    *acc_x = 0.0;
    *acc_y = 0.0;
    Some(ev)
}

fn handle_raw(
    raw: evdev::InputEvent,
    acc_x: &mut f64,
    acc_y: &mut f64,
    source: &str,
    keys: &KeyState,
    hotkey: &mut HotkeyWatcher,
) -> Option<Handled> {
    match raw.kind() {
        InputEventKind::RelAxis(axis) => {
            match axis {
                evdev::RelativeAxisType::REL_X => *acc_x += raw.value() as f64,
                evdev::RelativeAxisType::REL_Y => *acc_y += raw.value() as f64,
                evdev::RelativeAxisType::REL_WHEEL | evdev::RelativeAxisType::REL_WHEEL_HI_RES => {
                    return Some(Handled::Event(InputEvent::new(
                        EventKind::Scroll {
                            dx: 0.0,
                            dy: raw.value() as f64,
                        },
                        source,
                    )));
                }
                evdev::RelativeAxisType::REL_HWHEEL
                | evdev::RelativeAxisType::REL_HWHEEL_HI_RES => {
                    return Some(Handled::Event(InputEvent::new(
                        EventKind::Scroll {
                            dx: raw.value() as f64,
                            dy: 0.0,
                        },
                        source,
                    )));
                }
                _ => {}
            }
            None
        }
        InputEventKind::Key(key) => {
            // evdev reports 2 for autorepeat; only 0 (release) and 1 (press)
            // are transitions we care about.
            if raw.value() == 2 {
                return None;
            }
            let code = key.code() as u32;
            let pressed = raw.value() == 1;
            let bit = bit_for_key(code);

            {
                let mut pressed_keys = keys.pressed.lock().unwrap();
                if pressed {
                    pressed_keys.insert(code);
                } else {
                    pressed_keys.remove(&code);
                }
            }

            let snapshot = {
                let mut modifiers = keys.modifiers.lock().unwrap();
                if let Some(bit) = bit {
                    modifiers.apply(bit, pressed);
                }
                *modifiers
            };

            if hotkey.feed(code, pressed, bit) {
                return Some(Handled::Panic);
            }

            if is_button(key) {
                return Some(Handled::Event(InputEvent::new(
                    EventKind::Button {
                        button: button_number(key),
                        pressed,
                    },
                    source,
                )));
            }

            Some(Handled::Event(InputEvent::new(
                EventKind::Key {
                    code,
                    pressed,
                    modifiers: snapshot,
                },
                source,
            )))
        }
        _ => None,
    }
}

fn is_button(key: evdev::Key) -> bool {
    matches!(
        key,
        evdev::Key::BTN_LEFT
            | evdev::Key::BTN_RIGHT
            | evdev::Key::BTN_MIDDLE
            | evdev::Key::BTN_SIDE
            | evdev::Key::BTN_EXTRA
    )
}

fn button_number(key: evdev::Key) -> u8 {
    match key {
        evdev::Key::BTN_LEFT => 1,
        evdev::Key::BTN_RIGHT => 2,
        evdev::Key::BTN_MIDDLE => 3,
        evdev::Key::BTN_SIDE => 4,
        evdev::Key::BTN_EXTRA => 5,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_resets_accumulators_and_skips_zero() {
        let mut x = 0.0;
        let mut y = 0.0;
        assert!(flush(&mut x, &mut y, "m").is_none());
        x = 3.0;
        y = -2.0;
        let ev = flush(&mut x, &mut y, "m").unwrap();
        assert_eq!(ev.kind, EventKind::Motion { dx: 3.0, dy: -2.0 });
        assert_eq!(x, 0.0);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn button_number_maps_known_buttons() {
        assert_eq!(button_number(evdev::Key::BTN_LEFT), 1);
        assert_eq!(button_number(evdev::Key::BTN_EXTRA), 5);
    }
}
