//! Capture Engine (4.C): owns opened devices, reads their events, enforces
//! device-grab discipline, and fans normalized events out through the Event
//! Aggregator to a single registered sink.
//!
//! Structured as a single actor task that owns all mutable state -- the
//! readers map, the aggregator, the current target -- and is driven
//! exclusively by messages (`EngineCommand` from callers, `ReaderEvent` from
//! per-device tasks, `DeviceEvent` from the hot-plug monitor, and its own
//! 16ms aggregation ticker). This sidesteps the lock-ordering hazards the
//! design calls out in 4.C/9 (never call back into the engine while holding
//! its lock) by never taking a lock at all: every external call is a message
//! round trip, and the panic-chord and safety-timer firings schedule their
//! `set_target("")` as a fresh message into this task's own inbox rather than
//! recursing into it.

mod hotkey;
mod reader;
mod safety;

pub use hotkey::Chord;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use evdev::Device;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::device::{DeviceClass, DeviceDescriptor, DeviceEnumerator, DeviceEvent, DeviceMonitor};
use crate::error::{Result, WaymonError};
use crate::event::{EventKind, InputEvent, Modifiers};
use crate::inject::keycodes::bit_for_key;

use reader::{DeviceReader, KeyState, ReaderEvent, CHANNEL_CAPACITY};
use safety::SafetyTimer;

const AGGREGATE_TICK: std::time::Duration = std::time::Duration::from_millis(16);
const MONITOR_CHANNEL_CAPACITY: usize = 64;

type EventSink = dyn Fn(InputEvent) + Send + Sync;

enum EngineCommand {
    SetTarget(String, oneshot::Sender<Result<()>>),
    OnEvent(Arc<EventSink>, oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// A running capture engine. `stop()` must be called to release grabs and
/// join every background task cleanly; dropping the handle without calling
/// it leaves the actor task running detached (it will still clean up on
/// process exit, since grabs don't outlive the process, but won't release
/// stuck keys on the wire).
pub struct CaptureEngine {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    handle: Option<JoinHandle<()>>,
    keys: Arc<KeyState>,
}

impl CaptureEngine {
    /// Discovers devices, opens every one that isn't permission-denied,
    /// starts the hot-plug monitor, and spawns the actor task. Fails only
    /// when the enumerator sees no input nodes at all (error category i);
    /// a single unopenable device among several is not fatal (category ii).
    pub async fn start(
        config: Config,
        on_emergency: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<Self> {
        let mut enumerator = DeviceEnumerator::new();
        let descriptors = enumerator
            .list()
            .map_err(|e| WaymonError::Permission(e.to_string()))?;

        let (reader_tx, reader_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (monitor_tx, monitor_rx) = mpsc::channel(MONITOR_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let keys = Arc::new(KeyState::default());
        let chord = Chord {
            modifiers: Modifiers::CTRL,
            trigger: config.emergency_key,
        };

        let mut readers = HashMap::new();
        let mut mouse_idx = 0u32;
        let mut kbd_idx = 0u32;
        let mut other_idx = 0u32;
        for desc in &descriptors {
            match Device::open(&desc.node_path) {
                Ok(device) => {
                    let source = source_name(desc, &mut mouse_idx, &mut kbd_idx, &mut other_idx);
                    let r = DeviceReader::spawn(
                        desc.node_path.clone(),
                        device,
                        source,
                        keys.clone(),
                        chord,
                        reader_tx.clone(),
                    );
                    readers.insert(desc.node_path.clone(), r);
                }
                Err(e) => {
                    log::warn!("could not open {}: {e}", desc.node_path.display());
                    enumerator.mark_ignored(desc.node_path.clone());
                }
            }
        }

        let monitor = DeviceMonitor::spawn(descriptors, monitor_tx);

        let safety_cmd_tx = cmd_tx.clone();
        let safety_emergency = on_emergency.clone();
        let safety = SafetyTimer::spawn(config.grab_timeout, move || {
            schedule_self_release(safety_cmd_tx.clone(), safety_emergency.clone());
        });

        let state = ActorState {
            target: String::new(),
            no_grab: config.no_grab,
            readers,
            keys: keys.clone(),
            sink: None,
            aggregator: Aggregator::new(
                config.mouse_sensitivity,
                config.scroll_speed,
                config.enable_keyboard,
            ),
            safety,
            monitor,
            emergency: on_emergency,
            emergency_key: config.emergency_key,
            mouse_idx,
            kbd_idx,
            other_idx,
        };

        let self_cmd_tx = cmd_tx.clone();
        let handle = tokio::spawn(run_actor(
            state,
            cmd_rx,
            reader_rx,
            monitor_rx,
            self_cmd_tx,
            reader_tx,
        ));

        Ok(Self {
            cmd_tx,
            handle: Some(handle),
            keys,
        })
    }

    /// Registers the sink that receives every event forwarded while a
    /// remote target is selected. Replaces any previously registered sink.
    pub async fn on_event<F>(&self, sink: F)
    where
        F: Fn(InputEvent) + Send + Sync + 'static,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::OnEvent(Arc::new(sink), ack_tx))
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Empty string switches to local (releasing grabs and stuck keys);
    /// anything else grabs every open device (unless `no_grab`) and arms the
    /// safety timer.
    pub async fn set_target(&self, name: impl Into<String>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::SetTarget(name.into(), ack_tx))
            .map_err(|_| engine_gone())?;
        ack_rx.await.map_err(|_| engine_gone())?
    }

    /// Number of normalized events dropped so far because the outbound
    /// channel from some device's reader was full (error category iii).
    pub fn dropped_count(&self) -> u64 {
        self.keys.dropped.load(Ordering::Relaxed)
    }

    /// Releases every grab, synthesizes release events for any stuck keys,
    /// and joins every background task. Idempotent.
    pub async fn stop(&mut self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(EngineCommand::Stop(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn engine_gone() -> WaymonError {
    WaymonError::Device {
        path: "capture engine".into(),
        reason: "actor task is no longer running".into(),
    }
}

/// Spawns the async hop that turns a same-task recursive call into a
/// message into this task's own inbox, per design note 9.
fn schedule_self_release(
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    emergency: Option<Arc<dyn Fn() + Send + Sync>>,
) {
    tokio::spawn(async move {
        let (ack_tx, ack_rx) = oneshot::channel();
        if cmd_tx
            .send(EngineCommand::SetTarget(String::new(), ack_tx))
            .is_ok()
        {
            let _ = ack_rx.await;
        }
        if let Some(cb) = emergency {
            cb();
        }
    });
}

struct ActorState {
    target: String,
    no_grab: bool,
    readers: HashMap<PathBuf, DeviceReader>,
    keys: Arc<KeyState>,
    sink: Option<Arc<EventSink>>,
    aggregator: Aggregator,
    safety: SafetyTimer,
    monitor: DeviceMonitor,
    emergency: Option<Arc<dyn Fn() + Send + Sync>>,
    emergency_key: u32,
    mouse_idx: u32,
    kbd_idx: u32,
    other_idx: u32,
}

async fn run_actor(
    mut state: ActorState,
    mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    mut reader_rx: mpsc::Receiver<ReaderEvent>,
    mut monitor_rx: mpsc::Receiver<DeviceEvent>,
    self_cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    reader_tx: mpsc::Sender<ReaderEvent>,
) {
    let mut agg_ticker = tokio::time::interval(AGGREGATE_TICK);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(EngineCommand::SetTarget(name, ack)) => {
                        let result = do_set_target(&mut state, name).await;
                        let _ = ack.send(result);
                    }
                    Some(EngineCommand::OnEvent(sink, ack)) => {
                        state.sink = Some(sink);
                        let _ = ack.send(());
                    }
                    Some(EngineCommand::Stop(ack)) => {
                        do_stop(&mut state).await;
                        let _ = ack.send(());
                        return;
                    }
                    None => return,
                }
            }
            reader_ev = reader_rx.recv() => {
                match reader_ev {
                    Some(ReaderEvent::Normalized(ev)) => {
                        let outs = state.aggregator.push(ev);
                        for out in outs {
                            forward(&mut state, out);
                        }
                    }
                    Some(ReaderEvent::PanicChord) => {
                        if !state.target.is_empty() && !state.no_grab {
                            schedule_self_release(self_cmd_tx.clone(), state.emergency.clone());
                        }
                    }
                    Some(ReaderEvent::Stopped(path)) => {
                        state.readers.remove(&path);
                    }
                    None => {}
                }
            }
            dev_ev = monitor_rx.recv() => {
                match dev_ev {
                    Some(DeviceEvent::Added(desc)) => {
                        add_device(&mut state, desc, reader_tx.clone()).await;
                    }
                    Some(DeviceEvent::Removed(path)) => {
                        if let Some(mut r) = state.readers.remove(&path) {
                            r.stop().await;
                        }
                    }
                    None => {}
                }
            }
            _ = agg_ticker.tick() => {
                if let Some(ev) = state.aggregator.tick() {
                    forward(&mut state, ev);
                }
            }
        }
    }
}

async fn do_set_target(state: &mut ActorState, name: String) -> Result<()> {
    if name.is_empty() {
        release_to_local(state).await;
        return Ok(());
    }

    let was_local = state.target.is_empty();
    let previous = std::mem::replace(&mut state.target, name);

    if was_local && !state.no_grab {
        let mut grabbed = Vec::new();
        for (path, r) in state.readers.iter() {
            match r.grab().await {
                Ok(()) => grabbed.push(path.clone()),
                Err(e) if e.to_lowercase().contains("busy") => {
                    log::warn!("{}: already grabbed elsewhere, continuing", path.display());
                }
                Err(e) => {
                    for p in &grabbed {
                        if let Some(r) = state.readers.get(p) {
                            let _ = r.release().await;
                        }
                    }
                    state.target = previous;
                    return Err(WaymonError::Device {
                        path: path.display().to_string(),
                        reason: e,
                    });
                }
            }
        }
    }

    state.safety.reset();
    Ok(())
}

async fn release_to_local(state: &mut ActorState) {
    let pressed: Vec<u32> = {
        let mut set = state.keys.pressed.lock().unwrap();
        set.drain().collect()
    };

    for code in pressed {
        let modifiers = {
            let mut m = state.keys.modifiers.lock().unwrap();
            if let Some(bit) = bit_for_key(code) {
                m.apply(bit, false);
            }
            *m
        };
        let ev = InputEvent::new(
            EventKind::Key {
                code,
                pressed: false,
                modifiers,
            },
            "capture",
        );
        forward(state, ev);
    }

    state.target = String::new();
    for r in state.readers.values() {
        let _ = r.release().await;
    }
    state.safety.disarm();
}

async fn do_stop(state: &mut ActorState) {
    release_to_local(state).await;
    state.monitor.stop().await;
    for (_, mut r) in state.readers.drain() {
        r.stop().await;
    }
    state.safety.stop().await;
}

fn forward(state: &mut ActorState, ev: InputEvent) {
    if !state.target.is_empty() {
        if let Some(sink) = &state.sink {
            sink(ev);
        }
        state.safety.reset();
    }
}

async fn add_device(state: &mut ActorState, desc: DeviceDescriptor, reader_tx: mpsc::Sender<ReaderEvent>) {
    let device = match Device::open(&desc.node_path) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("could not open {}: {e}", desc.node_path.display());
            return;
        }
    };

    let source = source_name(&desc, &mut state.mouse_idx, &mut state.kbd_idx, &mut state.other_idx);
    let chord = Chord {
        modifiers: Modifiers::CTRL,
        trigger: state.emergency_key,
    };
    let r = DeviceReader::spawn(
        desc.node_path.clone(),
        device,
        source,
        state.keys.clone(),
        chord,
        reader_tx,
    );

    if !state.target.is_empty() && !state.no_grab {
        if let Err(e) = r.grab().await {
            log::warn!("grab failed on hot-plugged {}: {e}", desc.node_path.display());
        }
    }

    state.readers.insert(desc.node_path.clone(), r);
}

fn source_name(
    desc: &DeviceDescriptor,
    mouse_idx: &mut u32,
    kbd_idx: &mut u32,
    other_idx: &mut u32,
) -> String {
    match desc.class() {
        DeviceClass::Pointer => {
            let n = format!("mouse{mouse_idx}");
            *mouse_idx += 1;
            n
        }
        DeviceClass::Keyboard => {
            let n = format!("kbd{kbd_idx}");
            *kbd_idx += 1;
            n
        }
        DeviceClass::Combo | DeviceClass::Other => {
            let n = format!("dev{other_idx}");
            *other_idx += 1;
            n
        }
    }
}
