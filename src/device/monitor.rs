//! Device Monitor (4.B): polls for hot-plug add/remove and notifies the
//! capture engine. A 2-second poll of the input-node directory is what the
//! design calls for; the interface doesn't assume polling, so a kernel
//! notification source (inotify on `/dev/input`) could replace the task body
//! without touching callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{DeviceDescriptor, DeviceEnumerator};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Added(DeviceDescriptor),
    Removed(PathBuf),
}

pub struct DeviceMonitor {
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl DeviceMonitor {
    /// Spawns the poll loop on the current tokio runtime. `seed` is the set
    /// of devices already known to the caller (so the first poll only
    /// reports devices that differ from it, rather than re-announcing
    /// everything found at startup).
    pub fn spawn(seed: Vec<DeviceDescriptor>, tx: mpsc::Sender<DeviceEvent>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut enumerator = DeviceEnumerator::new();
            let mut known: HashMap<PathBuf, ()> =
                seed.into_iter().map(|d| (d.node_path, ())).collect();
            let mut ticker = tokio::time::interval(POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = match enumerator.list() {
                            Ok(devices) => devices,
                            Err(e) => {
                                log::debug!("device monitor: scan failed: {e}");
                                continue;
                            }
                        };

                        let current_paths: std::collections::HashSet<_> =
                            current.iter().map(|d| d.node_path.clone()).collect();

                        for path in known.keys().cloned().collect::<Vec<_>>() {
                            if !current_paths.contains(&path) {
                                known.remove(&path);
                                if tx.send(DeviceEvent::Removed(path)).await.is_err() {
                                    return;
                                }
                            }
                        }

                        for device in current {
                            if !known.contains_key(&device.node_path) {
                                known.insert(device.node_path.clone(), ());
                                if tx.send(DeviceEvent::Added(device)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            cancel,
        }
    }

    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
