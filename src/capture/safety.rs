//! Grab-safety timer: a cooperative timeout on exclusive capture. Every
//! forwarded event resets the deadline; if it ever elapses, the engine treats
//! it exactly like `set_target("")` plus the emergency callback -- this is
//! error category (iv) in the design, a normal target-clear, not an error.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub enum SafetyCommand {
    /// Push the deadline out by `grab_timeout` from now.
    Reset,
    /// Stop watching; used when the target goes back to local deliberately.
    Disarm,
}

pub struct SafetyTimer {
    cmd_tx: Option<mpsc::UnboundedSender<SafetyCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl SafetyTimer {
    /// Spawns the timer task. `on_fire` runs when the deadline elapses
    /// without an intervening `Reset`; it must not block, since it runs
    /// inline on the timer task.
    pub fn spawn<F>(grab_timeout: Duration, on_fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SafetyCommand>();

        let handle = tokio::spawn(async move {
            let mut armed = false;
            let mut deadline = Instant::now() + grab_timeout;

            loop {
                if armed {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            on_fire();
                            armed = false;
                        }
                        cmd = cmd_rx.recv() => match cmd {
                            Some(SafetyCommand::Reset) => {
                                deadline = Instant::now() + grab_timeout;
                            }
                            Some(SafetyCommand::Disarm) => armed = false,
                            None => return,
                        }
                    }
                } else {
                    match cmd_rx.recv().await {
                        Some(SafetyCommand::Reset) => {
                            deadline = Instant::now() + grab_timeout;
                            armed = true;
                        }
                        Some(SafetyCommand::Disarm) => {}
                        None => return,
                    }
                }
            }
        });

        Self {
            cmd_tx: Some(cmd_tx),
            handle: Some(handle),
        }
    }

    pub fn reset(&self) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(SafetyCommand::Reset);
        }
    }

    pub fn disarm(&self) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(SafetyCommand::Disarm);
        }
    }

    pub async fn stop(&mut self) {
        self.cmd_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SafetyTimer {
    fn drop(&mut self) {
        self.cmd_tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_after_timeout_without_reset() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let timer = SafetyTimer::spawn(Duration::from_millis(20), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        timer.reset();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_reset_postpones_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let timer = SafetyTimer::spawn(Duration::from_millis(30), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..3 {
            timer.reset();
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
