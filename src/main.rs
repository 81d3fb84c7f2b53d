//! waymon -- entry point, daemon lifecycle, and signal handling.
//!
//! Wires the pipeline described across §4: Capture Engine events flow into
//! the Edge Detector, an edge crossing moves the Switch Manager's cursor and
//! retargets capture accordingly, and Ctrl-C drains grabs before exit. The
//! transport that would carry forwarded events to a remote Injection Engine,
//! and the IPC listener that would carry `ipc::Command`s in from a client,
//! are both out of scope (§1, Non-goals) -- this binary runs one host's half
//! of the pipeline and logs what it would otherwise send.

mod aggregate;
mod capture;
mod config;
mod device;
mod error;
mod event;
mod inject;
mod ipc;
mod switch;

use std::sync::{Arc, Mutex};

use config::Config;
use error::Result;
use switch::edge::{EdgeDetector, EdgeTransition};
use switch::SwitchManager;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = load_config();

    let switch = Arc::new(Mutex::new(SwitchManager::new()));
    for mapping in &config.edge_mappings {
        switch.lock().unwrap().add(mapping.host.clone());
    }
    let legacy = config.screen_position.zip(config.server_address.clone());
    let edge_detector = Arc::new(Mutex::new(EdgeDetector::new(
        config.edge_threshold_pixels,
        config.edge_mappings.clone(),
        legacy,
        Vec::new(),
    )));

    let engine = Arc::new(capture::CaptureEngine::start(config.clone(), None).await?);
    log::info!("capture engine started");

    {
        let switch = Arc::clone(&switch);
        let edge_detector = Arc::clone(&edge_detector);
        let engine = Arc::clone(&engine);
        engine
            .on_event(move |evt| {
                if let event::EventKind::Motion { dx, dy } = evt.kind {
                    let transition = edge_detector.lock().unwrap().update_cursor(dx, dy);
                    match transition {
                        Some(EdgeTransition::Enter(_, host)) => {
                            let mut guard = switch.lock().unwrap();
                            if guard.goto(&host).is_ok() {
                                drop(guard);
                                let engine = Arc::clone(&engine);
                                tokio::spawn(async move {
                                    if let Err(e) = engine.set_target(host).await {
                                        log::warn!("retarget failed: {e}");
                                    }
                                });
                            }
                        }
                        Some(EdgeTransition::Leave) => {
                            switch.lock().unwrap().goto(switch::LOCAL).ok();
                            let engine = Arc::clone(&engine);
                            tokio::spawn(async move {
                                if let Err(e) = engine.set_target("").await {
                                    log::warn!("release failed: {e}");
                                }
                            });
                        }
                        None => {}
                    }
                } else {
                    log::debug!("forward (transport not wired): {evt:?}");
                }
            })
            .await;
    }

    log::info!("waymon running, press Ctrl-C to exit");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| error::WaymonError::Transport(e.to_string()))?;

    log::info!("shutting down");
    match Arc::try_unwrap(engine) {
        Ok(mut engine) => engine.stop().await,
        Err(_) => log::warn!("capture engine still shared at shutdown, skipping clean stop"),
    }
    Ok(())
}

fn load_config() -> Config {
    let path = std::env::args().nth(1);
    let Some(path) = path else {
        log::info!("no config path given, using defaults");
        return Config::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => match Config::from_toml_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("failed to parse {path}: {e}, using defaults");
                Config::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read {path}: {e}, using defaults");
            Config::default()
        }
    }
}
