//! Operational surface (§6): the small command/response protocol an IPC
//! collaborator (a local socket, a CLI, a tray applet) drives the running
//! daemon with. This module only defines the vocabulary and how it's
//! applied to a `SwitchManager` -- the transport that carries these bytes
//! to and from a client process is out of scope (§1, Non-goals).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::switch::{SwitchManager, SwitchStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "switch.next")]
    SwitchNext,
    #[serde(rename = "switch.previous")]
    SwitchPrevious,
    #[serde(rename = "switch.enable")]
    SwitchEnable,
    #[serde(rename = "switch.disable")]
    SwitchDisable,
    #[serde(rename = "status.query")]
    StatusQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub active: bool,
    pub connected: bool,
    pub server_host: Option<String>,
    pub current_index: usize,
    pub total: usize,
    pub names: Vec<String>,
}

impl From<SwitchStatus> for Response {
    fn from(status: SwitchStatus) -> Self {
        Self {
            active: status.active,
            connected: status.connected,
            server_host: status.server_host,
            current_index: status.current_index,
            total: status.total,
            names: status.names,
        }
    }
}

/// Applies one command to the switch manager and returns the resulting
/// status snapshot. `switch.next`/`switch.previous` surface
/// `WaymonError::InvalidSwitch` unchanged when the rotation has one or
/// fewer members; the caller decides how to report that to its client.
pub fn dispatch(manager: &mut SwitchManager, command: Command) -> Result<Response> {
    match command {
        Command::SwitchNext => manager.next()?,
        Command::SwitchPrevious => manager.previous()?,
        Command::SwitchEnable => manager.set_active(true),
        Command::SwitchDisable => manager.set_active(false),
        Command::StatusQuery => {}
    }
    Ok(manager.status().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_query_is_read_only() {
        let mut mgr = SwitchManager::new();
        mgr.add("peer-1");
        let before = mgr.status();
        let resp = dispatch(&mut mgr, Command::StatusQuery).unwrap();
        assert_eq!(resp.total, before.total);
        assert_eq!(resp.current_index, before.current_index);
    }

    #[test]
    fn enable_then_disable_round_trips_active_flag() {
        let mut mgr = SwitchManager::new();
        let resp = dispatch(&mut mgr, Command::SwitchEnable).unwrap();
        assert!(resp.active);
        let resp = dispatch(&mut mgr, Command::SwitchDisable).unwrap();
        assert!(!resp.active);
    }

    #[test]
    fn next_without_remotes_surfaces_invalid_switch() {
        let mut mgr = SwitchManager::new();
        assert!(dispatch(&mut mgr, Command::SwitchNext).is_err());
    }

    #[test]
    fn next_then_previous_returns_to_start() {
        let mut mgr = SwitchManager::new();
        mgr.add("peer-1");
        mgr.add("peer-2");
        dispatch(&mut mgr, Command::SwitchNext).unwrap();
        let resp = dispatch(&mut mgr, Command::SwitchPrevious).unwrap();
        assert_eq!(resp.current_index, 0);
    }
}
