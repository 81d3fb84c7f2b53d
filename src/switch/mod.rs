//! Switch Manager (4.E): holds the rotation of targets (local plus N remote
//! hosts) and the current cursor, and exposes the explicit actions a UI or
//! edge detector drives it with. Pure state plus a callback; it does not
//! itself touch devices or the compositor -- `switch::edge::EdgeDetector`
//! decides *when* to call these, the Capture/Injection engines react to the
//! resulting target change.

pub mod edge;

pub use crate::config::Edge;
pub use edge::{EdgeDetector, Monitor};

use crate::error::{Result, WaymonError};

/// Sentinel name for the local host, always present at index 0 and never
/// removable.
pub const LOCAL: &str = "local";

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatus {
    pub active: bool,
    pub connected: bool,
    pub server_host: Option<String>,
    pub current_index: usize,
    pub total: usize,
    pub names: Vec<String>,
}

pub struct SwitchManager {
    names: Vec<String>,
    current: usize,
    active: bool,
    connected: bool,
    server_host: Option<String>,
    on_switch: Option<Box<dyn FnMut(usize, bool) + Send>>,
}

impl Default for SwitchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchManager {
    pub fn new() -> Self {
        Self {
            names: vec![LOCAL.to_string()],
            current: 0,
            active: false,
            connected: false,
            server_host: None,
            on_switch: None,
        }
    }

    /// Registers the callback fired on every cursor change, with the new
    /// index and the active flag.
    pub fn on_switch<F>(&mut self, callback: F)
    where
        F: FnMut(usize, bool) + Send + 'static,
    {
        self.on_switch = Some(Box::new(callback));
    }

    /// Adds `name` to the rotation if it isn't already present. Idempotent.
    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    /// Removes `name` from the rotation, adjusting the cursor per the
    /// invariant in §3: removing the current target resets the cursor to 0;
    /// removing a target before the current one decrements it by one;
    /// anything else leaves it alone. Removing `"local"` is a no-op -- it is
    /// always index 0 and never leaves the rotation.
    pub fn remove(&mut self, name: &str) {
        if name == LOCAL {
            return;
        }
        let Some(idx) = self.names.iter().position(|n| n == name) else {
            return;
        };

        self.names.remove(idx);

        if idx == self.current {
            self.current = 0;
            self.fire();
        } else if idx < self.current {
            self.current -= 1;
            self.fire();
        }
    }

    /// Advances to the next target in rotation order, wrapping around.
    /// Errors when the rotation has one or fewer members.
    pub fn next(&mut self) -> Result<()> {
        if self.names.len() <= 1 {
            return Err(WaymonError::InvalidSwitch(
                "no remote targets in rotation".into(),
            ));
        }
        self.current = (self.current + 1) % self.names.len();
        self.fire();
        Ok(())
    }

    pub fn previous(&mut self) -> Result<()> {
        if self.names.len() <= 1 {
            return Err(WaymonError::InvalidSwitch(
                "no remote targets in rotation".into(),
            ));
        }
        self.current = (self.current + self.names.len() - 1) % self.names.len();
        self.fire();
        Ok(())
    }

    /// Selects `name` directly rather than stepping the rotation -- this is
    /// how an edge hit (§4.F) drives the cursor: it names a specific target
    /// host, not "next" or "previous". Adds `name` to the rotation first if
    /// it isn't already present.
    pub fn goto(&mut self, name: &str) -> Result<()> {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            self.current = idx;
        } else {
            self.names.push(name.to_string());
            self.current = self.names.len() - 1;
        }
        self.fire();
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.fire();
        }
    }

    pub fn set_connection(&mut self, connected: bool, host: Option<String>) {
        self.connected = connected;
        self.server_host = host;
    }

    /// Current target name ("local" at index 0, or a remote host name).
    pub fn current(&self) -> &str {
        &self.names[self.current]
    }

    pub fn status(&self) -> SwitchStatus {
        SwitchStatus {
            active: self.active,
            connected: self.connected,
            server_host: self.server_host.clone(),
            current_index: self.current,
            total: self.names.len(),
            names: self.names.clone(),
        }
    }

    fn fire(&mut self) {
        if let Some(cb) = &mut self.on_switch {
            cb(self.current, self.active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_local_only() {
        let sm = SwitchManager::new();
        assert_eq!(sm.status().names, vec!["local".to_string()]);
        assert_eq!(sm.status().current_index, 0);
    }

    #[test]
    fn add_is_idempotent() {
        let mut sm = SwitchManager::new();
        sm.add("peer-1");
        sm.add("peer-1");
        assert_eq!(sm.status().total, 2);
    }

    #[test]
    fn next_wraps_and_errors_with_only_local() {
        let mut sm = SwitchManager::new();
        assert!(sm.next().is_err());
        sm.add("peer-1");
        sm.add("peer-2");
        sm.next().unwrap();
        assert_eq!(sm.status().current_index, 1);
        sm.next().unwrap();
        assert_eq!(sm.status().current_index, 2);
        sm.next().unwrap();
        assert_eq!(sm.status().current_index, 0);
    }

    #[test]
    fn remove_current_resets_cursor() {
        let mut sm = SwitchManager::new();
        sm.add("peer-1");
        sm.add("peer-2");
        sm.next().unwrap();
        assert_eq!(sm.status().current_index, 1);
        sm.remove("peer-1");
        assert_eq!(sm.status().current_index, 0);
    }

    #[test]
    fn remove_before_current_decrements() {
        let mut sm = SwitchManager::new();
        sm.add("peer-1");
        sm.add("peer-2");
        sm.next().unwrap();
        sm.next().unwrap();
        assert_eq!(sm.status().current_index, 2);
        sm.remove("peer-1");
        assert_eq!(sm.status().current_index, 1);
        assert_eq!(sm.current(), "peer-2");
    }

    #[test]
    fn local_is_never_removed() {
        let mut sm = SwitchManager::new();
        sm.remove(LOCAL);
        assert_eq!(sm.status().total, 1);
    }
}
