//! Recognized configuration (Section 6). Read once at process start and
//! passed by value into components -- nothing here is a process-wide
//! singleton, so tests can construct engines against an arbitrary `Config`
//! in isolation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One entry of the edge-mapping list: which monitor, which edge, which
/// remote host receives capture when the cursor crosses it.
///
/// `monitor` is the raw selector text from configuration: an exact stable id,
/// an exact monitor name, the literal `"primary"`, or the wildcard `"*"`.
/// Which of those four it is gets decided at resolution time (see
/// `switch::edge::EdgeDetector::resolve`), not at parse time, because the
/// same string ("primary", say) could coincidentally be a real monitor name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMapping {
    pub monitor: String,
    pub edge: Edge,
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    /// Tie-break order for corners: left, right, top, bottom.
    pub const PRIORITY: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pinned pointer device node path; `None` means auto-discover.
    pub mouse_device: Option<String>,
    /// Pinned keyboard device node path; `None` means auto-discover.
    pub keyboard_device: Option<String>,
    /// How long a remote target may sit idle with no forwarded event before
    /// the safety timer auto-releases capture back to local.
    #[serde(with = "duration_secs")]
    pub grab_timeout: Duration,
    /// Evdev keycode of the panic-release trigger key, qualified by Ctrl.
    pub emergency_key: u32,
    /// When true, `set_target` never takes exclusive ownership of devices.
    pub no_grab: bool,
    /// Distance in pixels from a monitor edge that counts as "at the edge".
    pub edge_threshold_pixels: i32,
    pub edge_mappings: Vec<EdgeMapping>,
    /// Legacy single-edge fallback, used only when `edge_mappings` is empty.
    pub screen_position: Option<Edge>,
    pub server_address: Option<String>,
    pub mouse_sensitivity: f64,
    pub scroll_speed: f64,
    pub enable_keyboard: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mouse_device: None,
            keyboard_device: None,
            // Lower-latency / shorter-timeout variant (see design notes): the
            // source had a divergent 30s value in some files, but 5s matches
            // the rest of the safety posture.
            grab_timeout: Duration::from_secs(5),
            emergency_key: super::inject::keycodes::EVDEV_ESC,
            no_grab: false,
            edge_threshold_pixels: 5,
            edge_mappings: Vec::new(),
            screen_position: None,
            server_address: None,
            mouse_sensitivity: 1.0,
            scroll_speed: 1.0,
            enable_keyboard: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.grab_timeout, Duration::from_secs(5));
        assert_eq!(cfg.edge_threshold_pixels, 5);
        assert!(!cfg.no_grab);
        assert!(cfg.edge_mappings.is_empty());
    }

    #[test]
    fn parses_edge_mappings_from_toml() {
        let toml = r#"
            edge_threshold_pixels = 8

            [[edge_mappings]]
            monitor = "primary"
            edge = "right"
            host = "peer-1"
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.edge_threshold_pixels, 8);
        assert_eq!(cfg.edge_mappings.len(), 1);
        assert_eq!(cfg.edge_mappings[0].monitor, "primary");
        assert_eq!(cfg.edge_mappings[0].edge, Edge::Right);
        assert_eq!(cfg.edge_mappings[0].host, "peer-1");
    }
}
