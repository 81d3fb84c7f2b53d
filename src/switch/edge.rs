//! Edge Detector (4.F): tracks a virtual cursor position (Wayland doesn't
//! expose the real one) and decides when a configured screen edge has been
//! crossed, driving the Switch Manager / Capture Engine's target selection.

use crate::config::{Edge, EdgeMapping};

/// Display geometry for one monitor, sourced from an external display-info
/// collaborator (out of scope here; see §1).
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub primary: bool,
}

impl Monitor {
    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x as f64
            && x < (self.x + self.width) as f64
            && y >= self.y as f64
            && y < (self.y + self.height) as f64
    }

    fn edge_at(&self, x: f64, y: f64, threshold: i32) -> Option<Edge> {
        let t = threshold as f64;
        // Priority order for a true corner: left, right, top, bottom.
        if x - self.x as f64 <= t {
            return Some(Edge::Left);
        }
        if (self.x + self.width) as f64 - x <= t {
            return Some(Edge::Right);
        }
        if y - self.y as f64 <= t {
            return Some(Edge::Top);
        }
        if (self.y + self.height) as f64 - y <= t {
            return Some(Edge::Bottom);
        }
        None
    }
}

pub struct EdgeDetector {
    threshold: i32,
    mappings: Vec<EdgeMapping>,
    legacy: Option<(Edge, String)>,
    monitors: Vec<Monitor>,
    cursor: (f64, f64),
    last_edge: Option<Edge>,
    capturing: bool,
}

impl EdgeDetector {
    pub fn new(
        threshold: i32,
        mappings: Vec<EdgeMapping>,
        legacy: Option<(Edge, String)>,
        monitors: Vec<Monitor>,
    ) -> Self {
        Self {
            threshold,
            mappings,
            legacy,
            monitors,
            cursor: (0.0, 0.0),
            last_edge: None,
            capturing: false,
        }
    }

    pub fn monitors(&mut self, monitors: Vec<Monitor>) {
        self.monitors = monitors;
    }

    pub fn cursor(&self) -> (f64, f64) {
        self.cursor
    }

    /// Applies a relative motion to the virtual cursor and immediately
    /// evaluates edges, returning the transition if one occurred.
    pub fn update_cursor(&mut self, dx: f64, dy: f64) -> Option<EdgeTransition> {
        self.cursor.0 += dx;
        self.cursor.1 += dy;
        self.check()
    }

    /// Re-evaluates edges at the current cursor position without moving it
    /// (useful after a monitor-layout change).
    pub fn check(&mut self) -> Option<EdgeTransition> {
        let (x, y) = self.cursor;
        let monitor = self.monitors.iter().find(|m| m.contains(x, y));
        let current_edge = monitor.and_then(|m| m.edge_at(x, y, self.threshold));

        let transition = match (self.last_edge, current_edge) {
            (None, Some(e)) => {
                if self.capturing {
                    None
                } else if let Some(monitor) = monitor {
                    self.resolve(monitor, e).map(|host| {
                        self.capturing = true;
                        EdgeTransition::Enter(e, host)
                    })
                } else {
                    None
                }
            }
            (Some(_), None) => {
                if self.capturing {
                    self.capturing = false;
                    Some(EdgeTransition::Leave)
                } else {
                    None
                }
            }
            (Some(prev), Some(next)) if prev != next => {
                let _ = (prev, next);
                // Edge changed without passing through "none": leave, then
                // enter the new edge on the next check() call rather than
                // both in one -- ordering must stay leave-then-enter and a
                // single return value can't carry two transitions. Force
                // `last_edge` back to `None` so the next call sees this as
                // a fresh `none -> current_edge` crossing and actually
                // enters, instead of a no-op `current_edge -> current_edge`.
                self.last_edge = None;
                return if self.capturing {
                    self.capturing = false;
                    Some(EdgeTransition::Leave)
                } else {
                    None
                };
            }
            _ => None,
        };

        self.last_edge = current_edge;
        transition
    }

    /// Resolves (monitor, edge) to a target host. Match precedence: exact
    /// stable id > exact name > "primary" literal when the monitor is
    /// primary > wildcard "*". The legacy single-edge fallback only applies
    /// when `mappings` is empty.
    pub fn resolve(&self, monitor: &Monitor, edge: Edge) -> Option<String> {
        if self.mappings.is_empty() {
            return self
                .legacy
                .as_ref()
                .filter(|(e, _)| *e == edge)
                .map(|(_, host)| host.clone());
        }

        let by_id = self
            .mappings
            .iter()
            .find(|m| m.edge == edge && m.monitor == monitor.id);
        if let Some(m) = by_id {
            return Some(m.host.clone());
        }

        let by_name = self
            .mappings
            .iter()
            .find(|m| m.edge == edge && m.monitor == monitor.name);
        if let Some(m) = by_name {
            return Some(m.host.clone());
        }

        if monitor.primary {
            let by_primary = self
                .mappings
                .iter()
                .find(|m| m.edge == edge && m.monitor == "primary");
            if let Some(m) = by_primary {
                return Some(m.host.clone());
            }
        }

        self.mappings
            .iter()
            .find(|m| m.edge == edge && m.monitor == "*")
            .map(|m| m.host.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeTransition {
    Enter(Edge, String),
    Leave,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary() -> Monitor {
        Monitor {
            id: "mon-1".into(),
            name: "primary".into(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            primary: true,
        }
    }

    #[test]
    fn enter_fires_once_at_threshold() {
        let mappings = vec![EdgeMapping {
            monitor: "primary".into(),
            edge: Edge::Right,
            host: "peer-1".into(),
        }];
        let mut det = EdgeDetector::new(5, mappings, None, vec![primary()]);
        det.cursor = (1919.0, 540.0);
        let t = det.update_cursor(1.0, 0.0);
        assert_eq!(t, Some(EdgeTransition::Enter(Edge::Right, "peer-1".into())));
        // Still at the edge: no repeat transition.
        assert_eq!(det.check(), None);
    }

    #[test]
    fn leave_fires_when_cursor_moves_away() {
        let mappings = vec![EdgeMapping {
            monitor: "primary".into(),
            edge: Edge::Right,
            host: "peer-1".into(),
        }];
        let mut det = EdgeDetector::new(5, mappings, None, vec![primary()]);
        det.cursor = (1919.0, 540.0);
        det.update_cursor(1.0, 0.0);
        let t = det.update_cursor(-10.0, 0.0);
        assert_eq!(t, Some(EdgeTransition::Leave));
    }

    #[test]
    fn resolve_precedence_id_beats_wildcard() {
        let mappings = vec![
            EdgeMapping {
                monitor: "*".into(),
                edge: Edge::Left,
                host: "wildcard-host".into(),
            },
            EdgeMapping {
                monitor: "mon-1".into(),
                edge: Edge::Left,
                host: "exact-host".into(),
            },
        ];
        let det = EdgeDetector::new(5, mappings, None, vec![]);
        assert_eq!(
            det.resolve(&primary(), Edge::Left),
            Some("exact-host".into())
        );
    }

    #[test]
    fn resolve_primary_beats_wildcard() {
        let mappings = vec![
            EdgeMapping {
                monitor: "*".into(),
                edge: Edge::Left,
                host: "wildcard-host".into(),
            },
            EdgeMapping {
                monitor: "primary".into(),
                edge: Edge::Left,
                host: "primary-host".into(),
            },
        ];
        let det = EdgeDetector::new(5, mappings, None, vec![]);
        assert_eq!(
            det.resolve(&primary(), Edge::Left),
            Some("primary-host".into())
        );
    }

    #[test]
    fn legacy_fallback_only_when_mappings_empty() {
        let det = EdgeDetector::new(5, vec![], Some((Edge::Left, "legacy-host".into())), vec![]);
        assert_eq!(det.resolve(&primary(), Edge::Left), Some("legacy-host".into()));
        assert_eq!(det.resolve(&primary(), Edge::Right), None);
    }

    #[test]
    fn corner_tie_break_prefers_left_over_top() {
        let m = primary();
        // Within threshold of both left and top edges.
        assert_eq!(m.edge_at(2.0, 2.0, 5), Some(Edge::Left));
    }
}
