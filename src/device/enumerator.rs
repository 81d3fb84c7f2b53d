//! Device Enumerator (4.A): discovers interesting input nodes under
//! `/dev/input/` and resolves a stable identity for each.
//!
//! "Interesting" means the node looks like a pointer (REL_X + REL_Y + a
//! button) or a real keyboard (the full letter range, which rules out
//! power/lid/video-bus nodes that only report a handful of keys). The
//! substring deny-list in `device::name_is_denied` is a second line of
//! defense for assistive-tech nodes (speakup) that can otherwise look like a
//! keyboard to the capability check alone.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use evdev::Device;
use thiserror::Error;

use super::{name_is_denied, Capabilities, DeviceDescriptor, Ownership};

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("cannot open /dev/input: {0}")]
    Permission(String),
}

/// Scans `/dev/input/` for interesting devices, remembering nodes that have
/// failed to open so repeated scans (the Device Monitor polls every 2s)
/// don't retry them every time. A node drops out of the ignored set once it
/// disappears from the kernel's directory, so reconnecting the same
/// hardware later is retried.
#[derive(Default)]
pub struct DeviceEnumerator {
    ignored: HashSet<PathBuf>,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates `/dev/input/event*`, returning descriptors for every
    /// device that is interesting and was not previously recorded as
    /// unopenable. Nodes whose kernel file vanished since the last scan are
    /// dropped from the ignored set before scanning, so a replugged device
    /// is retried.
    ///
    /// Opens each node itself rather than going through `evdev::enumerate()`,
    /// which silently discards per-node open failures -- that would make
    /// EACCES (hard, actionable: user isn't in the `input` group) and
    /// EPERM/ENODEV (soft: the node is gone or transiently busy, recorded in
    /// the ignored set per 4.A) indistinguishable from each other, and both
    /// indistinguishable from a host that legitimately has zero input nodes.
    /// Only "every node present failed with EACCES" is reported as
    /// `EnumerateError::Permission`; an empty node directory is not an error.
    pub fn list(&mut self) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
        self.ignored.retain(|path| path.exists());

        let dir = fs::read_dir("/dev/input").map_err(|e| {
            EnumerateError::Permission(format!("cannot read /dev/input: {e}"))
        })?;

        let mut out = Vec::new();
        let mut total_nodes = 0usize;
        let mut permission_denied = 0usize;

        for entry in dir.flatten() {
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"));
            if !is_event_node {
                continue;
            }
            total_nodes += 1;

            if self.ignored.contains(&path) {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    if let Some(desc) = descriptor_for(&path, &device) {
                        if !desc.excluded {
                            out.push(desc);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    permission_denied += 1;
                    log::warn!("permission denied opening {}: {e}", path.display());
                }
                Err(e) => {
                    log::warn!("could not open {}: {e}, ignoring until replugged", path.display());
                    self.ignored.insert(path);
                }
            }
        }

        if total_nodes > 0 && permission_denied == total_nodes {
            return Err(EnumerateError::Permission(
                "every input node is EACCES; is this user in the 'input' group?".into(),
            ));
        }
        Ok(out)
    }

    /// Records that `path` failed to open so it is skipped on future scans
    /// until it disappears and reappears.
    pub fn mark_ignored(&mut self, path: PathBuf) {
        self.ignored.insert(path);
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.contains(path)
    }
}

fn descriptor_for(path: &Path, device: &Device) -> Option<DeviceDescriptor> {
    let name = device.name().unwrap_or("unnamed").to_string();
    let excluded = name_is_denied(&name);

    let has_pointer = device
        .supported_relative_axes()
        .is_some_and(|axes| axes.contains(evdev::RelativeAxisType::REL_X))
        && device
            .supported_relative_axes()
            .is_some_and(|axes| axes.contains(evdev::RelativeAxisType::REL_Y))
        && device
            .supported_keys()
            .is_some_and(|keys| keys.contains(evdev::Key::BTN_LEFT));

    let has_keyboard = device
        .supported_keys()
        .is_some_and(|keys| keys.contains(evdev::Key::KEY_A));

    let mut capabilities = Capabilities::empty();
    if has_pointer {
        capabilities |= Capabilities::POINTER;
    }
    if has_keyboard {
        capabilities |= Capabilities::KEYBOARD;
    }

    if capabilities.is_empty() {
        return None;
    }

    Some(DeviceDescriptor {
        node_path: path.to_path_buf(),
        stable_id: resolve_stable_id(path, device),
        name,
        capabilities,
        excluded,
        ownership: Ownership::Released,
    })
}

/// Resolves a stable identifier in order of preference: by-id symlink,
/// by-path symlink, sysfs physical-location string, falling back to the
/// node path itself if none of those are available.
fn resolve_stable_id(path: &Path, device: &Device) -> String {
    if let Some(id) = symlink_target_matching("/dev/input/by-id", path) {
        return id;
    }
    if let Some(id) = symlink_target_matching("/dev/input/by-path", path) {
        return id;
    }
    if let Some(phys) = device.physical_path() {
        return phys.to_string();
    }
    path.display().to_string()
}

fn symlink_target_matching(dir: &str, target: &Path) -> Option<String> {
    let canonical_target = fs::canonicalize(target).ok()?;
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let link = entry.path();
        if let Ok(resolved) = fs::canonicalize(&link) {
            if resolved == canonical_target {
                return link.file_name().map(|n| n.to_string_lossy().into_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_enumerator_has_empty_ignored_set() {
        let e = DeviceEnumerator::new();
        assert!(!e.is_ignored(Path::new("/dev/input/event0")));
    }

    #[test]
    fn mark_ignored_then_forget_on_disappearance() {
        let mut e = DeviceEnumerator::new();
        let bogus = PathBuf::from("/dev/input/event-does-not-exist-999");
        e.mark_ignored(bogus.clone());
        assert!(e.is_ignored(&bogus));
        // retain() in list() drops entries whose path no longer exists;
        // exercise the same predicate directly since list() needs real
        // kernel nodes to run end-to-end.
        e.ignored.retain(|p| p.exists());
        assert!(!e.is_ignored(&bogus));
    }
}
