//! XKB keymap generation and upload (4.H). The virtual keyboard protocol
//! doesn't accept key events until a keymap has been handed to the
//! compositor as a file descriptor -- Wayland messages are too small to
//! carry the keymap text itself, so the blob is written to a temp file and
//! handed over as an fd.

use std::io::Write;
use std::os::fd::OwnedFd;

use tempfile::NamedTempFile;
use xkbcommon::xkb;

use crate::error::{Result, WaymonError};

/// Compiles the standard evdev/pc105/us keymap via libxkbcommon and returns
/// its text-format serialization. Per-layout negotiation is out of scope
/// (§1, Non-goals); this keymap is enough to make every key code this engine
/// ever injects resolve to a symbol on the receiving compositor.
fn keymap_text() -> Result<String> {
    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    let names = xkb::RuleNames {
        rules: "evdev".into(),
        model: "pc105".into(),
        layout: "us".into(),
        variant: "".into(),
        options: None,
    };
    let keymap = xkb::Keymap::new_from_names(&context, &names, xkb::KEYMAP_COMPILE_NO_FLAGS)
        .ok_or_else(|| WaymonError::Injection("libxkbcommon rejected the evdev/pc105/us rule set".into()))?;
    Ok(keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1))
}

/// Writes the compiled keymap to a temp file and returns the descriptor plus
/// size, in the `(fd, size)` shape the `wl_keyboard.keymap` request wants
/// (format is always `XkbV1` here). The file is null-terminated, per the
/// XKB wire convention.
pub fn build() -> Result<(OwnedFd, u32)> {
    let text = keymap_text()?;
    let mut file = NamedTempFile::new()
        .map_err(|e| WaymonError::Injection(format!("keymap temp file: {e}")))?;
    file.write_all(text.as_bytes())
        .map_err(|e| WaymonError::Injection(format!("keymap write: {e}")))?;
    file.write_all(b"\0")
        .map_err(|e| WaymonError::Injection(format!("keymap write: {e}")))?;
    let size = text.len() as u32 + 1;
    let fd: OwnedFd = file.into_file().into();
    Ok((fd, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn compiled_keymap_is_nonempty_text() {
        let text = keymap_text().unwrap();
        assert!(text.contains("xkb_keymap"));
    }

    #[test]
    fn build_produces_null_terminated_blob() {
        let (fd, size) = build().unwrap();
        assert!(size > 1);
        let _ = fd.as_fd();
    }
}
