//! Error taxonomy for the capture/switch/inject pipeline.
//!
//! Mirrors the six categories from the error-handling design: permission,
//! device, injection, safety, and transport errors are distinct variants so
//! callers can pattern-match on severity instead of parsing strings. Channel-full
//! and safety events are not represented here at all -- they are counted or
//! treated as ordinary state transitions, never returned as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaymonError {
    /// The input-node directory could not be opened, or every keyboard/pointer
    /// node in it refused to open with EACCES. Surfaced once; capture fails to
    /// start entirely.
    #[error(
        "permission denied opening input devices: {0}. \
         add this user to the 'input' group: sudo usermod -aG input $USER (then log out and back in)"
    )]
    Permission(String),

    /// A single device failed to open, grab, or read. Other devices are
    /// unaffected; the offending node is recorded in the ignored set.
    #[error("device error on {path}: {reason}")]
    Device { path: String, reason: String },

    /// A virtual-pointer/virtual-keyboard request could not be sent, or the
    /// corresponding virtual device was never created. Returned to the
    /// transport caller; does not stop the engine.
    #[error("injection failed: {0}")]
    Injection(String),

    /// Opaque failure from the transport collaborator (peer connection, wire
    /// encode/decode). The core never interprets these beyond display.
    #[error("transport error: {0}")]
    Transport(String),

    /// Requested a switch rotation operation that is not well-defined in the
    /// current state (e.g. next()/previous() with fewer than two targets).
    #[error("invalid switch operation: {0}")]
    InvalidSwitch(String),

    /// A Wayland protocol global required by the injection engine was not
    /// advertised by the compositor.
    #[error("compositor does not support required protocol: {0}")]
    UnsupportedProtocol(String),
}

pub type Result<T> = std::result::Result<T, WaymonError>;
