//! Injection Engine (4.H): the receiving side of a two-host session. Applies
//! normalized events to the local compositor through Wayland's wlroots
//! virtual-input protocols.
//!
//! This is deliberately not shaped as a shared trait with the Capture
//! Engine: the two sides read and write disjoint protocols (kernel evdev vs
//! Wayland), have different threading models (an actor task vs a plain
//! `&mut self` struct), and a forced common interface would only hide that
//! difference behind a name. Callers duck-type: anything that can
//! `inject_motion`/`inject_button`/... is an injection backend.

pub mod keycodes;
pub mod keymap;

#[cfg(target_os = "linux")]
mod wlroots;

#[cfg(target_os = "linux")]
pub use wlroots::InjectionEngine;
