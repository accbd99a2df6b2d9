//! Bulwark Server Library
//!
//! Authoritative simulation server for a cooperative tower-defense game.
//! Each room runs its own fixed-rate tick loop and broadcasts snapshots;
//! the client transport sits outside this crate.
//!
//! # Features
//!
//! - `lobby` - Room registry and per-room tick tasks (enabled by default)
//! - `metrics_extended` - Per-entity gauges on the metrics endpoint (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;

#[cfg(feature = "lobby")]
pub mod lobby;
