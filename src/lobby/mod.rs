//! Room hosting: registry, per-room state and tick tasks

pub mod manager;
pub mod room;
pub mod session;
