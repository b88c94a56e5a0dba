//! Shared types for modem-doctor.
//!
//! This crate contains:
//! - **Data models**: modem/signal snapshots, watchdog state, action kinds
//! - **Configuration**: TOML parsing, defaults and bounds validation

pub mod config;
pub mod models;
