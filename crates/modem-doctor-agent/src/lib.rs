//! modem-doctor agent
//!
//! The daemon around the watchdog engine:
//!
//! - [`ping`] probes the WAN with the system `ping` binary
//! - [`at`] and [`quectel`] drive a Quectel modem over AT commands
//! - [`simulate`] stands in for both when running without hardware
//! - [`portal`] serves status, log and watchdog control over HTTP
//! - [`state`] ties the running watchdog to the API and config reloads

pub mod at;
pub mod ping;
pub mod portal;
pub mod quectel;
pub mod simulate;
pub mod state;

pub use state::{AgentState, Reconfigure};
