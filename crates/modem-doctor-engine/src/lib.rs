//! # Modem watchdog engine
//!
//! Periodically probes the WAN link and walks an escalation ladder of modem
//! remediation actions until service recovers:
//!
//! ```text
//! Healthy ──down──▶ interface restart ──down──▶ airplane toggle ──down──▶ hard reset ⟲
//!    ▲                     │                          │                       │
//!    └────────────up───────┴─────────────up───────────┴──────────up──────────┘
//! ```
//!
//! High latency on a live link triggers a forced cell reselection instead,
//! outside the ladder.
//!
//! - [`probe`]: connectivity and latency probing over a [`probe::Pinger`]
//! - [`ladder`]: the escalation transition table
//! - [`modem`]: the modem control contract the engine drives
//! - [`controller`]: probe → decide → act, owns the watchdog state
//! - [`status`]: snapshot publication and the bounded log
//! - [`scheduler`]: enable/disable lifecycle and the fixed-interval loop

pub mod controller;
pub mod ladder;
pub mod modem;
pub mod probe;
pub mod scheduler;
pub mod status;
pub mod test_util;

pub use controller::EscalationController;
pub use modem::{ActionError, ModemControl, RemedialAction, TelemetryError};
pub use probe::{LinkProbe, Pinger, ProbeError, ProbeResult, Prober};
pub use scheduler::Watchdog;
pub use status::{LogBuffer, LogEntry, StatusPublisher};
