//! Modem control contract.
//!
//! The engine never talks to hardware directly. It drives whatever
//! implements [`ModemControl`]: the Quectel AT-command driver and the
//! simulator in the agent, or a scripted modem in tests.

use std::future::Future;
use std::time::Duration;

use modem_doctor_common::models::{ActionKind, ModemSnapshot, SignalSnapshot};
use thiserror::Error;

/// Modem or signal information could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("modem unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected modem response: {0}")]
    Malformed(String),
}

/// A remediation command did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("`{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("modem rejected `{command}`: {response}")]
    Rejected { command: String, response: String },
}

pub trait ModemControl: Send + Sync + 'static {
    fn read_telemetry(
        &self,
    ) -> impl Future<Output = Result<(ModemSnapshot, SignalSnapshot), TelemetryError>> + Send;

    fn restart_interface(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    fn toggle_airplane_mode(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    fn hard_reset_modem(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    fn force_cell_reselection(&self) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// A side-effecting remediation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemedialAction {
    InterfaceRestart,
    AirplaneToggle,
    HardReset,
    CellReselection,
}

impl RemedialAction {
    /// The action recorded in the watchdog state when this step runs.
    pub fn kind(self) -> ActionKind {
        match self {
            RemedialAction::InterfaceRestart => ActionKind::InterfaceRestart,
            RemedialAction::AirplaneToggle => ActionKind::AirplaneToggle,
            RemedialAction::HardReset => ActionKind::HardReset,
            RemedialAction::CellReselection => ActionKind::CellReselection,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            RemedialAction::InterfaceRestart => "restarting WAN interface",
            RemedialAction::AirplaneToggle => "toggling airplane mode",
            RemedialAction::HardReset => "hard-resetting modem",
            RemedialAction::CellReselection => "forcing cell reselection",
        }
    }

    /// Run the matching modem control operation.
    pub async fn apply<M: ModemControl>(self, modem: &M) -> Result<(), ActionError> {
        match self {
            RemedialAction::InterfaceRestart => modem.restart_interface().await,
            RemedialAction::AirplaneToggle => modem.toggle_airplane_mode().await,
            RemedialAction::HardReset => modem.hard_reset_modem().await,
            RemedialAction::CellReselection => modem.force_cell_reselection().await,
        }
    }
}

impl std::fmt::Display for RemedialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ModemCall, ScriptedModem};

    #[tokio::test]
    async fn apply_dispatches_to_matching_operation() {
        let modem = ScriptedModem::new();
        for action in [
            RemedialAction::InterfaceRestart,
            RemedialAction::AirplaneToggle,
            RemedialAction::HardReset,
            RemedialAction::CellReselection,
        ] {
            action.apply(&modem).await.unwrap();
        }
        assert_eq!(
            modem.calls(),
            vec![
                ModemCall::RestartInterface,
                ModemCall::ToggleAirplaneMode,
                ModemCall::HardReset,
                ModemCall::CellReselection,
            ]
        );
    }

    #[tokio::test]
    async fn apply_surfaces_action_errors() {
        let modem = ScriptedModem::new();
        modem.fail(ModemCall::HardReset);
        let err = RemedialAction::HardReset.apply(&modem).await.unwrap_err();
        assert!(matches!(err, ActionError::Command { .. }));
    }

    #[test]
    fn kinds_match_wire_names() {
        assert_eq!(RemedialAction::AirplaneToggle.to_string(), "airplane_toggle");
        assert_eq!(RemedialAction::CellReselection.kind(), ActionKind::CellReselection);
    }
}
