//! Data models for modem-doctor.
//!
//! These types are produced by the watchdog engine and served verbatim by the
//! status surface. Field names on the wire follow what the router dashboard
//! reads (`temperature`, `rsrp`, `last_avg_latency`, ...), so renames live
//! here rather than in the HTTP layer.

use serde::{Deserialize, Serialize};

// ── Modem ───────────────────────────────────────────────────────────

/// Identity and health of the modem itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModemSnapshot {
    pub model: Option<String>,
    pub firmware: Option<String>,
    #[serde(rename = "temperature")]
    pub temperature_c: Option<f64>,
}

// ── Signal ──────────────────────────────────────────────────────────

/// Serving-cell registration state as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    #[serde(rename = "NOCONN")]
    NoConn,
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "LIMSRV")]
    LimSrv,
    #[serde(rename = "SEARCH")]
    Search,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::NoConn => "NOCONN",
            RegistrationState::Connect => "CONNECT",
            RegistrationState::LimSrv => "LIMSRV",
            RegistrationState::Search => "SEARCH",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"') {
            "NOCONN" => Ok(RegistrationState::NoConn),
            "CONNECT" => Ok(RegistrationState::Connect),
            "LIMSRV" => Ok(RegistrationState::LimSrv),
            "SEARCH" => Ok(RegistrationState::Search),
            other => Err(format!("unknown registration state: {other}")),
        }
    }
}

/// Radio metrics of the serving cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub state: Option<RegistrationState>,
    /// Radio access technology, e.g. `LTE`, `NR5G-SA`.
    pub rat: Option<String>,
    pub band: Option<String>,
    #[serde(rename = "rsrp")]
    pub rsrp_dbm: Option<i32>,
    #[serde(rename = "rsrq")]
    pub rsrq_db: Option<i32>,
    #[serde(rename = "sinr")]
    pub sinr_db: Option<f64>,
    pub cellid: Option<String>,
}

// ── Watchdog ────────────────────────────────────────────────────────

/// The most recent thing the watchdog did. Overwritten, never queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    None,
    Started,
    Ok,
    InterfaceRestart,
    AirplaneToggle,
    HardReset,
    CellReselection,
    CellReselectionDone,
    RecoveryComplete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::Started => "started",
            ActionKind::Ok => "ok",
            ActionKind::InterfaceRestart => "interface_restart",
            ActionKind::AirplaneToggle => "airplane_toggle",
            ActionKind::HardReset => "hard_reset",
            ActionKind::CellReselection => "cell_reselection",
            ActionKind::CellReselectionDone => "cell_reselection_done",
            ActionKind::RecoveryComplete => "recovery_complete",
        }
    }

    /// Idle values carry no timestamp of their own.
    pub fn is_idle(&self) -> bool {
        matches!(self, ActionKind::None | ActionKind::Ok)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watchdog bookkeeping. Timestamps are Unix seconds, `0` meaning never.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchdogState {
    pub running: bool,
    pub enabled: bool,
    pub last_check: i64,
    /// Mean RTT of the last latency check, `0.0` when unknown.
    #[serde(rename = "last_avg_latency")]
    pub last_avg_latency_ms: f64,
    pub last_action: ActionKind,
    pub last_action_time: i64,
    pub escalation_level: u8,
}

// ── Status ──────────────────────────────────────────────────────────

/// Everything a status consumer sees, published as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub modem: ModemSnapshot,
    pub signal: SignalSnapshot,
    pub watchdog: WatchdogState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_wire_names() {
        let json = serde_json::to_string(&ActionKind::CellReselectionDone).unwrap();
        assert_eq!(json, "\"cell_reselection_done\"");
        let back: ActionKind = serde_json::from_str("\"interface_restart\"").unwrap();
        assert_eq!(back, ActionKind::InterfaceRestart);
        assert_eq!(ActionKind::HardReset.to_string(), "hard_reset");
    }

    #[test]
    fn idle_actions() {
        assert!(ActionKind::None.is_idle());
        assert!(ActionKind::Ok.is_idle());
        assert!(!ActionKind::Started.is_idle());
        assert!(!ActionKind::RecoveryComplete.is_idle());
    }

    #[test]
    fn registration_state_parses_quoted() {
        assert_eq!(
            "\"LIMSRV\"".parse::<RegistrationState>(),
            Ok(RegistrationState::LimSrv)
        );
        assert!("ROAMING".parse::<RegistrationState>().is_err());
    }

    #[test]
    fn default_report_is_absent_everywhere() {
        let v = serde_json::to_value(StatusReport::default()).unwrap();
        assert_eq!(v["watchdog"]["enabled"], false);
        assert_eq!(v["watchdog"]["running"], false);
        assert_eq!(v["watchdog"]["last_action"], "none");
        assert!(v["modem"]["temperature"].is_null());
        assert!(v["signal"]["rsrp"].is_null());
        assert!(v["signal"]["state"].is_null());
    }

    #[test]
    fn signal_uses_dashboard_field_names() {
        let signal = SignalSnapshot {
            state: Some(RegistrationState::Connect),
            rat: Some("LTE".into()),
            band: Some("3".into()),
            rsrp_dbm: Some(-95),
            rsrq_db: Some(-11),
            sinr_db: Some(12.4),
            cellid: Some("1A2B3C4".into()),
        };
        let v = serde_json::to_value(&signal).unwrap();
        assert_eq!(v["state"], "CONNECT");
        assert_eq!(v["rsrp"], -95);
        assert_eq!(v["rsrq"], -11);
        assert_eq!(v["cellid"], "1A2B3C4");
    }
}
