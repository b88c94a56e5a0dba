//! # Escalation controller
//!
//! Owns the [`WatchdogState`] and drives one check at a time:
//!
//! 1. Probe connectivity and latency.
//! 2. Link down: climb the [ladder](crate::ladder) one rung per failed
//!    check, running the rung's remediation and waiting `recovery_wait`
//!    before re-probing. The walk stops at the first successful re-probe or
//!    after the hard reset step.
//! 3. Link up: close any open escalation (`recovery_complete`), confirm a
//!    pending cell reselection, and force a reselection if the mean latency
//!    is above threshold.
//! 4. Refresh modem telemetry and publish.
//!
//! A failed remediation is logged and still counts as attempted, so a
//! broken command can never pin the ladder below hard reset. A stop request
//! is honoured between steps, never in the middle of one.

use std::sync::Arc;

use tokio::sync::watch;

use modem_doctor_common::config::WatchdogConfig;
use modem_doctor_common::models::{ActionKind, ModemSnapshot, SignalSnapshot, WatchdogState};

use crate::ladder::{self, Outcome, Rung};
use crate::modem::{ModemControl, RemedialAction};
use crate::probe::{LinkProbe, ProbeResult};
use crate::status::StatusPublisher;

pub struct EscalationController<P, M> {
    config: Arc<WatchdogConfig>,
    probe: Arc<P>,
    modem: Arc<M>,
    status: StatusPublisher,
    state: WatchdogState,
    rung: Rung,
    modem_info: ModemSnapshot,
    signal: SignalSnapshot,
    /// A reselection was issued and awaits the next good check.
    reselection_pending: bool,
    /// Hard resets issued since the link was last healthy.
    hard_resets: u32,
    hard_reset_limit_logged: bool,
    telemetry_failing: bool,
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

impl<P: LinkProbe, M: ModemControl> EscalationController<P, M> {
    pub fn new(
        config: Arc<WatchdogConfig>,
        probe: Arc<P>,
        modem: Arc<M>,
        status: StatusPublisher,
    ) -> Self {
        Self {
            config,
            probe,
            modem,
            status,
            state: WatchdogState::default(),
            rung: Rung::Healthy,
            modem_info: ModemSnapshot::default(),
            signal: SignalSnapshot::default(),
            reselection_pending: false,
            hard_resets: 0,
            hard_reset_limit_logged: false,
            telemetry_failing: false,
        }
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn rung(&self) -> Rung {
        self.rung
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Takes effect from the next check.
    pub fn set_config(&mut self, config: Arc<WatchdogConfig>) {
        self.config = config;
    }

    /// Record the start of a loop run, before any probing.
    pub async fn start(&mut self) {
        self.state.enabled = true;
        self.state.running = true;
        self.record(ActionKind::Started);
        self.info(format!(
            "Watchdog started: pinging {} every {}s",
            self.config.ping_target,
            self.config.interval.as_secs()
        ));
        self.refresh_telemetry().await;
        self.publish();
    }

    pub fn stop(&mut self) {
        self.state.enabled = false;
        self.state.running = false;
        self.info("Watchdog stopped".to_string());
        self.publish();
    }

    /// One probe → decide → act → publish pass.
    pub async fn run_cycle(&mut self, stop: &watch::Receiver<bool>) {
        let result = self.probe.probe(&self.config).await;
        self.observe(&result);

        if result.connected {
            self.on_link_up(&result).await;
        } else {
            self.reselection_pending = false;
            self.warn(format!(
                "Connectivity lost: {} ping(s) to {} failed",
                self.config.ping_count, self.config.ping_target
            ));
            self.escalate(stop).await;
        }

        self.refresh_telemetry().await;
        self.publish();
    }

    async fn on_link_up(&mut self, result: &ProbeResult) {
        self.apply_up();

        if self.reselection_pending {
            self.reselection_pending = false;
            self.record(ActionKind::CellReselectionDone);
            self.info(format!(
                "Cell reselection complete, latency now {}",
                format_latency(result.avg_latency_ms)
            ));
        }

        match result.avg_latency_ms {
            Some(avg) if avg > self.config.latency_threshold_ms => self.reselect(avg).await,
            _ => {
                if matches!(self.state.last_action, ActionKind::None | ActionKind::Started) {
                    self.record(ActionKind::Ok);
                }
                tracing::debug!(
                    latency = %format_latency(result.avg_latency_ms),
                    "link healthy"
                );
            }
        }
    }

    /// Close an open escalation if there is one.
    fn apply_up(&mut self) {
        let transition = ladder::step(self.rung, Outcome::Up);
        if !transition.recovered {
            return;
        }
        let from = self.rung.level();
        self.rung = transition.next;
        self.state.escalation_level = self.rung.level();
        self.hard_resets = 0;
        self.hard_reset_limit_logged = false;
        self.record(ActionKind::RecoveryComplete);
        self.info(format!("Connectivity restored (was at escalation level {from})"));
    }

    async fn reselect(&mut self, avg: f64) {
        self.warn(format!(
            "High latency: {avg:.1} ms > {:.0} ms, forcing cell reselection",
            self.config.latency_threshold_ms
        ));
        self.record(ActionKind::CellReselection);
        self.publish();

        match RemedialAction::CellReselection.apply(&*self.modem).await {
            Ok(()) => self.reselection_pending = true,
            Err(e) => self.warn(format!("Cell reselection failed: {e}")),
        }
    }

    async fn escalate(&mut self, stop: &watch::Receiver<bool>) {
        loop {
            let transition = ladder::step(self.rung, Outcome::Down);
            let Some(action) = transition.action else {
                return;
            };

            if action == RemedialAction::HardReset && self.hard_reset_limit_reached() {
                self.rung = transition.next;
                self.state.escalation_level = self.rung.level();
                if !self.hard_reset_limit_logged {
                    self.hard_reset_limit_logged = true;
                    self.warn(format!(
                        "Giving up on hard resets after {} attempt(s), waiting for the link to return",
                        self.hard_resets
                    ));
                }
                return;
            }

            self.rung = transition.next;
            self.state.escalation_level = self.rung.level();
            if action == RemedialAction::HardReset {
                self.hard_resets += 1;
            }
            self.record(action.kind());
            self.warn(format!(
                "Escalation level {}: {}",
                self.rung.level(),
                action.describe()
            ));
            self.publish();

            if let Err(e) = action.apply(&*self.modem).await {
                self.warn(format!("{action} failed: {e}"));
            }

            tokio::time::sleep(self.config.recovery_wait).await;
            if stop_requested(stop) {
                self.info(format!(
                    "Stop requested, leaving escalation at level {}",
                    self.rung.level()
                ));
                return;
            }

            let result = self.probe.probe(&self.config).await;
            self.observe(&result);
            if result.connected {
                self.on_link_up(&result).await;
                return;
            }

            if self.rung.is_top() {
                self.warn("Still down after hard reset, retrying on next check".to_string());
                return;
            }
            self.info(format!(
                "Still down after {}, escalating",
                action.describe()
            ));
            self.publish();
        }
    }

    fn hard_reset_limit_reached(&self) -> bool {
        self.config
            .max_hard_resets
            .is_some_and(|max| self.hard_resets >= max)
    }

    fn observe(&mut self, result: &ProbeResult) {
        self.state.last_check = result.timestamp;
        self.state.last_avg_latency_ms = result.avg_latency_ms.unwrap_or(0.0);
    }

    fn record(&mut self, action: ActionKind) {
        self.state.last_action = action;
        if !action.is_idle() {
            self.state.last_action_time = chrono::Utc::now().timestamp();
        }
    }

    /// Failures keep the previous snapshots. Every failed read is logged;
    /// the first good read after a failure says so.
    async fn refresh_telemetry(&mut self) {
        match self.modem.read_telemetry().await {
            Ok((modem_info, signal)) => {
                if self.telemetry_failing {
                    self.telemetry_failing = false;
                    self.info("Modem telemetry available again".to_string());
                }
                self.modem_info = modem_info;
                self.signal = signal;
            }
            Err(e) => {
                self.telemetry_failing = true;
                self.warn(format!("Cannot read modem telemetry: {e}"));
            }
        }
    }

    fn publish(&self) {
        self.status
            .publish(self.modem_info.clone(), self.signal.clone(), self.state.clone());
    }

    fn info(&self, message: String) {
        tracing::info!(escalation = self.state.escalation_level, "{message}");
        self.status.append_log(message);
    }

    fn warn(&self, message: String) {
        tracing::warn!(escalation = self.state.escalation_level, "{message}");
        self.status.append_log(message);
    }
}

fn format_latency(avg: Option<f64>) -> String {
    match avg {
        Some(ms) => format!("{ms:.1} ms"),
        None => "unknown".into(),
    }
}
