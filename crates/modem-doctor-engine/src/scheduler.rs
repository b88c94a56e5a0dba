//! Enable/disable lifecycle and the fixed-interval check loop.
//!
//! At most one loop runs per [`Watchdog`]. The loop owns the
//! [`EscalationController`] while it runs and hands it back when it drains,
//! so escalation level and last action survive a disable/enable cycle.
//!
//! `enabled` in the published status is the operator's intent and `running`
//! is whether a loop is actually alive. They only differ when a loop died
//! without being disabled.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use modem_doctor_common::config::WatchdogConfig;

use crate::controller::EscalationController;
use crate::modem::ModemControl;
use crate::probe::LinkProbe;
use crate::status::StatusPublisher;

struct RunningLoop<P, M> {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<EscalationController<P, M>>,
}

pub struct Watchdog<P, M> {
    config: Arc<WatchdogConfig>,
    probe: Arc<P>,
    modem: Arc<M>,
    status: StatusPublisher,
    idle: Option<EscalationController<P, M>>,
    running: Option<RunningLoop<P, M>>,
}

impl<P: LinkProbe, M: ModemControl> Watchdog<P, M> {
    pub fn new(config: WatchdogConfig, probe: P, modem: M) -> Self {
        let config = Arc::new(config);
        let probe = Arc::new(probe);
        let modem = Arc::new(modem);
        let status = StatusPublisher::new(config.log_capacity);
        let controller =
            EscalationController::new(config.clone(), probe.clone(), modem.clone(), status.clone());
        Self {
            config,
            probe,
            modem,
            status,
            idle: Some(controller),
            running: None,
        }
    }

    /// Shared handle for readers of status and log.
    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    pub fn is_enabled(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start the loop. Returns `false` if it was already running. A loop
    /// that died on its own is replaced.
    pub fn enable(&mut self) -> bool {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return false;
            }
            tracing::warn!("watchdog loop had ended, starting a new one");
            self.running = None;
        }
        let controller = self.idle.take().unwrap_or_else(|| self.fresh_controller());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(controller, stop_rx, self.status.clone()));
        self.running = Some(RunningLoop { stop_tx, task });
        true
    }

    /// Stop the loop and wait for the current iteration to finish. A no-op
    /// when already stopped.
    pub async fn disable(&mut self) {
        let Some(RunningLoop { stop_tx, task }) = self.running.take() else {
            return;
        };
        let _ = stop_tx.send(true);
        let mut controller = match task.await {
            Ok(controller) => controller,
            Err(e) => {
                tracing::error!("watchdog loop ended abnormally: {e}");
                self.fresh_controller()
            }
        };
        controller.stop();
        self.idle = Some(controller);
    }

    /// Apply a new configuration. A running loop is drained and restarted
    /// with it.
    pub async fn reconfigure(&mut self, config: WatchdogConfig) {
        let was_enabled = self.is_enabled();
        self.disable().await;

        self.config = Arc::new(config);
        self.status.set_log_capacity(self.config.log_capacity);
        if let Some(controller) = self.idle.as_mut() {
            controller.set_config(self.config.clone());
        }
        self.status.append_log("Configuration reloaded");
        tracing::info!(
            interval = self.config.interval.as_secs(),
            target_host = %self.config.ping_target,
            "watchdog configuration reloaded"
        );

        if was_enabled {
            self.enable();
        }
    }

    fn fresh_controller(&self) -> EscalationController<P, M> {
        EscalationController::new(
            self.config.clone(),
            self.probe.clone(),
            self.modem.clone(),
            self.status.clone(),
        )
    }
}

/// Publishes `running = false` if the loop goes away without draining.
struct LoopGuard {
    status: StatusPublisher,
    drained: bool,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if self.drained {
            return;
        }
        tracing::error!("watchdog loop ended unexpectedly");
        self.status.mark_halted();
        self.status.append_log("Watchdog loop crashed, re-enable to restart it");
    }
}

async fn run_loop<P: LinkProbe, M: ModemControl>(
    mut controller: EscalationController<P, M>,
    mut stop: watch::Receiver<bool>,
    status: StatusPublisher,
) -> EscalationController<P, M> {
    let mut guard = LoopGuard {
        status,
        drained: false,
    };
    controller.start().await;

    loop {
        if *stop.borrow_and_update() {
            break;
        }

        controller.run_cycle(&stop).await;
        tracing::debug!(
            escalation = controller.state().escalation_level,
            action = %controller.state().last_action,
            "check complete"
        );

        tokio::select! {
            _ = tokio::time::sleep(controller.config().interval) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    guard.drained = true;
    controller
}
