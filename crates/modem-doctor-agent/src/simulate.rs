//! Simulated network and modem for `--simulate`.
//!
//! The pinger and the modem share one [`SimulatedLink`]: the link drops out
//! now and then, remediation actions bring it back with some probability,
//! and latency spikes occasionally so cell reselection gets exercised too.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use modem_doctor_common::config::ModemConfig;
use modem_doctor_common::models::{ModemSnapshot, RegistrationState, SignalSnapshot};
use modem_doctor_engine::modem::{ActionError, ModemControl, TelemetryError};
use modem_doctor_engine::probe::{PingOutcome, Pinger, ProbeError};

use crate::state::Reconfigure;

/// Chance per ping round that a healthy link drops.
const OUTAGE_CHANCE: f64 = 0.02;
/// Chance per ping round that RTTs spike above a typical threshold.
const SPIKE_CHANCE: f64 = 0.05;

#[derive(Debug, Default)]
pub struct SimulatedLink {
    /// Ping rounds left until the outage clears by itself.
    outage_rounds: AtomicU32,
    /// Set by airplane toggle; cleared by the next ping round.
    radio_off: AtomicBool,
}

impl SimulatedLink {
    pub fn is_down(&self) -> bool {
        self.outage_rounds.load(Ordering::Relaxed) > 0 || self.radio_off.load(Ordering::Relaxed)
    }

    /// Force an outage lasting `rounds` ping rounds.
    pub fn drop_for(&self, rounds: u32) {
        self.outage_rounds.store(rounds, Ordering::Relaxed);
    }

    fn repair(&self, chance: f64) -> bool {
        let fixed = rand::rng().random_bool(chance);
        if fixed {
            self.outage_rounds.store(0, Ordering::Relaxed);
        }
        fixed
    }

    fn round(&self, count: u32) -> Vec<PingOutcome> {
        let mut rng = rand::rng();
        self.radio_off.store(false, Ordering::Relaxed);

        let left = self.outage_rounds.load(Ordering::Relaxed);
        if left > 0 {
            self.outage_rounds.store(left - 1, Ordering::Relaxed);
            return vec![Err(ProbeError::Timeout); count as usize];
        }
        if rng.random_bool(OUTAGE_CHANCE) {
            let rounds = rng.random_range(2..12);
            self.outage_rounds.store(rounds, Ordering::Relaxed);
            tracing::debug!(rounds, "simulated outage begins");
            return vec![Err(ProbeError::Timeout); count as usize];
        }

        let base = if rng.random_bool(SPIKE_CHANCE) {
            rng.random_range(550.0..900.0)
        } else {
            rng.random_range(25.0..70.0)
        };
        (0..count)
            .map(|_| {
                if rng.random_bool(0.02) {
                    Err(ProbeError::Timeout)
                } else {
                    Ok(base + rng.random_range(-10.0..10.0_f64))
                }
            })
            .collect()
    }
}

pub struct SimulatedPinger {
    link: Arc<SimulatedLink>,
}

impl SimulatedPinger {
    pub fn new(link: Arc<SimulatedLink>) -> Self {
        Self { link }
    }
}

impl Pinger for SimulatedPinger {
    async fn ping(&self, _target: &str, count: u32, _timeout: Duration) -> Vec<PingOutcome> {
        self.link.round(count)
    }
}

pub struct SimulatedModem {
    link: Arc<SimulatedLink>,
}

impl SimulatedModem {
    pub fn new(link: Arc<SimulatedLink>) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &SimulatedLink {
        &self.link
    }

    fn telemetry(&self) -> (ModemSnapshot, SignalSnapshot) {
        let mut rng = rand::rng();
        let modem = ModemSnapshot {
            model: Some("RM520N-GL".into()),
            firmware: Some("RM520NGLAAR01A07M4G".into()),
            temperature_c: Some(f64::from(rng.random_range(38..49_i32))),
        };
        let signal = if self.link.is_down() {
            SignalSnapshot {
                state: Some(RegistrationState::Search),
                ..Default::default()
            }
        } else {
            SignalSnapshot {
                state: Some(RegistrationState::Connect),
                rat: Some("NR5G-SA".into()),
                band: Some("n78".into()),
                rsrp_dbm: Some(-80 - rng.random_range(0..20)),
                rsrq_db: Some(-9 - rng.random_range(0..5)),
                sinr_db: Some(f64::from(rng.random_range(5..22_i32))),
                cellid: Some("E9B5A001".into()),
            }
        };
        (modem, signal)
    }
}

impl Reconfigure for SimulatedModem {
    fn reconfigure(&self, config: &ModemConfig) {
        tracing::debug!(interface = %config.interface, "simulated modem ignores modem settings");
    }
}

impl ModemControl for SimulatedModem {
    async fn read_telemetry(&self) -> Result<(ModemSnapshot, SignalSnapshot), TelemetryError> {
        Ok(self.telemetry())
    }

    async fn restart_interface(&self) -> Result<(), ActionError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let fixed = self.link.repair(0.4);
        tracing::info!(fixed, "simulated interface restart");
        Ok(())
    }

    async fn toggle_airplane_mode(&self) -> Result<(), ActionError> {
        self.link.radio_off.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let fixed = self.link.repair(0.7);
        tracing::info!(fixed, "simulated airplane mode toggle");
        Ok(())
    }

    async fn hard_reset_modem(&self) -> Result<(), ActionError> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let fixed = self.link.repair(1.0);
        tracing::info!(fixed, "simulated modem reset");
        Ok(())
    }

    async fn force_cell_reselection(&self) -> Result<(), ActionError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        tracing::info!("simulated cell reselection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forced_outage_times_out_then_clears() {
        let link = Arc::new(SimulatedLink::default());
        let pinger = SimulatedPinger::new(link.clone());
        link.drop_for(2);

        for _ in 0..2 {
            let round = pinger.ping("1.1.1.1", 3, Duration::from_secs(1)).await;
            assert_eq!(round.len(), 3);
            assert!(round.iter().all(|o| o.is_err()));
        }
        assert!(!link.is_down());
    }

    #[tokio::test]
    async fn rounds_have_requested_length() {
        let link = Arc::new(SimulatedLink::default());
        let pinger = SimulatedPinger::new(link);
        for count in [1, 5, 20] {
            let round = pinger.ping("1.1.1.1", count, Duration::from_secs(1)).await;
            assert_eq!(round.len(), count as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hard_reset_always_repairs() {
        let link = Arc::new(SimulatedLink::default());
        let modem = SimulatedModem::new(link.clone());
        link.drop_for(50);
        modem.hard_reset_modem().await.unwrap();
        assert!(!modem.link().is_down());
    }

    #[tokio::test]
    async fn telemetry_reflects_link_state() {
        let link = Arc::new(SimulatedLink::default());
        let modem = SimulatedModem::new(link.clone());

        let (info, signal) = modem.read_telemetry().await.unwrap();
        assert_eq!(info.model.as_deref(), Some("RM520N-GL"));
        assert_eq!(signal.state, Some(RegistrationState::Connect));
        assert!(signal.rsrp_dbm.is_some());

        link.drop_for(3);
        let (_, signal) = modem.read_telemetry().await.unwrap();
        assert_eq!(signal.state, Some(RegistrationState::Search));
        assert_eq!(signal.rsrp_dbm, None);
    }
}
