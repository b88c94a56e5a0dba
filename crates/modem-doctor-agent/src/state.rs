//! Shared agent state: the watchdog behind a lifecycle lock, plus a
//! lock-free status handle for readers.

use std::path::Path;

use modem_doctor_common::config::{DoctorConfig, ModemConfig};
use modem_doctor_engine::{LinkProbe, ModemControl, StatusPublisher, Watchdog};

/// Collaborators whose settings can be swapped without a restart.
pub trait Reconfigure {
    fn reconfigure(&self, config: &ModemConfig);
}

pub struct AgentState<P, M> {
    /// Enable, disable and reload go through this lock one at a time.
    pub watchdog: tokio::sync::Mutex<Watchdog<P, M>>,
    /// Status and log reads never take the watchdog lock.
    pub status: StatusPublisher,
    pub simulate: bool,
}

impl<P: LinkProbe, M: ModemControl> AgentState<P, M> {
    pub fn new(watchdog: Watchdog<P, M>, simulate: bool) -> Self {
        let status = watchdog.status().clone();
        Self {
            watchdog: tokio::sync::Mutex::new(watchdog),
            status,
            simulate,
        }
    }
}

impl<P: LinkProbe, M: ModemControl + Reconfigure> AgentState<P, M> {
    /// Drain the loop, swap in `config`, and start again if `enabled`.
    pub async fn apply_config(&self, config: DoctorConfig) {
        let mut watchdog = self.watchdog.lock().await;
        watchdog.disable().await;
        watchdog.modem().reconfigure(&config.modem);
        watchdog.reconfigure(config.watchdog).await;
        if config.enabled {
            watchdog.enable();
        }
    }

    /// Re-read the config file. An unreadable or invalid file leaves the
    /// running configuration untouched.
    pub async fn reload(&self, path: &Path) -> bool {
        match DoctorConfig::load(path) {
            Ok(config) => {
                self.apply_config(config).await;
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "config reload failed: {e}");
                self.status.append_log(format!(
                    "Configuration reload failed, keeping current settings: {e}"
                ));
                false
            }
        }
    }
}
