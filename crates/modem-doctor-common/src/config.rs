use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        expected: String,
    },
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Raw input (everything optional) ─────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoctorConfigInput {
    pub enabled: bool,
    pub watchdog: WatchdogConfigInput,
    pub modem: ModemConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchdogConfigInput {
    pub ping_target: Option<String>,
    pub interval: Option<u64>,
    pub latency_threshold: Option<u64>,
    pub ping_count: Option<u64>,
    pub latency_pings: Option<u64>,
    pub ping_timeout: Option<u64>,
    pub recovery_wait: Option<u64>,
    pub max_hard_resets: Option<u64>,
    pub log_capacity: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModemConfigInput {
    pub auto_detect: Option<bool>,
    #[serde(alias = "iface_name")]
    pub interface: Option<String>,
    pub wwan_device: Option<String>,
    pub at_port: Option<String>,
    pub at_command: Option<Vec<String>>,
    pub command_timeout: Option<u64>,
    pub airplane_settle: Option<u64>,
}

// ── Resolved config ─────────────────────────────────────────────────

/// Probing and escalation policy. Immutable for one loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    pub ping_target: String,
    pub interval: Duration,
    pub latency_threshold_ms: f64,
    pub ping_count: u32,
    pub latency_pings: u32,
    pub ping_timeout: Duration,
    pub recovery_wait: Duration,
    /// Consecutive hard resets allowed per outage; `None` retries forever.
    pub max_hard_resets: Option<u32>,
    pub log_capacity: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            ping_target: "1.1.1.1".into(),
            interval: Duration::from_secs(120),
            latency_threshold_ms: 500.0,
            ping_count: 3,
            latency_pings: 20,
            ping_timeout: Duration::from_secs(5),
            recovery_wait: Duration::from_secs(15),
            max_hard_resets: None,
            log_capacity: 200,
        }
    }
}

/// How to reach the modem.
#[derive(Debug, Clone, PartialEq)]
pub struct ModemConfig {
    /// Look the modem's WAN interface up in netifd before each restart.
    pub auto_detect: bool,
    /// Logical WAN interface passed to `ifdown`/`ifup`. With `auto_detect`
    /// on, only used when detection finds nothing.
    pub interface: String,
    /// Network device (`wwan0`, `usb0`) that picks between several modem
    /// interfaces during detection.
    pub wwan_device: Option<String>,
    pub at_port: String,
    /// Helper argv that sends a single AT command; `{port}` is substituted
    /// and the command itself is appended.
    pub at_command: Vec<String>,
    pub command_timeout: Duration,
    pub airplane_settle: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            interface: "wwan".into(),
            wwan_device: None,
            at_port: "/dev/ttyUSB2".into(),
            at_command: vec!["sms_tool".into(), "-d".into(), "{port}".into(), "at".into()],
            command_timeout: Duration::from_secs(10),
            airplane_settle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoctorConfig {
    pub enabled: bool,
    pub watchdog: WatchdogConfig,
    pub modem: ModemConfig,
}

fn at_least(
    field: &'static str,
    value: Option<u64>,
    default: u64,
    min: u64,
) -> Result<u64, ConfigError> {
    let v = value.unwrap_or(default);
    if v < min {
        return Err(ConfigError::OutOfRange {
            field,
            value: v,
            expected: format!(">= {min}"),
        });
    }
    Ok(v)
}

fn within(
    field: &'static str,
    value: Option<u64>,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let v = value.unwrap_or(default);
    if !(min..=max).contains(&v) {
        return Err(ConfigError::OutOfRange {
            field,
            value: v,
            expected: format!("{min}..={max}"),
        });
    }
    Ok(v)
}

fn non_empty(
    field: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<String, ConfigError> {
    let v = value
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| default.to_string());
    if v.is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(v)
}

impl WatchdogConfigInput {
    pub fn resolve(self) -> Result<WatchdogConfig, ConfigError> {
        let d = WatchdogConfig::default();

        let ping_target = non_empty("watchdog.ping_target", self.ping_target, &d.ping_target)?;
        // The target ends up on a command line.
        if ping_target.starts_with('-') || ping_target.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "watchdog.ping_target",
                reason: format!("{ping_target:?} is not a host name or address"),
            });
        }

        let interval = at_least("watchdog.interval", self.interval, d.interval.as_secs(), 30)?;
        let latency_threshold = at_least(
            "watchdog.latency_threshold",
            self.latency_threshold,
            d.latency_threshold_ms as u64,
            50,
        )?;
        let ping_count =
            within("watchdog.ping_count", self.ping_count, d.ping_count.into(), 1, 10)?;
        let latency_pings = within(
            "watchdog.latency_pings",
            self.latency_pings,
            d.latency_pings.into(),
            1,
            50,
        )?;
        let ping_timeout = within(
            "watchdog.ping_timeout",
            self.ping_timeout,
            d.ping_timeout.as_secs(),
            1,
            30,
        )?;
        let recovery_wait = at_least(
            "watchdog.recovery_wait",
            self.recovery_wait,
            d.recovery_wait.as_secs(),
            5,
        )?;
        let max_hard_resets =
            within("watchdog.max_hard_resets", self.max_hard_resets, 0, 0, 1000)?;
        let log_capacity = within(
            "watchdog.log_capacity",
            self.log_capacity,
            d.log_capacity as u64,
            10,
            10_000,
        )?;

        Ok(WatchdogConfig {
            ping_target,
            interval: Duration::from_secs(interval),
            latency_threshold_ms: latency_threshold as f64,
            ping_count: ping_count as u32,
            latency_pings: latency_pings as u32,
            ping_timeout: Duration::from_secs(ping_timeout),
            recovery_wait: Duration::from_secs(recovery_wait),
            max_hard_resets: (max_hard_resets > 0).then_some(max_hard_resets as u32),
            log_capacity: log_capacity as usize,
        })
    }
}

impl ModemConfigInput {
    pub fn resolve(self) -> Result<ModemConfig, ConfigError> {
        let d = ModemConfig::default();

        let interface = non_empty("modem.interface", self.interface, &d.interface)?;
        let wwan_device = self
            .wwan_device
            .map(|dev| dev.trim().to_string())
            .filter(|dev| !dev.is_empty() && dev != "auto");
        let at_port = non_empty("modem.at_port", self.at_port, &d.at_port)?;
        let at_command: Vec<String> = self
            .at_command
            .unwrap_or(d.at_command)
            .into_iter()
            .map(|arg| arg.trim().to_string())
            .filter(|arg| !arg.is_empty())
            .collect();
        if at_command.is_empty() {
            return Err(ConfigError::Invalid {
                field: "modem.at_command",
                reason: "needs at least the helper program".into(),
            });
        }
        let command_timeout = within(
            "modem.command_timeout",
            self.command_timeout,
            d.command_timeout.as_secs(),
            1,
            120,
        )?;
        let airplane_settle = within(
            "modem.airplane_settle",
            self.airplane_settle,
            d.airplane_settle.as_secs(),
            0,
            60,
        )?;

        Ok(ModemConfig {
            auto_detect: self.auto_detect.unwrap_or(d.auto_detect),
            interface,
            wwan_device,
            at_port,
            at_command,
            command_timeout: Duration::from_secs(command_timeout),
            airplane_settle: Duration::from_secs(airplane_settle),
        })
    }
}

impl DoctorConfigInput {
    pub fn resolve(self) -> Result<DoctorConfig, ConfigError> {
        Ok(DoctorConfig {
            enabled: self.enabled,
            watchdog: self.watchdog.resolve()?,
            modem: self.modem.resolve()?,
        })
    }
}

impl DoctorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(DoctorConfig::default());
        }
        let parsed: DoctorConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
