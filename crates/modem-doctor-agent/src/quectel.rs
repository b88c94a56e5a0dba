//! Quectel modem control over AT commands.
//!
//! Targets the RM5xx/RG5xx/EM1xx families: telemetry from `ATI`,
//! `AT+QTEMP` and `AT+QENG="servingcell"`; remediation through `AT+CFUN`
//! and `AT+COPS`. The WAN interface itself is bounced with `ifdown`/`ifup`,
//! after looking it up in netifd when `auto_detect` is on.

use arc_swap::ArcSwap;
use serde::Deserialize;

use modem_doctor_common::config::ModemConfig;
use modem_doctor_common::models::{ModemSnapshot, RegistrationState, SignalSnapshot};
use modem_doctor_engine::modem::{ActionError, ModemControl, TelemetryError};

use crate::at::{self, CommandError};
use crate::state::Reconfigure;

pub struct QuectelModem {
    config: ArcSwap<ModemConfig>,
}

impl QuectelModem {
    pub fn new(config: ModemConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    async fn at(&self, command: &str) -> Result<String, ActionError> {
        let config = self.config.load_full();
        at::send(&config, command)
            .await
            .map_err(|e| action_error(command, e))
    }

    async fn ifctl(
        &self,
        config: &ModemConfig,
        program: &str,
        iface: &str,
    ) -> Result<(), ActionError> {
        let argv = vec![program.to_string(), iface.to_string()];
        let command = argv.join(" ");
        at::run(&argv, config.command_timeout)
            .await
            .map(|_| ())
            .map_err(|e| action_error(&command, e))
    }

    /// The logical interface to bounce. Falls back to `interface` when
    /// detection is off or finds nothing.
    async fn wan_interface(&self, config: &ModemConfig) -> String {
        if !config.auto_detect {
            return config.interface.clone();
        }
        let argv: Vec<String> = ["ubus", "call", "network.interface", "dump"]
            .into_iter()
            .map(String::from)
            .collect();
        let detected = match at::run(&argv, config.command_timeout).await {
            Ok(dump) => detect_wan_interface(&dump, config.wwan_device.as_deref()),
            Err(e) => {
                tracing::warn!("interface detection failed: {e}");
                None
            }
        };
        match detected {
            Some(iface) => {
                tracing::debug!(%iface, "detected modem interface");
                iface
            }
            None => {
                tracing::warn!(
                    fallback = %config.interface,
                    "no modem interface found, using configured name"
                );
                config.interface.clone()
            }
        }
    }
}

fn action_error(command: &str, e: CommandError) -> ActionError {
    match e {
        CommandError::Timeout { after, .. } => ActionError::Timeout {
            command: command.to_string(),
            after,
        },
        CommandError::Rejected { response } => ActionError::Rejected {
            command: command.to_string(),
            response,
        },
        other => ActionError::Command {
            command: command.to_string(),
            reason: other.to_string(),
        },
    }
}

impl Reconfigure for QuectelModem {
    fn reconfigure(&self, config: &ModemConfig) {
        self.config.store(std::sync::Arc::new(config.clone()));
    }
}

impl ModemControl for QuectelModem {
    async fn read_telemetry(&self) -> Result<(ModemSnapshot, SignalSnapshot), TelemetryError> {
        let config = self.config.load_full();

        let ati = at::send(&config, "ATI")
            .await
            .map_err(|e| TelemetryError::Unreachable(e.to_string()))?;
        let (model, firmware) = parse_ati(&ati);
        if model.is_none() && firmware.is_none() {
            return Err(TelemetryError::Malformed(format!(
                "no identity in ATI response: {}",
                ati.trim()
            )));
        }

        // Temperature and serving cell are best effort once the modem answers.
        let temperature_c = match at::send(&config, "AT+QTEMP").await {
            Ok(text) => parse_qtemp(&text),
            Err(e) => {
                tracing::debug!("AT+QTEMP failed: {e}");
                None
            }
        };
        let signal = match at::send(&config, "AT+QENG=\"servingcell\"").await {
            Ok(text) => parse_servingcell(&text),
            Err(e) => {
                tracing::debug!("AT+QENG failed: {e}");
                SignalSnapshot::default()
            }
        };

        Ok((
            ModemSnapshot {
                model,
                firmware,
                temperature_c,
            },
            signal,
        ))
    }

    async fn restart_interface(&self) -> Result<(), ActionError> {
        let config = self.config.load_full();
        let iface = self.wan_interface(&config).await;
        self.ifctl(&config, "ifdown", &iface).await?;
        self.ifctl(&config, "ifup", &iface).await
    }

    async fn toggle_airplane_mode(&self) -> Result<(), ActionError> {
        self.at("AT+CFUN=4").await?;
        let settle = self.config.load().airplane_settle;
        tokio::time::sleep(settle).await;
        self.at("AT+CFUN=1").await.map(|_| ())
    }

    async fn hard_reset_modem(&self) -> Result<(), ActionError> {
        self.at("AT+CFUN=1,1").await.map(|_| ())
    }

    async fn force_cell_reselection(&self) -> Result<(), ActionError> {
        self.at("AT+COPS=2").await?;
        self.at("AT+COPS=0").await.map(|_| ())
    }
}

// ── Interface detection ─────────────────────────────────────────────

/// netifd protocols that drive a cellular modem.
const MODEM_PROTOS: &[&str] = &["qmi", "mbim", "modemmanager", "ncm"];

#[derive(Debug, Default, Deserialize)]
struct InterfaceDump {
    #[serde(default)]
    interface: Vec<NetifdInterface>,
}

#[derive(Debug, Deserialize)]
struct NetifdInterface {
    interface: String,
    #[serde(default)]
    proto: String,
    #[serde(default)]
    up: bool,
    device: Option<String>,
    l3_device: Option<String>,
}

impl NetifdInterface {
    fn uses_device(&self, dev: &str) -> bool {
        self.device.as_deref() == Some(dev) || self.l3_device.as_deref() == Some(dev)
    }
}

/// Pick the modem's logical interface from `ubus call network.interface
/// dump` output. `wwan_device` wins when it matches; otherwise the first
/// modem interface that is up, then the first one at all.
pub fn detect_wan_interface(dump: &str, wwan_device: Option<&str>) -> Option<String> {
    let dump: InterfaceDump = serde_json::from_str(dump).ok()?;
    let modems: Vec<&NetifdInterface> = dump
        .interface
        .iter()
        .filter(|i| MODEM_PROTOS.contains(&i.proto.as_str()))
        .collect();

    let by_device = wwan_device.and_then(|dev| modems.iter().find(|i| i.uses_device(dev)));
    by_device
        .or_else(|| modems.iter().find(|i| i.up))
        .or(modems.first())
        .map(|i| i.interface.clone())
}

// ── Response parsing ────────────────────────────────────────────────

fn payload_lines(response: &str) -> impl Iterator<Item = &str> {
    response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "OK" && !l.starts_with("AT"))
}

/// `(model, firmware)` from an `ATI` response:
///
/// ```text
/// Quectel
/// RM520N-GL
/// Revision: RM520NGLAAR01A07M4G
/// ```
pub fn parse_ati(response: &str) -> (Option<String>, Option<String>) {
    let mut firmware = None;
    let mut names = Vec::new();
    for line in payload_lines(response) {
        if let Some(rev) = line.strip_prefix("Revision:") {
            firmware = Some(rev.trim().to_string()).filter(|s| !s.is_empty());
        } else if !line.contains(':') {
            names.push(line);
        }
    }
    // Manufacturer first, then model; some firmwares print the model only.
    let model = names.get(1).or(names.first()).map(|s| s.to_string());
    (model, firmware)
}

/// Hottest sensor reading in °C. Accepts both
/// `+QTEMP: 36,35,37` and `+QTEMP:"modem-lte-sub6-pa1","36"` lines.
pub fn parse_qtemp(response: &str) -> Option<f64> {
    response
        .lines()
        .filter_map(|l| l.trim().strip_prefix("+QTEMP:"))
        .flat_map(|rest| {
            let fields = split_fields(rest);
            if rest.trim_start().starts_with('"') {
                // Named sensor: the value is the last field.
                fields.last().cloned().into_iter().collect::<Vec<_>>()
            } else {
                fields
            }
        })
        .filter_map(|v| v.parse::<f64>().ok())
        // Absent sensors report large negative sentinels.
        .filter(|t| *t > -40.0 && *t < 150.0)
        .reduce(f64::max)
}

fn split_fields(s: &str) -> Vec<String> {
    s.split(',')
        .map(|f| f.trim().trim_matches('"').to_string())
        .collect()
}

fn field(fields: &[String], idx: usize) -> Option<&str> {
    fields
        .get(idx)
        .map(String::as_str)
        .filter(|v| !v.is_empty() && *v != "-")
}

fn int_field(fields: &[String], idx: usize) -> Option<i32> {
    field(fields, idx).and_then(|v| v.parse().ok())
}

/// Serving-cell information from `AT+QENG="servingcell"` for LTE,
/// NR5G-SA and NR5G-NSA (EN-DC) registrations. Unknown layouts leave
/// fields absent.
pub fn parse_servingcell(response: &str) -> SignalSnapshot {
    let records: Vec<Vec<String>> = response
        .lines()
        .filter_map(|l| l.trim().strip_prefix("+QENG:"))
        .map(split_fields)
        .collect();

    let mut signal = SignalSnapshot::default();
    let Some(head) = records.iter().find(|r| r.first().map(String::as_str) == Some("servingcell"))
    else {
        return signal;
    };
    signal.state = field(head, 1).and_then(|s| s.parse::<RegistrationState>().ok());

    match field(head, 2) {
        Some("LTE") => {
            // "servingcell",state,"LTE",is_tdd,MCC,MNC,cellID,PCID,earfcn,band,
            // UL_bw,DL_bw,TAC,RSRP,RSRQ,RSSI,SINR,...
            signal.rat = Some("LTE".into());
            signal.cellid = field(head, 6).map(str::to_string);
            signal.band = field(head, 9).map(|b| format!("B{b}"));
            signal.rsrp_dbm = int_field(head, 13);
            signal.rsrq_db = int_field(head, 14);
            signal.sinr_db = int_field(head, 16).map(lte_sinr_db);
        }
        Some("NR5G-SA") => {
            // "servingcell",state,"NR5G-SA",duplex,MCC,MNC,cellID,PCID,TAC,
            // ARFCN,band,DL_bw,RSRP,RSRQ,SINR,...
            signal.rat = Some("NR5G-SA".into());
            signal.cellid = field(head, 6).map(str::to_string);
            signal.band = field(head, 10).map(|b| format!("n{b}"));
            signal.rsrp_dbm = int_field(head, 12);
            signal.rsrq_db = int_field(head, 13);
            signal.sinr_db = int_field(head, 14).map(f64::from);
        }
        _ => parse_nsa(&records, &mut signal),
    }
    signal
}

/// EN-DC: the serving-cell line carries only the state, followed by one
/// `"LTE",...` anchor line and one `"NR5G-NSA",...` line.
fn parse_nsa(records: &[Vec<String>], signal: &mut SignalSnapshot) {
    let lte = records.iter().find(|r| field(r, 0) == Some("LTE"));
    let nr = records.iter().find(|r| field(r, 0) == Some("NR5G-NSA"));

    if let Some(lte) = lte {
        // "LTE",is_tdd,MCC,MNC,cellID,PCID,earfcn,band,UL_bw,DL_bw,TAC,
        // RSRP,RSRQ,RSSI,SINR,...
        signal.rat = Some("LTE".into());
        signal.cellid = field(lte, 4).map(str::to_string);
        signal.band = field(lte, 7).map(|b| format!("B{b}"));
        signal.rsrp_dbm = int_field(lte, 11);
        signal.rsrq_db = int_field(lte, 12);
        signal.sinr_db = int_field(lte, 14).map(lte_sinr_db);
    }

    if let Some(nr) = nr {
        // "NR5G-NSA",MCC,MNC,PCID,RSRP,SINR,RSRQ,ARFCN,band,...
        signal.rat = Some("NR5G-NSA".into());
        let nr_band = field(nr, 8).map(|b| format!("n{b}"));
        signal.band = match (signal.band.take(), nr_band) {
            (Some(anchor), Some(nr)) => Some(format!("{anchor}+{nr}")),
            (anchor, nr) => nr.or(anchor),
        };
        if let Some(rsrp) = int_field(nr, 4) {
            signal.rsrp_dbm = Some(rsrp);
            signal.sinr_db = int_field(nr, 5).map(f64::from);
            signal.rsrq_db = int_field(nr, 6);
        }
    }
}

/// LTE SINR is reported as 0..250 in 0.2 dB steps from −20 dB.
fn lte_sinr_db(raw: i32) -> f64 {
    f64::from(raw) / 5.0 - 20.0
}
