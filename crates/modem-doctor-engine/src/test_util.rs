//! Scripted collaborators for exercising the engine without a network or a
//! modem. Each one replays queued answers and records how it was called.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use modem_doctor_common::config::WatchdogConfig;
use modem_doctor_common::models::{ModemSnapshot, SignalSnapshot};

use crate::modem::{ActionError, ModemControl, TelemetryError};
use crate::probe::{LinkProbe, PingOutcome, Pinger, ProbeError, ProbeResult};

/// Replays queued ping rounds. An exhausted script answers with timeouts.
#[derive(Default)]
pub struct ScriptedPinger {
    rounds: Mutex<VecDeque<Vec<PingOutcome>>>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedPinger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, round: Vec<PingOutcome>) {
        self.rounds.lock().unwrap().push_back(round);
    }

    /// The `count` of every ping request so far.
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl Pinger for ScriptedPinger {
    async fn ping(&self, _target: &str, count: u32, _timeout: Duration) -> Vec<PingOutcome> {
        self.calls.lock().unwrap().push(count);
        self.rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Err(ProbeError::Timeout); count as usize])
    }
}

/// Replays queued probe results, then keeps answering with the fallback.
pub struct ScriptedProbe {
    results: Mutex<VecDeque<ProbeResult>>,
    fallback: Mutex<ProbeResult>,
    calls: AtomicUsize,
}

impl Default for ScriptedProbe {
    fn default() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ProbeResult::up(Some(30.0))),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_up(&self, avg_latency_ms: f64) {
        self.results
            .lock()
            .unwrap()
            .push_back(ProbeResult::up(Some(avg_latency_ms)));
    }

    pub fn push_down(&self) {
        self.results.lock().unwrap().push_back(ProbeResult::down());
    }

    pub fn set_fallback(&self, result: ProbeResult) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LinkProbe for ScriptedProbe {
    async fn probe(&self, _config: &WatchdogConfig) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

/// Remediation operations seen by [`ScriptedModem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemCall {
    RestartInterface,
    ToggleAirplaneMode,
    HardReset,
    CellReselection,
}

/// Records every remediation call; individual operations can be told to
/// fail.
pub struct ScriptedModem {
    calls: Mutex<Vec<ModemCall>>,
    failing: Mutex<HashSet<ModemCall>>,
    telemetry: Mutex<Result<(ModemSnapshot, SignalSnapshot), TelemetryError>>,
    telemetry_reads: AtomicUsize,
}

impl Default for ScriptedModem {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            telemetry: Mutex::new(Ok((ModemSnapshot::default(), SignalSnapshot::default()))),
            telemetry_reads: AtomicUsize::new(0),
        }
    }
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, call: ModemCall) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn set_telemetry(
        &self,
        telemetry: Result<(ModemSnapshot, SignalSnapshot), TelemetryError>,
    ) {
        *self.telemetry.lock().unwrap() = telemetry;
    }

    pub fn calls(&self) -> Vec<ModemCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn telemetry_reads(&self) -> usize {
        self.telemetry_reads.load(Ordering::SeqCst)
    }

    fn record(&self, call: ModemCall) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(&call) {
            return Err(ActionError::Command {
                command: format!("{call:?}"),
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

impl ModemControl for ScriptedModem {
    async fn read_telemetry(&self) -> Result<(ModemSnapshot, SignalSnapshot), TelemetryError> {
        self.telemetry_reads.fetch_add(1, Ordering::SeqCst);
        self.telemetry.lock().unwrap().clone()
    }

    async fn restart_interface(&self) -> Result<(), ActionError> {
        self.record(ModemCall::RestartInterface)
    }

    async fn toggle_airplane_mode(&self) -> Result<(), ActionError> {
        self.record(ModemCall::ToggleAirplaneMode)
    }

    async fn hard_reset_modem(&self) -> Result<(), ActionError> {
        self.record(ModemCall::HardReset)
    }

    async fn force_cell_reselection(&self) -> Result<(), ActionError> {
        self.record(ModemCall::CellReselection)
    }
}
