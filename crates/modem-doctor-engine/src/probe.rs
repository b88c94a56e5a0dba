//! # Link prober
//!
//! Connectivity is judged with an "all must fail" policy: up to
//! `ping_count` single echo requests are sent and the first reply
//! classifies the link as up. Only when every request times out or is
//! unreachable is the link down, so a single lost packet never triggers a
//! modem restart.
//!
//! Latency is measured only on a live link, as the arithmetic mean RTT of
//! the replies that came back. Lost replies do not count toward the mean.
//!
//! Individual ping failures are data, not errors: they fold into the
//! classification and are never surfaced to the caller.

use std::future::Future;
use std::time::Duration;

use modem_doctor_common::config::WatchdogConfig;
use thiserror::Error;

/// Why a single echo request produced no reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,
    #[error("destination unreachable")]
    Unreachable,
    #[error("could not run ping: {0}")]
    Spawn(String),
}

/// One echo request: round-trip time in milliseconds, or why it failed.
pub type PingOutcome = Result<f64, ProbeError>;

/// Sends echo requests. Implemented by the system `ping` wrapper in the
/// agent and by scripted pingers in tests.
pub trait Pinger: Send + Sync + 'static {
    /// Send `count` echo requests to `target`, waiting at most `timeout` for
    /// each reply. Returns one outcome per request, in order.
    fn ping(
        &self,
        target: &str,
        count: u32,
        timeout: Duration,
    ) -> impl Future<Output = Vec<PingOutcome>> + Send;
}

/// Result of one connectivity + latency check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub connected: bool,
    pub avg_latency_ms: Option<f64>,
    /// Unix seconds when the check completed.
    pub timestamp: i64,
}

impl ProbeResult {
    pub fn up(avg_latency_ms: Option<f64>) -> Self {
        Self {
            connected: true,
            avg_latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn down() -> Self {
        Self {
            connected: false,
            avg_latency_ms: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Anything that can answer "is the link up, and how slow is it".
///
/// The escalation controller only depends on this seam, so its policy can
/// be exercised with scripted results.
pub trait LinkProbe: Send + Sync + 'static {
    fn probe(&self, config: &WatchdogConfig) -> impl Future<Output = ProbeResult> + Send;
}

/// A link is up when at least one request got a reply.
pub fn any_reply(outcomes: &[PingOutcome]) -> bool {
    outcomes.iter().any(|o| o.is_ok())
}

/// Mean RTT over successful replies; `None` when nothing came back.
pub fn mean_rtt(outcomes: &[PingOutcome]) -> Option<f64> {
    let (sum, n) = outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok())
        .fold((0.0, 0u32), |(sum, n), rtt| (sum + rtt, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// Connectivity and latency probing policy on top of a [`Pinger`].
pub struct Prober<P> {
    pinger: P,
}

impl<P: Pinger> Prober<P> {
    pub fn new(pinger: P) -> Self {
        Self { pinger }
    }

    pub fn pinger(&self) -> &P {
        &self.pinger
    }

    /// Up to `ping_count` single pings; stops at the first reply.
    pub async fn check_connectivity(&self, config: &WatchdogConfig) -> bool {
        for attempt in 1..=config.ping_count {
            let outcomes = self
                .pinger
                .ping(&config.ping_target, 1, config.ping_timeout)
                .await;
            if any_reply(&outcomes) {
                return true;
            }
            if let Some(Err(e)) = outcomes.first() {
                tracing::debug!(
                    host = %config.ping_target,
                    attempt,
                    of = config.ping_count,
                    error = %e,
                    "ping failed"
                );
            }
        }
        false
    }

    /// Mean RTT over `latency_pings` requests.
    pub async fn measure_latency(&self, config: &WatchdogConfig) -> Option<f64> {
        let outcomes = self
            .pinger
            .ping(&config.ping_target, config.latency_pings, config.ping_timeout)
            .await;
        let avg = mean_rtt(&outcomes);
        let replies = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::debug!(
            host = %config.ping_target,
            replies,
            sent = outcomes.len(),
            avg_ms = ?avg,
            "latency measured"
        );
        avg
    }
}

impl<P: Pinger> LinkProbe for Prober<P> {
    async fn probe(&self, config: &WatchdogConfig) -> ProbeResult {
        if !self.check_connectivity(config).await {
            return ProbeResult::down();
        }
        ProbeResult::up(self.measure_latency(config).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ScriptedPinger;

    fn config(ping_count: u32, latency_pings: u32) -> WatchdogConfig {
        WatchdogConfig {
            ping_count,
            latency_pings,
            ..Default::default()
        }
    }

    #[test]
    fn mean_ignores_failures() {
        // 15 replies summing to 1500 ms, 5 losses.
        let mut outcomes: Vec<PingOutcome> =
            (0..15).map(|i| Ok(80.0 + (i % 5) as f64 * 10.0)).collect();
        outcomes.extend((0..5).map(|_| Err(ProbeError::Timeout)));
        let total: f64 = outcomes.iter().filter_map(|o| o.as_ref().ok()).sum();
        assert!((total - 1500.0).abs() < 1e-9);
        assert!((mean_rtt(&outcomes).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mean_of_nothing_is_absent() {
        assert_eq!(mean_rtt(&[]), None);
        assert_eq!(
            mean_rtt(&[Err(ProbeError::Timeout), Err(ProbeError::Unreachable)]),
            None
        );
    }

    #[test]
    fn any_reply_classification() {
        assert!(!any_reply(&[]));
        assert!(!any_reply(&vec![Err(ProbeError::Timeout); 3]));
        assert!(any_reply(&[Err(ProbeError::Timeout), Ok(20.0), Err(ProbeError::Timeout)]));
    }

    #[tokio::test]
    async fn all_pings_failing_is_down() {
        let pinger = ScriptedPinger::new();
        for _ in 0..3 {
            pinger.push(vec![Err(ProbeError::Timeout)]);
        }
        let prober = Prober::new(pinger);

        let result = prober.probe(&config(3, 20)).await;
        assert!(!result.connected);
        assert_eq!(result.avg_latency_ms, None);
        // Three connectivity pings, no latency round.
        assert_eq!(prober.pinger().calls(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn one_success_is_up() {
        let pinger = ScriptedPinger::new();
        pinger.push(vec![Err(ProbeError::Timeout)]);
        pinger.push(vec![Err(ProbeError::Unreachable)]);
        pinger.push(vec![Ok(42.0)]);
        pinger.push(vec![Ok(40.0), Ok(60.0)]);
        let prober = Prober::new(pinger);

        let result = prober.probe(&config(3, 2)).await;
        assert!(result.connected);
        assert_eq!(result.avg_latency_ms, Some(50.0));
        assert_eq!(prober.pinger().calls(), vec![1, 1, 1, 2]);
    }

    #[tokio::test]
    async fn connectivity_stops_at_first_reply() {
        let pinger = ScriptedPinger::new();
        pinger.push(vec![Ok(10.0)]);
        pinger.push(vec![Ok(10.0)]);
        let prober = Prober::new(pinger);

        assert!(prober.check_connectivity(&config(5, 1)).await);
        assert_eq!(prober.pinger().calls(), vec![1]);
    }

    #[tokio::test]
    async fn latency_round_with_no_replies_is_absent() {
        let pinger = ScriptedPinger::new();
        pinger.push(vec![Ok(10.0)]);
        pinger.push(vec![Err(ProbeError::Timeout); 4]);
        let prober = Prober::new(pinger);

        let result = prober.probe(&config(1, 4)).await;
        assert!(result.connected);
        assert_eq!(result.avg_latency_ms, None);
    }
}
