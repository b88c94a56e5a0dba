//! ICMP probing through the system `ping` binary.
//!
//! Works with both iputils and busybox `ping` as found on OpenWrt. Only the
//! per-reply `time=` lines are parsed, so locale-dependent summary lines do
//! not matter.

use std::time::Duration;

use modem_doctor_engine::probe::{PingOutcome, Pinger, ProbeError};

/// Spawns `ping -c <count> -W <timeout> <target>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPinger;

impl Pinger for SystemPinger {
    async fn ping(&self, target: &str, count: u32, timeout: Duration) -> Vec<PingOutcome> {
        let count = count.max(1);
        let wait = timeout.as_secs().max(1);
        // `ping` enforces -W per reply; this bounds the whole run.
        let budget = timeout * count + Duration::from_secs(2);

        let mut cmd = tokio::process::Command::new("ping");
        cmd.args(["-c", &count.to_string(), "-W", &wait.to_string(), target])
            .kill_on_drop(true);

        match tokio::time::timeout(budget, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                parse_ping_output(&format!("{stdout}\n{stderr}"), count)
            }
            Ok(Err(e)) => {
                tracing::warn!(host = %target, "cannot run ping: {e}");
                vec![Err(ProbeError::Spawn(e.to_string())); count as usize]
            }
            Err(_) => {
                tracing::debug!(host = %target, ?budget, "ping run timed out");
                vec![Err(ProbeError::Timeout); count as usize]
            }
        }
    }
}

/// One outcome per requested echo: parsed RTTs first, then an error for
/// each missing reply.
pub fn parse_ping_output(output: &str, count: u32) -> Vec<PingOutcome> {
    let mut outcomes: Vec<PingOutcome> = output
        .lines()
        .filter_map(reply_rtt)
        .take(count as usize)
        .map(Ok)
        .collect();

    let lower = output.to_ascii_lowercase();
    let missing = if lower.contains("unreachable") || lower.contains("bad address") {
        ProbeError::Unreachable
    } else {
        ProbeError::Timeout
    };
    outcomes.resize(count as usize, Err(missing));
    outcomes
}

/// RTT in ms from a reply line such as
/// `64 bytes from 1.1.1.1: seq=0 ttl=57 time=23.415 ms`.
fn reply_rtt(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once("time")?;
    let rest = rest.strip_prefix('=').or_else(|| rest.strip_prefix('<'))?;
    let value: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUSYBOX_OK: &str = "\
PING 1.1.1.1 (1.1.1.1): 56 data bytes
64 bytes from 1.1.1.1: seq=0 ttl=57 time=23.415 ms
64 bytes from 1.1.1.1: seq=1 ttl=57 time=31.020 ms
64 bytes from 1.1.1.1: seq=2 ttl=57 time=28.565 ms

--- 1.1.1.1 ping statistics ---
3 packets transmitted, 3 packets received, 0% packet loss
round-trip min/avg/max = 23.415/27.666/31.020 ms
";

    #[test]
    fn parses_busybox_replies() {
        let outcomes = parse_ping_output(BUSYBOX_OK, 3);
        assert_eq!(outcomes, vec![Ok(23.415), Ok(31.020), Ok(28.565)]);
    }

    #[test]
    fn parses_iputils_replies() {
        let out = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=14.2 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time<1 ms
";
        let outcomes = parse_ping_output(out, 2);
        assert_eq!(outcomes, vec![Ok(14.2), Ok(1.0)]);
    }

    #[test]
    fn missing_replies_are_timeouts() {
        let out = "\
PING 1.1.1.1 (1.1.1.1): 56 data bytes
64 bytes from 1.1.1.1: seq=1 ttl=57 time=40.0 ms

--- 1.1.1.1 ping statistics ---
3 packets transmitted, 1 packets received, 66% packet loss
";
        let outcomes = parse_ping_output(out, 3);
        assert_eq!(
            outcomes,
            vec![Ok(40.0), Err(ProbeError::Timeout), Err(ProbeError::Timeout)]
        );
    }

    #[test]
    fn unreachable_network_is_reported() {
        let out = "PING 1.1.1.1 (1.1.1.1): 56 data bytes\nping: sendto: Network unreachable\n";
        assert_eq!(
            parse_ping_output(out, 2),
            vec![Err(ProbeError::Unreachable), Err(ProbeError::Unreachable)]
        );
    }

    #[test]
    fn extra_replies_are_ignored() {
        let outcomes = parse_ping_output(BUSYBOX_OK, 1);
        assert_eq!(outcomes, vec![Ok(23.415)]);
    }

    #[test]
    fn summary_lines_are_not_replies() {
        assert_eq!(reply_rtt("round-trip min/avg/max = 1.0/2.0/3.0 ms"), None);
        assert_eq!(reply_rtt("rtt min/avg/max/mdev = 14.2/14.2/14.2/0.0 ms"), None);
    }
}
