//! modem-doctor
//!
//! WAN watchdog daemon for routers with a Quectel cellular modem.
//!
//! - Probes the link on a fixed interval and escalates through interface
//!   restart, airplane-mode toggle and modem reset while it stays down
//! - Forces a cell reselection when latency is too high
//! - Serves status, log and watchdog control on a local HTTP API
//! - Reloads its configuration on SIGHUP
//! - In `--simulate` mode, runs against a fake modem and network

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use modem_doctor_agent::ping::SystemPinger;
use modem_doctor_agent::quectel::QuectelModem;
use modem_doctor_agent::simulate::{SimulatedLink, SimulatedModem, SimulatedPinger};
use modem_doctor_agent::{portal, AgentState, Reconfigure};
use modem_doctor_common::config::DoctorConfig;
use modem_doctor_engine::{LinkProbe, ModemControl, Prober, Watchdog};

/// Cellular WAN watchdog daemon.
#[derive(Parser, Debug)]
#[command(name = "modem-doctor", about = "Cellular WAN watchdog daemon")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, default_value = "/etc/modem-doctor/modem-doctor.toml")]
    config: PathBuf,

    /// Status API listen address.
    #[arg(long, default_value = "127.0.0.1:8330")]
    listen: String,

    /// Run against a simulated modem and network.
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DoctorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let listen: SocketAddr = cli
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", cli.listen))?;

    tracing::info!(
        config = %cli.config.display(),
        simulate = cli.simulate,
        enabled = config.enabled,
        ping_target = %config.watchdog.ping_target,
        "modem-doctor starting"
    );

    if cli.simulate {
        let link = Arc::new(SimulatedLink::default());
        let probe = Prober::new(SimulatedPinger::new(link.clone()));
        run(cli, config, listen, probe, SimulatedModem::new(link)).await
    } else {
        let modem = QuectelModem::new(config.modem.clone());
        run(cli, config, listen, Prober::new(SystemPinger), modem).await
    }
}

async fn run<P, M>(
    cli: Cli,
    config: DoctorConfig,
    listen: SocketAddr,
    probe: P,
    modem: M,
) -> anyhow::Result<()>
where
    P: LinkProbe,
    M: ModemControl + Reconfigure,
{
    let enabled = config.enabled;
    let mut watchdog = Watchdog::new(config.watchdog, probe, modem);
    if enabled {
        watchdog.enable();
    } else {
        tracing::info!("watchdog disabled in configuration, waiting for API or reload");
    }
    let state = Arc::new(AgentState::new(watchdog, cli.simulate));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding status API on {listen}"))?;
    let mut server = tokio::spawn(portal::serve(state.clone(), listener));

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    // ── Main loop: reloads until a shutdown signal ──────────────────
    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("received SIGHUP, reloading configuration");
                state.reload(&cli.config).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            result = &mut server => {
                match result {
                    Ok(Ok(())) => tracing::warn!("status API stopped"),
                    Ok(Err(e)) => tracing::error!("status API failed: {e:#}"),
                    Err(e) => tracing::error!("status API task failed: {e}"),
                }
                break;
            }
        }
    }

    // Let an in-flight remediation finish before exiting.
    state.watchdog.lock().await.disable().await;
    server.abort();

    tracing::info!("modem-doctor stopped");
    Ok(())
}
