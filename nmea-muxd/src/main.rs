//! NMEA Multiplexer Daemon
//!
//! Loads the channel configuration, starts every channel and forwards
//! traffic until interrupted.
//!
//! Usage: `nmea-muxd [CONFIG]`

mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use nmea_mux::{shutdown_channel, MuxConfig, ShutdownTrigger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// NMEA-0183 / AIS multiplexer daemon
#[derive(Debug, Parser)]
#[command(name = "nmea-muxd", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    /// (default: $XDG_CONFIG_HOME/nmea-mux/config.json)
    #[arg(env = "NMEA_MUX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nmea_muxd=info,nmea_mux=info,nmea_protocol=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = settings::config_path(cli.config)
        .context("no configuration file given and no home directory to look in")?;
    let config = MuxConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    tracing::info!(
        "Starting NMEA multiplexer with {} channels from {}",
        config.channels.len(),
        path.display()
    );

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(stop_on_signal(trigger));

    let stats = nmea_mux::run(&config, shutdown).await?;
    tracing::info!(
        "Stopped: {} sentences received, {} forwarded, {} filtered",
        stats.received,
        stats.forwarded,
        stats.filtered
    );
    Ok(())
}

/// Trigger shutdown on Ctrl-C or SIGTERM
async fn stop_on_signal(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown requested");
    trigger.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_takes_positional_config() {
        let cli = Cli::try_parse_from(["nmea-muxd", "/etc/boat.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/boat.json")));
    }

    #[test]
    fn test_cli_rejects_extra_arguments() {
        assert!(Cli::try_parse_from(["nmea-muxd", "a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
