use anyhow::Result;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{self, WxPaths};
use crate::packet::source_identity;
use crate::sequencer::Sequencer;
use crate::uplink::FrameSender;
use crate::weather;

/// Runtime settings seeded from environment variables and re-read while
/// sleeping, so operators can change behavior without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub enabled: bool,
    pub interval: u64,
    pub debug: bool,
}

impl DaemonSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env_enabled(),
            interval: env_interval(),
            debug: env::var("APRS_DEBUG")
                .map(|v| v.to_lowercase() == "yes")
                .unwrap_or(true),
        }
    }
}

fn env_enabled() -> bool {
    env::var("APRS_AUTO_ENABLED")
        .map(|v| v.to_lowercase() == "on")
        .unwrap_or(false)
}

fn env_interval() -> u64 {
    env::var("APRS_UPDATE_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600)
}

/// Interval-driven transmission loop. Each cycle reloads the configuration
/// (picking up live environment overrides) and the current reading, then
/// runs the sequencer once; transport failures never stop the loop. Only a
/// broken configuration is fatal — the supervisor relaunches us.
pub async fn run(
    paths: &WxPaths,
    sender: &dyn FrameSender,
    token: CancellationToken,
) -> Result<()> {
    let mut settings = DaemonSettings::from_env();

    // One-time system check before entering the loop.
    let cfg = config::load(paths)?;
    info!(
        "configuration ready for {}",
        source_identity(&cfg.callsign, &cfg.ssid)
    );
    if paths.reading.exists() {
        info!("weather data file found");
    } else {
        info!("weather data file not found (will be created when data arrives)");
    }
    info!(
        "APRS daemon starting: enabled={} interval={}s debug={}",
        settings.enabled, settings.interval, settings.debug
    );

    let mut transmissions: u64 = 0;
    while !token.is_cancelled() {
        if settings.enabled {
            let cfg = config::load(paths)?;
            let reading = weather::load_reading(&paths.reading);
            let outcome = Sequencer::new(sender).run(&cfg, &reading, false).await;
            transmissions += 1;
            info!(
                "transmission #{} finished: {:?}, next in {}s",
                transmissions, outcome, settings.interval
            );
            metrics::counter!("wxgate.daemon.cycles_total").increment(1);
        } else if transmissions == 0 {
            info!("daemon disabled via APRS_AUTO_ENABLED=off, sleeping {}s", settings.interval);
        }

        // Sleep in 1 s increments so shutdown latency stays bounded to one
        // increment; runtime env vars are re-read every 60 increments.
        let mut slept = 0u64;
        while slept < settings.interval {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("APRS daemon shutdown completed");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            slept += 1;
            if slept % 60 == 0 {
                let enabled = env_enabled();
                let interval = env_interval();
                if enabled != settings.enabled {
                    settings.enabled = enabled;
                    info!("runtime setting updated: enabled={}", enabled);
                }
                if interval != settings.interval {
                    settings.interval = interval;
                    info!("runtime setting updated: interval={}s", interval);
                }
            } else {
                debug!("sleeping ({}/{}s)", slept, settings.interval);
            }
        }
    }

    info!("APRS daemon shutdown completed");
    Ok(())
}
