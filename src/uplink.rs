use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::StationConfig;
use crate::packet::{Frame, source_identity};

/// Software identification sent in the APRS-IS login line.
pub const CLIENT_VERS: &str = "wxgate 1.0";

const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between the sequencer and the network. A send either fully
/// succeeds or fails; the cause is logged here, never raised to callers.
#[async_trait]
pub trait FrameSender: Send + Sync {
    async fn send_frame(&self, config: &StationConfig, frame: &Frame) -> bool;
}

/// One-shot APRS-IS uplink: connect, authenticate, write the frame, close.
/// No retry; one attempt per frame per cycle.
pub struct AprsIsUplink;

/// APRS-IS login: `user CALL[-SSID] pass PASSCODE vers PRODUCT`.
pub fn build_login_line(config: &StationConfig) -> String {
    format!(
        "user {} pass {} vers {}\r\n",
        source_identity(&config.callsign, &config.ssid),
        config.passcode,
        CLIENT_VERS
    )
}

#[async_trait]
impl FrameSender for AprsIsUplink {
    async fn send_frame(&self, config: &StationConfig, frame: &Frame) -> bool {
        let line = frame.render();
        match transmit(config, &line).await {
            Ok(()) => {
                info!("APRS packet sent: {}", line);
                metrics::counter!("wxgate.uplink.sent_total").increment(1);
                true
            }
            Err(e) => {
                error!("APRS-IS send failed: {:#}", e);
                metrics::counter!("wxgate.uplink.failed_total").increment(1);
                false
            }
        }
    }
}

async fn transmit(config: &StationConfig, line: &str) -> Result<()> {
    let stream = connect(config).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut banner = String::new();
    timeout(IO_TIMEOUT, reader.read_line(&mut banner))
        .await
        .context("timed out waiting for server banner")?
        .context("failed to read server banner")?;
    debug!("server banner: {}", banner.trim());

    let login = build_login_line(config);
    writer
        .write_all(login.as_bytes())
        .await
        .context("failed to send login")?;
    writer.flush().await.context("failed to flush login")?;

    let mut response = String::new();
    timeout(IO_TIMEOUT, reader.read_line(&mut response))
        .await
        .context("timed out waiting for login response")?
        .context("failed to read login response")?;
    let response = response.trim();
    debug!("login response: {}", response);
    if response.contains("unverified") {
        bail!("login not verified by server: {}", response);
    }

    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .context("failed to send frame")?;
    writer.flush().await.context("failed to flush frame")?;
    Ok(())
}

/// Resolve the configured server, preferring IPv4, and connect to one of
/// the shuffled addresses.
async fn connect(config: &StationConfig) -> Result<TcpStream> {
    let server_address = format!("{}:{}", config.server, config.port);
    let addrs: Vec<_> = tokio::net::lookup_host(&server_address)
        .await
        .with_context(|| format!("DNS resolution failed for {server_address}"))?
        .collect();
    if addrs.is_empty() {
        bail!("DNS resolution returned no addresses for {server_address}");
    }

    let ipv4: Vec<_> = addrs.iter().filter(|a| a.is_ipv4()).cloned().collect();
    let mut candidates = if ipv4.is_empty() {
        warn!(
            "no IPv4 addresses found for {}, falling back to all addresses",
            server_address
        );
        addrs
    } else {
        ipv4
    };
    candidates.shuffle(&mut rand::rng());

    let mut last_error = None;
    for addr in &candidates {
        match timeout(IO_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                debug!("connected to APRS-IS server at {}", addr);
                return Ok(stream);
            }
            Ok(Err(e)) => {
                warn!("failed to connect to {}: {}", addr, e);
                last_error = Some(anyhow!(e));
            }
            Err(_) => {
                warn!("connection to {} timed out", addr);
                last_error = Some(anyhow!("connection timed out"));
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow!("no addresses to try"))
        .context(format!(
            "failed to connect to any resolved address for {server_address}"
        )))
}
