pub mod daemon;
pub mod ingest;
pub mod run;
pub mod send;

pub use daemon::handle_daemon;
pub use ingest::handle_ingest;
pub use run::handle_run;
pub use send::handle_send;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel the shared token on SIGTERM or Ctrl+C.
pub(crate) fn spawn_signal_task(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("unable to install SIGTERM handler: {}", e);
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
        token.cancel();
    });
}
