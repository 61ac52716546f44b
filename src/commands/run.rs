use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::WxPaths;
use crate::supervisor::{ServiceSpec, Supervisor};

/// Launch the ingest service and the transmission daemon as child
/// processes of the current executable and keep them alive.
pub async fn handle_run(paths: WxPaths, listen: String) -> Result<()> {
    info!("starting APRS weather station services");
    let exe = std::env::current_exe().context("failed to locate current executable")?;

    let common = [
        "--config".to_string(),
        paths.config.display().to_string(),
        "--defaults".to_string(),
        paths.defaults.display().to_string(),
        "--wx-file".to_string(),
        paths.reading.display().to_string(),
    ];

    let mut ingest_args = vec!["ingest".to_string(), "--listen".to_string(), listen];
    ingest_args.extend(common.iter().cloned());

    // Stagger the daemon so ingestion comes up first.
    let mut daemon_args = vec![
        "daemon".to_string(),
        "--start-delay".to_string(),
        "5".to_string(),
    ];
    daemon_args.extend(common.iter().cloned());

    let supervisor = Supervisor::new(vec![
        ServiceSpec::new("ingest", exe.clone(), ingest_args),
        ServiceSpec::new("daemon", exe, daemon_args),
    ]);

    let token = CancellationToken::new();
    super::spawn_signal_task(token.clone());
    supervisor.run(token).await
}
