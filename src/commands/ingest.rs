use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::WxPaths;
use crate::ingest;
use crate::metrics::init_metrics;

pub async fn handle_ingest(paths: WxPaths, listen: String) -> Result<()> {
    let metrics = init_metrics();
    let token = CancellationToken::new();
    super::spawn_signal_task(token.clone());
    ingest::serve(&listen, paths, metrics, token).await
}
