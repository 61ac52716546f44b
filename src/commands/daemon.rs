use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::WxPaths;
use crate::daemon;
use crate::uplink::AprsIsUplink;

pub async fn handle_daemon(paths: WxPaths, start_delay: u64) -> Result<()> {
    if start_delay > 0 {
        info!("delaying daemon start by {}s", start_delay);
        tokio::time::sleep(Duration::from_secs(start_delay)).await;
    }
    let token = CancellationToken::new();
    super::spawn_signal_task(token.clone());
    let uplink = AprsIsUplink;
    daemon::run(&paths, &uplink, token).await
}
