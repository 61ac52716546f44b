use anyhow::Result;
use tracing::info;

use crate::config::{self, WxPaths};
use crate::sequencer::Sequencer;
use crate::uplink::AprsIsUplink;
use crate::weather;

/// One-shot transmission run.
pub async fn handle_send(paths: WxPaths, test: bool) -> Result<()> {
    let config = config::load(&paths)?;
    let reading = weather::load_reading(&paths.reading);
    let uplink = AprsIsUplink;
    let outcome = Sequencer::new(&uplink).run(&config, &reading, test).await;
    info!("transmission finished: {:?}", outcome);
    Ok(())
}
