//! Lists the recording folders of the configured NextPVR server
//!
//! ```sh
//! RUST_LOG=pmonextpvr=debug cargo run -p pmonextpvr --example browse_recordings
//! ```

use pmonextpvr::{ChangePoller, NextPvrClient, RecordingCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Console logging from `host.logger`, `RUST_LOG` wins when set
fn init_logging() -> anyhow::Result<()> {
    let config = pmoconfig::get_config();
    if !config.get_log_enable_console()? {
        return Ok(());
    }
    let level = config.get_log_min_level()?.to_lowercase();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let client = Arc::new(NextPvrClient::from_config()?);
    let cache = Arc::new(RecordingCache::new(client.clone()));
    let cancel = CancellationToken::new();

    let status = client.status(&cancel).await?;
    println!("NextPVR {} ({} tuners)", status.version, status.tuners.len());

    for folder in cache.get_groups(&cancel).await? {
        println!("\n{} [{}] - {} items", folder.name, folder.id, folder.item_count);
        for item in cache.get_folder_items(&folder.id, &cancel).await? {
            let runtime = item.runtime.as_secs() / 60;
            println!("  {} ({} min) {}", item.name, runtime, item.locator);
        }
    }

    let poller = ChangePoller::spawn(
        client.clone(),
        cache.clone(),
        client.settings().poll_interval,
    );
    let mut events = poller.subscribe();
    println!("\nWaiting for recording changes, Ctrl-C to quit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Ok(event) = event else { break };
                println!("Recordings changed at {}", event.changed_at);
                println!("{} recordings", cache.latest_items(&cancel).await?.len());
            }
        }
    }

    poller.shutdown().await;
    Ok(())
}
