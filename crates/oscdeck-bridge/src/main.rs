use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use oscdeck_bridge::{BridgeConfig, PresetServer, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // A dying bridge should say so in the log, not just on stderr
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("panic: {}", panic_info);
        original_hook(panic_info);
    }));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("loading configuration from {}", path);
            BridgeConfig::load_from_file(Path::new(&path))?
        }
        None => BridgeConfig::default(),
    };

    let relay = RelayServer::new(config.clone()).bind().await?;
    let presets = PresetServer::new(config).bind().await?;

    let relay_task = relay.spawn();
    let preset_task = presets.spawn();
    tokio::select! {
        result = relay_task => result??,
        result = preset_task => result??,
    }
    Ok(())
}
