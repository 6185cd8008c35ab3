//! Serial bridge for Linux hosts.
//!
//! The serial link is stdin/stdout by default. With `FLIPPER_BRIDGE_LISTEN`
//! set (e.g. `0.0.0.0:9000`), the bridge instead serves one TCP client at a
//! time, which is how a UART-to-TCP adapter or a test harness connects.
//! Logs go to stderr so they never mix with the protocol.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flipper_bridge_core::{BridgeConfig, FileSettingsStorage};
use flipper_bridge_engine::{
    Bridge, Exit, HostWifi, LogLed, SettingsBridge, StreamTransport, TungsteniteConnector,
    UreqClient,
};

const DEFAULT_SETTINGS_PATH: &str = "flipper-http.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,flipper_bridge_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config()?;
    let settings_path: PathBuf = std::env::var("FLIPPER_BRIDGE_SETTINGS")
        .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.into())
        .into();
    tracing::info!("Flipper bridge starting (settings: {})", settings_path.display());

    let link = async {
        match std::env::var("FLIPPER_BRIDGE_LISTEN") {
            Ok(addr) => serve_tcp(&addr, &config, &settings_path).await,
            Err(_) => {
                let transport = StreamTransport::new(tokio::io::stdin(), tokio::io::stdout());
                serve(transport, &config, &settings_path).await
            }
        }
    };

    tokio::select! {
        result = link => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn load_config() -> anyhow::Result<BridgeConfig> {
    let Ok(path) = std::env::var("FLIPPER_BRIDGE_CONFIG") else {
        return Ok(BridgeConfig::default());
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config =
        BridgeConfig::from_json(&json).with_context(|| format!("Invalid config file {}", path))?;
    tracing::info!("Loaded configuration from {}", path);
    Ok(config)
}

/// Accept TCP clients one after another; each gets a freshly booted bridge.
async fn serve_tcp(addr: &str, config: &BridgeConfig, settings_path: &Path) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Serial link listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Serial client connected: {}", peer);
        let (reader, writer) = stream.into_split();
        if let Err(e) = serve(StreamTransport::new(reader, writer), config, settings_path).await {
            tracing::warn!("Serial client {} dropped: {:#}", peer, e);
        }
        tracing::info!("Serial client disconnected: {}", peer);
    }
}

/// Boot and run the bridge on one link until it closes. `[REBOOT]` boots again.
async fn serve<R, W>(
    transport: StreamTransport<R, W>,
    config: &BridgeConfig,
    settings_path: &Path,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let settings = SettingsBridge::new(HostWifi::new(), FileSettingsStorage::new(settings_path));
    let mut bridge = Bridge::new(
        config.clone(),
        transport,
        UreqClient::new(config.http_timeout()),
        TungsteniteConnector::new(),
        settings,
        LogLed::new(config.use_led),
    );

    loop {
        bridge.boot().await?;
        match bridge.run().await? {
            Exit::Reboot => tracing::info!("Rebooting bridge"),
            Exit::TransportClosed => return Ok(()),
        }
    }
}
