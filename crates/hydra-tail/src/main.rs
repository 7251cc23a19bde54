//! # Hydra Tail
//!
//! Connects to a Hydra node and logs its message and status streams until
//! Ctrl-C. Every setting can come from a flag or its `HYDRA_*` variable.

use std::time::Duration;

use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::Parser;
use hydra_client::{ClientConfig, HeadClient};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(author, version, about = "Follow the message stream of a Hydra node", long_about = None)]
struct Cli {
    /// Base URL of the node's HTTP API.
    #[arg(long, value_name = "URL", env = "HYDRA_HTTP_URL")]
    http_url: String,

    /// WebSocket base URL, derived from the HTTP URL when absent.
    #[arg(long, value_name = "URL", env = "HYDRA_WS_URL")]
    ws_url: Option<String>,

    /// Replay the node's message history on connect.
    #[arg(long, env = "HYDRA_HISTORY", value_parser = FalseyValueParser::new())]
    history: bool,

    /// Only stream messages for this address.
    #[arg(long, value_name = "ADDRESS", env = "HYDRA_ADDRESS")]
    address: Option<String>,

    /// Seconds a command waits for the connection before failing.
    #[arg(long, value_name = "SECS", env = "HYDRA_SEND_TIMEOUT_SECS", default_value_t = 5)]
    send_timeout_secs: u64,

    /// Also log the confirmed snapshot UTxO count.
    #[arg(long, default_value_t = false)]
    snapshot: bool,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.http_url)
            .with_history(self.history)
            .with_send_timeout(Duration::from_secs(self.send_timeout_secs));
        if let Some(ws_url) = &self.ws_url {
            config = config.with_ws_url(ws_url);
        }
        if let Some(address) = &self.address {
            config = config.with_address(address);
        }
        config
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Follow one node until interrupted.
pub async fn run(config: ClientConfig, show_snapshot: bool) -> anyhow::Result<()> {
    let client = HeadClient::new(config)?;
    client.on_message(|message| {
        if message.is_recognized() {
            info!(tag = message.tag(), "Message");
        } else {
            warn!(tag = message.tag(), "Unrecognized message");
        }
    });
    client.on_status_change(|status| info!(%status, "Status changed"));

    info!(url = %client.config().websocket_url(), "Following Hydra node");
    client.connect()?;

    if show_snapshot {
        match client.fetch_snapshot_utxos().await {
            Ok(utxos) => info!(count = utxos.len(), "Snapshot UTxOs"),
            Err(e) => warn!(error = %e, "Snapshot unavailable"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down");
    client.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    run(cli.client_config(), cli.snapshot).await
}
