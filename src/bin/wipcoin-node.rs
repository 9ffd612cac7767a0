#![forbid(unsafe_code)]
//! WIPcoin node: loads configuration, restores the last snapshot and serves the API

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wipcoin::api::run_api_server;
use wipcoin::config::load_config;
use wipcoin::crypto::KeyPair;
use wipcoin::node::Node;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Overrides network.api_port
    #[arg(long)]
    port: Option<u16>,
    /// Prints a fresh secret key and identity, then exits
    #[arg(long)]
    generate_key: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.generate_key {
        let keypair = KeyPair::generate()?;
        println!("secret_key = \"{}\"", keypair.secret_key_hex());
        println!("identity   = \"{}\"", keypair.identity());
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.network.api_port = port;
        config.validate()?;
    }

    let node = Arc::new(Node::from_config(&config).await?);
    match node.identity() {
        Some(identity) => tracing::info!(node_id = %config.node.id, %identity, "node started"),
        None => tracing::warn!(node_id = %config.node.id, "node started without a miner key; mining is disabled"),
    }

    run_api_server(node, config.network.api_port).await?;
    Ok(())
}
