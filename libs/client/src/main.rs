//! tether - watch telemetry topics from the command line
//!
//! Connects to the best reachable server (static address, team number,
//! then localhost), subscribes to the requested topics and prints their
//! latest values once per interval until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value as Json;
use tether_client::{Client, ClientConfig, Error, Pose2d, Result};
use tether_core::WireType;
use tether_fabric::TcpTransport;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Watch telemetry topics")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Identity announced to the server
    #[arg(short, long)]
    identity: Option<String>,

    /// Static server address, tried first
    #[arg(short, long)]
    server: Option<String>,

    /// Team number
    #[arg(short, long)]
    team: Option<u32>,

    /// Topic to watch, as PATH or PATH=TYPE (e.g. speed=double)
    #[arg(short, long = "watch", value_name = "PATH[=TYPE]")]
    watch: Vec<String>,

    /// Pose2d struct topic to watch
    #[arg(long, default_value = "MyPose")]
    pose: String,

    /// Seconds between status lines
    #[arg(long, default_value_t = 1)]
    interval: u64,
}

impl Args {
    fn config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                ClientConfig::load(path)?
            }
            None => ClientConfig::default(),
        };

        if let Some(identity) = &self.identity {
            config.identity = identity.clone();
        }
        if let Some(server) = &self.server {
            config.server = Some(server.clone());
        }
        if let Some(team) = self.team {
            config.team = Some(team);
        }
        Ok(config)
    }
}

/// Split `PATH[=TYPE]`; without a type the topic is watched as a double
fn parse_watch(arg: &str) -> Result<(String, WireType)> {
    match arg.split_once('=') {
        Some((path, tag)) => {
            let wire_type = tag
                .parse()
                .map_err(|e: tether_core::Error| Error::Config(e.to_string()))?;
            Ok((path.to_string(), wire_type))
        }
        None => Ok((arg.to_string(), WireType::Double)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=info,tether_client=info,tether_fabric=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.config()?;
    let watched = args
        .watch
        .iter()
        .map(|arg| parse_watch(arg))
        .collect::<Result<Vec<_>>>()?;

    info!("tether v{}", env!("CARGO_PKG_VERSION"));
    for target in config.targets() {
        info!("Target {}", target);
    }

    let transport = Arc::new(TcpTransport::builder().port(config.port).build());
    let client = Client::open(&config, transport)?;

    client.on_connection(|connected, remote| match (connected, remote) {
        (true, Some(remote)) => info!("Connected to {}", remote),
        (true, None) => info!("Connected"),
        (false, _) => info!("Disconnected"),
    });
    client.subscribe_struct::<Pose2d>(&args.pose)?;
    for (path, wire_type) in &watched {
        client.subscribe_typed(path, wire_type.clone())?;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let target = client
                    .current_target()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("[{}] {}", client.state(), target);

                if let Some(pose) = client.get_struct::<Pose2d>(&args.pose) {
                    println!("  {} = {}", args.pose, pose);
                }
                for (path, _) in &watched {
                    println!("  {} = {}", path, client.get(path, &Json::Null));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    client.closed().await;
    Ok(())
}
