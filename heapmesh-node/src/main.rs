#[macro_use]
extern crate log;

use anyhow::Result;
use clap::Parser;
use heapmesh_common::config::{NodeConfig, DEFAULT_PORT};
use heapmesh_node::context::Context;
use heapmesh_node::machine::Machine;
use heapmesh_node::server::Server;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; when given, the other flags are ignored
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    #[clap(short, long, value_parser, default_value = "127.0.0.1")]
    address: IpAddr,
    #[clap(short, long, value_parser, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[clap(short, long, action)]
    master: bool,
    /// Peer to join, as `ip` or `ip:port`; repeatable
    #[clap(long = "peer", value_parser, action = clap::ArgAction::Append)]
    peers: Vec<String>,
    /// Seconds between state machine ticks, before jitter
    #[clap(short, long, value_parser, default_value = "2")]
    step_time: u64,
    /// Seconds before an outbound peer request is abandoned
    #[clap(long, value_parser, default_value = "3")]
    request_timeout: u64,
    /// Handle connections concurrently instead of one at a time
    #[clap(long, action)]
    concurrent: bool,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig> {
        if let Some(path) = self.config {
            return Ok(NodeConfig::from_file(path)?);
        }

        let config = NodeConfig {
            address: self.address,
            port: self.port,
            master: self.master,
            peers: self.peers,
            step_time: Duration::from_secs(self.step_time),
            request_timeout: Duration::from_secs(self.request_timeout),
            concurrent: self.concurrent,
        };

        Ok(config.validate()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(_) = std::env::var("RUST_LOG") {
        std::env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::init();

    let config = Args::parse().into_config()?;
    let ctx = Arc::new(Context::new(config));

    let lifecycle = ctx.lifecycle.clone();
    ctrlc::set_handler(move || {
        warn!("receive terminate signal... node will be stopped.");
        lifecycle.stop();
    })?;

    let server = Server::bind(ctx.clone()).await?;
    let machine = tokio::spawn(Machine::new(ctx.clone())?.run());

    if let Err(e) = server.serve().await {
        error!("{:?}", e);
        std::process::exit(1);
    }

    ctx.lifecycle.stop();
    machine.await?;

    Ok(())
}
