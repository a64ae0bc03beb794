//! The Denaro node daemon.
//!
//! Reads its configuration from the environment, assembles the node context,
//! runs the background loops, and drains gracefully on SIGINT/SIGTERM. The
//! HTTP framing layer attaches to the same [`node::Node`] context.

mod config;
mod node;

use std::path::PathBuf;
use std::process;

use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{Config, LogFormat};
use node::Node;

#[derive(Debug, StructOpt)]
#[structopt(name = "denarod", about = "A Denaro full node")]
struct Opt {
    /// Override the data directory (default: the platform cache dir).
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    /// Run on the regtest network.
    #[structopt(long)]
    regtest: bool,

    /// Use throwaway storage and identity; nothing survives exit.
    #[structopt(long)]
    ephemeral: bool,
}

fn init_tracing(config: &Config) {
    let mut filter = config.log.level.clone();
    if !config.log.include_block_sync_messages {
        // Silence the chatty sync/discovery lines without touching warnings.
        filter.push_str(",denaro_network::sync=warn");
    }
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.log.console_highlighting);

    match (&config.log.format, &config.log.date_format) {
        (LogFormat::Json, _) => builder.json().init(),
        (LogFormat::Plain, Some(date_format)) => builder
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(
                date_format.clone(),
            ))
            .init(),
        (LogFormat::Plain, None) => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("denarod: configuration error: {}", error);
            process::exit(1);
        }
    };
    if opt.regtest {
        config.network = denaro_chain::parameters::Network::Regtest;
    }

    init_tracing(&config);
    if let Err(error) = color_eyre::install() {
        eprintln!("denarod: error-report hooks failed to install: {}", error);
    }

    let node = match Node::init(config, opt.data_dir, opt.ephemeral) {
        Ok(node) => node,
        Err(error) => {
            error!(%error, "node failed to start");
            process::exit(error.exit_code());
        }
    };

    node.bootstrap().await;
    let tasks = node.spawn_background_tasks();

    let status = node.status().await;
    info!(
        node_id = %status.node_id,
        height = status.height,
        "denarod is up"
    );

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "signal handler failed");
    }

    node.graceful_shutdown().await;
    for task in tasks {
        task.abort();
    }
    info!("bye");
}
