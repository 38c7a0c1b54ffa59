// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::prelude::{Address, Signer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use onchain_identifier::bundler::Bundler;
use onchain_identifier::config::{HarnessConfig, NodeConfig};
use onchain_identifier::fixture::Fixture;
use onchain_identifier::rpc::{self, BundlerRpcImpl};
use onchain_identifier::scenarios;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy the contracts and run every identifier placement scenario
    Scenarios {
        #[clap(flatten)]
        config: HarnessConfig,

        /// Only run scenarios whose name contains this string
        #[clap(long)]
        filter: Option<String>,
    },

    /// Serve the pass-through bundler over JSON-RPC
    Bundler {
        #[clap(long, env = "RPC_SERVER_ADDR", default_value = "127.0.0.1:3000")]
        rpc_server_addr: String,

        #[clap(flatten)]
        node: NodeConfig,

        #[clap(short, long, env = "ENTRY_POINT")]
        entry_point: Address,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Scenarios { config, filter } => run_scenarios(config, filter).await,
        Command::Bundler {
            rpc_server_addr,
            node,
            entry_point,
        } => serve_bundler(rpc_server_addr, node, entry_point).await,
    }
}

async fn run_scenarios(config: HarnessConfig, filter: Option<String>) -> anyhow::Result<()> {
    let mut fixture = Fixture::setup(&config).await?;
    info!("Using identifier {}", fixture.identifier);

    let report = scenarios::run_all(&mut fixture, filter.as_deref()).await?;
    let failures = report.failures();
    info!(
        "{} scenarios run, {} failed",
        report.results.len(),
        failures
    );

    if failures > 0 {
        anyhow::bail!("{failures} scenario(s) failed");
    }
    Ok(())
}

async fn serve_bundler(
    rpc_server_addr: String,
    node: NodeConfig,
    entry_point: Address,
) -> anyhow::Result<()> {
    let relayer = node.connect_relayer().await?;
    let beneficiary = relayer.signer().address();
    let bundler = Arc::new(Bundler::new(relayer, beneficiary));

    let server_addr: SocketAddr = rpc_server_addr.parse()?;
    let bundler_rpc = BundlerRpcImpl::new(bundler, entry_point);

    info!("Starting bundler RPC server on {} for entry point {:?}", server_addr, entry_point);

    let server_handle = rpc::start_server(server_addr, bundler_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}
