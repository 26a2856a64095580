// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::H256;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod account;
mod bundler;
mod config;
mod contracts;
mod decoder;
mod error;
mod gas;
mod orchestrator;
mod registry;
mod rpc;
mod submitter;
#[cfg(test)]
mod testing;
mod types;

use crate::account::SmartAccount;
use crate::bundler::{ChainReader, HttpBundler};
use crate::config::{Args, Command, Config};
use crate::orchestrator::{ActionOrchestrator, DeployRequest, MintRequest, TransferRequest};
use crate::registry::TokenRegistry;
use crate::rpc::{LaunchpadRpcImpl, LaunchpadRpcServer};
use crate::submitter::OperationSubmitter;
use crate::types::Chain;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_args(&args)?;
    let orchestrator = build_orchestrator(&config)?;
    info!(
        chain = %config.chain,
        smart_account = ?config.smart_account,
        "launchpad orchestrator ready"
    );

    match args.command {
        Command::Serve { rpc_server_addr } => {
            let server_addr: SocketAddr = rpc_server_addr.parse()?;
            info!("Starting launchpad RPC server on {}", server_addr);

            let server_handle = start_server(server_addr, orchestrator).await?;

            tokio::signal::ctrl_c().await?;
            server_handle.stop()?;
            info!("Server stopped");
        }
        Command::Deploy {
            name,
            symbol,
            supply,
        } => {
            let outcome = orchestrator
                .deploy(DeployRequest {
                    name,
                    symbol,
                    supply,
                })
                .await?;
            print_json(&outcome)?;
            print_tx_link(config.chain, outcome.tx_hash);
        }
        Command::Mint { token, amount } => {
            let outcome = orchestrator.mint(MintRequest { token, amount }).await?;
            print_json(&outcome)?;
            print_tx_link(config.chain, outcome.tx_hash);
        }
        Command::Transfer {
            asset,
            recipient,
            amount,
        } => {
            let outcome = orchestrator
                .transfer(TransferRequest {
                    asset,
                    recipient,
                    amount,
                })
                .await?;
            print_json(&outcome)?;
            print_tx_link(config.chain, outcome.tx_hash);
        }
        Command::Tokens => {
            let tokens = orchestrator
                .registry()
                .list(orchestrator.chain_id(), orchestrator.smart_account());
            print_json(&tokens)?;
        }
        Command::Sources => {
            print_json(&orchestrator.transfer_sources().await?)?;
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config) -> anyhow::Result<ActionOrchestrator> {
    let chain_provider = Arc::new(Provider::<Http>::try_from(config.eth_rpc_url.as_str())?);
    let owner: LocalWallet = config.private_key.parse()?;

    let smart_account = SmartAccount::new(
        owner,
        config.smart_account,
        config.entry_point,
        config.chain.id(),
    );
    info!(owner = ?smart_account.owner(), "loaded smart account owner key");

    let bundler = HttpBundler::new(&config.bundler_url, chain_provider.clone(), config.entry_point)?;
    let chain_reader: Arc<dyn ChainReader> = chain_provider;

    let submitter = OperationSubmitter::new(
        Arc::new(bundler),
        chain_reader.clone(),
        Arc::new(smart_account),
        config.smart_account,
        config.chain,
    );
    let registry = Arc::new(TokenRegistry::open(&config.registry_path)?);

    Ok(ActionOrchestrator::new(
        submitter,
        chain_reader,
        registry,
        config.deployment,
    ))
}

async fn start_server(
    server_addr: SocketAddr,
    orchestrator: ActionOrchestrator,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;

    let module = LaunchpadRpcImpl::new(Arc::new(orchestrator)).into_rpc();
    let server_handle = server.start(module);

    Ok(server_handle)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tx_link(chain: Chain, tx_hash: H256) {
    println!("{}", chain.tx_url(tx_hash));
}
