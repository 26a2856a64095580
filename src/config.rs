// src/config.rs
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use ethers::types::Address;

use crate::contracts::{Deployment, ENTRY_POINT_V06};
use crate::types::Chain;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(long, env = "CHAIN_ID")]
    pub chain_id: u64,

    #[clap(long, env = "ETH_RPC_URL")]
    pub eth_rpc_url: String,

    #[clap(long, env = "BUNDLER_URL")]
    pub bundler_url: String,

    #[clap(long, env = "OWNER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    #[clap(long, env = "SMART_ACCOUNT_ADDRESS")]
    pub smart_account: String,

    #[clap(long, env = "ENTRY_POINT", default_value = ENTRY_POINT_V06)]
    pub entry_point: String,

    #[clap(long, env = "REGISTRY_PATH", default_value = "deployed_tokens.json")]
    pub registry_path: PathBuf,

    #[clap(long, env = "FACTORY_ADDRESS")]
    pub factory: Option<String>,

    #[clap(long, env = "INDEXER_ADDRESS")]
    pub indexer: Option<String>,

    #[clap(short, long)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the launchpad JSON-RPC API
    Serve {
        #[clap(short, long, default_value = "127.0.0.1:8546")]
        rpc_server_addr: String,
    },
    /// Deploy a new ERC-20 token through the smart account
    Deploy {
        #[clap(long)]
        name: String,
        #[clap(long)]
        symbol: String,
        #[clap(long)]
        supply: String,
    },
    /// Mint tokens to the smart account
    Mint {
        #[clap(long)]
        token: String,
        #[clap(long)]
        amount: String,
    },
    /// Send native currency ("native") or a registered token
    Transfer {
        #[clap(long)]
        asset: String,
        #[clap(long)]
        recipient: String,
        #[clap(long)]
        amount: String,
    },
    /// List tokens deployed by the smart account
    Tokens,
    /// List assets the smart account can transfer
    Sources,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub chain: Chain,
    pub eth_rpc_url: String,
    pub bundler_url: String,
    pub private_key: String,
    pub smart_account: Address,
    pub entry_point: Address,
    pub registry_path: PathBuf,
    pub deployment: Deployment,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let chain = Chain::try_from(args.chain_id).map_err(|e| anyhow!(e))?;
        let mut deployment = Deployment::for_chain(chain);
        if let Some(factory) = &args.factory {
            deployment.factory = parse_address("factory", factory)?;
        }
        if let Some(indexer) = &args.indexer {
            deployment.indexer = parse_address("indexer", indexer)?;
        }
        let smart_account = parse_address("smart account", &args.smart_account)?;
        if smart_account.is_zero() {
            return Err(anyhow!("smart account address must not be zero"));
        }

        Ok(Self {
            chain,
            eth_rpc_url: args.eth_rpc_url.clone(),
            bundler_url: args.bundler_url.clone(),
            private_key: args.private_key.clone(),
            smart_account,
            entry_point: parse_address("entry point", &args.entry_point)?,
            registry_path: args.registry_path.clone(),
            deployment,
        })
    }
}

fn parse_address(what: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid {what} address: {value}"))
}
