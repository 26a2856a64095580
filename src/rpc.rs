// src/rpc.rs
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned};
use tracing::{debug, error, info};

use crate::error::OrchestratorError;
use crate::orchestrator::{
    ActionOrchestrator, DeployOutcome, DeployRequest, MintOutcome, MintRequest, TransferOutcome,
    TransferRequest, TransferSource,
};
use crate::types::RegisteredToken;

#[rpc(server, namespace = "launchpad")]
pub trait LaunchpadRpc {
    /// Deploys a token through the factory and records it for indexing
    #[method(name = "deployToken")]
    async fn deploy_token(&self, request: DeployRequest) -> RpcResult<DeployOutcome>;

    /// Mints tokens to the smart account
    #[method(name = "mintToken")]
    async fn mint_token(&self, request: MintRequest) -> RpcResult<MintOutcome>;

    /// Sends native currency or a registered token
    #[method(name = "transfer")]
    async fn transfer(&self, request: TransferRequest) -> RpcResult<TransferOutcome>;

    /// Tokens deployed by this smart account on the configured chain
    #[method(name = "listTokens")]
    async fn list_tokens(&self) -> RpcResult<Vec<RegisteredToken>>;

    /// Every token known on the configured chain
    #[method(name = "listKnownTokens")]
    async fn list_known_tokens(&self) -> RpcResult<Vec<RegisteredToken>>;

    #[method(name = "transferSources")]
    async fn transfer_sources(&self) -> RpcResult<Vec<TransferSource>>;
}

pub struct LaunchpadRpcImpl {
    orchestrator: Arc<ActionOrchestrator>,
}

impl LaunchpadRpcImpl {
    pub fn new(orchestrator: Arc<ActionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl LaunchpadRpcServer for LaunchpadRpcImpl {
    async fn deploy_token(&self, request: DeployRequest) -> RpcResult<DeployOutcome> {
        debug!("Received deploy request for {}", request.symbol);
        let outcome = self
            .orchestrator
            .deploy(request)
            .await
            .map_err(to_rpc_error)?;
        info!("Deployed {} at {:?}", outcome.token.symbol, outcome.token.address);
        Ok(outcome)
    }

    async fn mint_token(&self, request: MintRequest) -> RpcResult<MintOutcome> {
        debug!("Received mint request for {}", request.token);
        Ok(self.orchestrator.mint(request).await.map_err(to_rpc_error)?)
    }

    async fn transfer(&self, request: TransferRequest) -> RpcResult<TransferOutcome> {
        debug!("Received transfer request to {}", request.recipient);
        Ok(self
            .orchestrator
            .transfer(request)
            .await
            .map_err(to_rpc_error)?)
    }

    async fn list_tokens(&self) -> RpcResult<Vec<RegisteredToken>> {
        Ok(self
            .orchestrator
            .registry()
            .list(self.orchestrator.chain_id(), self.orchestrator.smart_account()))
    }

    async fn list_known_tokens(&self) -> RpcResult<Vec<RegisteredToken>> {
        Ok(self
            .orchestrator
            .registry()
            .list_known(self.orchestrator.chain_id()))
    }

    async fn transfer_sources(&self) -> RpcResult<Vec<TransferSource>> {
        Ok(self
            .orchestrator
            .transfer_sources()
            .await
            .map_err(to_rpc_error)?)
    }
}

fn to_rpc_error(e: OrchestratorError) -> ErrorObjectOwned {
    error!("Launchpad action failed: {}", e);
    ErrorObject::owned(e.rpc_code(), e.to_string(), None::<()>)
}
