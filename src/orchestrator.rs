// src/orchestrator.rs
use std::sync::Arc;

use chrono::Utc;
use ethers::types::{Address, H256, U256};
use ethers::utils::{format_ether, parse_ether};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bundler::ChainReader;
use crate::contracts::{self, Deployment};
use crate::decoder;
use crate::error::{OrchestratorError, SubmissionError};
use crate::registry::TokenRegistry;
use crate::submitter::OperationSubmitter;
use crate::types::{
    ActionKind, Call, DecodedEvent, EventShape, Receipt, RegisteredToken, TokenTransferred,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub name: String,
    pub symbol: String,
    pub supply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub token: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// `"native"` or a token address.
    pub asset: String,
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub token: RegisteredToken,
    pub tx_hash: H256,
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub token: Address,
    pub amount: U256,
    pub tx_hash: H256,
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub tx_hash: H256,
    pub transfer: Option<TokenTransferred>,
}

/// Asset the user can send, with the smart account's current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSource {
    pub symbol: String,
    pub name: String,
    /// `None` for the chain's native unit.
    pub address: Option<Address>,
    pub balance: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Asset {
    Native,
    Token(Address),
}

/// Composes submitter calls into deploy, mint and transfer actions and keeps
/// the registry in step with what landed on chain.
pub struct ActionOrchestrator {
    submitter: OperationSubmitter,
    chain_reader: Arc<dyn ChainReader>,
    registry: Arc<TokenRegistry>,
    deployment: Deployment,
}

impl ActionOrchestrator {
    pub fn new(
        submitter: OperationSubmitter,
        chain_reader: Arc<dyn ChainReader>,
        registry: Arc<TokenRegistry>,
        deployment: Deployment,
    ) -> Self {
        Self {
            submitter,
            chain_reader,
            registry,
            deployment,
        }
    }

    pub fn smart_account(&self) -> Address {
        self.submitter.sender()
    }

    pub fn chain_id(&self) -> u64 {
        self.deployment.chain.id()
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome, OrchestratorError> {
        let name = required("name", &request.name)?;
        let symbol = required("symbol", &request.symbol)?;
        let supply_text = required("supply", &request.supply)?;
        let supply = amount("supply", supply_text)?;
        info!(token_name = name, symbol, chain = %self.deployment.chain, "deploying token");

        let factory = self.deployment.factory;
        let receipt = self
            .submitter
            .submit(
                vec![contracts::deploy_token(factory, name, symbol)],
                ActionKind::Deploy,
                None,
            )
            .await?;
        ensure_success(&receipt)?;

        let token_address = match decoder::decode(&receipt, factory, EventShape::Creation) {
            DecodedEvent::TokenCreated { token_address } => token_address,
            _ => decoder::fallback_created_address(&receipt, factory)
                .ok_or_else(|| OrchestratorError::Decoding("TokenCreated event".to_string()))?,
        };
        info!(token = ?token_address, tx = %self.deployment.chain.tx_url(receipt.transaction_hash), "token deployed");

        let record = contracts::record_deploy(
            self.deployment.indexer,
            token_address,
            name,
            symbol,
            supply,
        );
        let recorded = self.record(record, "deploy").await;

        let token = RegisteredToken {
            name: name.to_string(),
            symbol: symbol.to_string(),
            address: token_address,
            chain_id: self.chain_id(),
            owner_smart_account: self.smart_account(),
            supply: supply_text.to_string(),
            deploy_tx_hash: Some(receipt.transaction_hash),
            created_at: Utc::now(),
            last_known_balance: U256::zero(),
        };
        self.registry.record_deployed(token.clone())?;

        Ok(DeployOutcome {
            token,
            tx_hash: receipt.transaction_hash,
            recorded,
        })
    }

    pub async fn mint(&self, request: MintRequest) -> Result<MintOutcome, OrchestratorError> {
        let token = address("token", &request.token)?;
        let amount = amount("amount", required("amount", &request.amount)?)?;
        let account = self.smart_account();
        info!(token = ?token, amount = %request.amount, "minting token");

        let receipt = self
            .submitter
            .submit(
                vec![contracts::mint(token, account, amount)],
                ActionKind::Mint,
                None,
            )
            .await?;
        ensure_success(&receipt)?;

        let record = contracts::record_mint(self.deployment.indexer, token, account, amount);
        let recorded = self.record(record, "mint").await;
        self.refresh_balance(token).await;

        Ok(MintOutcome {
            token,
            amount,
            tx_hash: receipt.transaction_hash,
            recorded,
        })
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome, OrchestratorError> {
        let asset = match required("asset", &request.asset)? {
            "native" => Asset::Native,
            other => Asset::Token(self.known_token(other)?),
        };
        let recipient = address("recipient", &request.recipient)?;
        let amount = amount("amount", required("amount", &request.amount)?)?;
        info!(asset = ?asset, recipient = ?recipient, amount = %request.amount, "transferring");

        let calls = match asset {
            Asset::Native => vec![Call::value_transfer(recipient, amount)],
            // The record call rides in the same operation, so it lands or
            // reverts together with the transfer.
            Asset::Token(token) => vec![
                contracts::approve(token, self.smart_account(), amount),
                contracts::transfer(token, recipient, amount),
                contracts::record_transfer(self.deployment.indexer, token, recipient, amount),
            ],
        };

        let receipt = self
            .submitter
            .submit(calls, ActionKind::Transfer, None)
            .await?;
        ensure_success(&receipt)?;

        let transfer = match asset {
            Asset::Native => None,
            Asset::Token(token) => {
                self.refresh_balance(token).await;
                match decoder::decode(&receipt, self.deployment.indexer, EventShape::Transfer) {
                    DecodedEvent::TokenTransferred(event) => Some(event),
                    _ => {
                        debug!(tx = ?receipt.transaction_hash, "no TokenTransferred event in receipt");
                        None
                    }
                }
            }
        };

        Ok(TransferOutcome {
            tx_hash: receipt.transaction_hash,
            transfer,
        })
    }

    /// Native balance first, then every known token the smart account holds.
    pub async fn transfer_sources(&self) -> Result<Vec<TransferSource>, OrchestratorError> {
        let chain = self.deployment.chain;
        let account = self.smart_account();
        let native = self
            .chain_reader
            .native_balance(account)
            .await?;

        let mut sources = vec![TransferSource {
            symbol: chain.native_symbol().to_string(),
            name: format!("{} (Native)", chain),
            address: None,
            balance: format_ether(native),
        }];

        for token in self.registry.list_known(chain.id()) {
            if sources.iter().any(|s| s.address == Some(token.address)) {
                continue;
            }
            match self.chain_reader.token_balance(token.address, account).await {
                Ok(balance) if !balance.is_zero() => sources.push(TransferSource {
                    symbol: token.symbol,
                    name: token.name,
                    address: Some(token.address),
                    balance: format_ether(balance),
                }),
                Ok(_) => {}
                Err(e) => warn!(token = ?token.address, error = %e, "could not read token balance"),
            }
        }
        Ok(sources)
    }

    fn known_token(&self, value: &str) -> Result<Address, OrchestratorError> {
        let token = address("asset", value)?;
        if self
            .registry
            .list_known(self.chain_id())
            .iter()
            .any(|known| known.address == token)
        {
            Ok(token)
        } else {
            Err(OrchestratorError::Validation(format!(
                "asset {value} is not a registered token on chain {}",
                self.chain_id()
            )))
        }
    }

    // Secondary operation feeding the off-chain indexer. Its failure is
    // logged and dropped; the primary action has already succeeded.
    async fn record(&self, call: Call, what: &str) -> bool {
        match self.submitter.submit(vec![call], ActionKind::Record, None).await {
            Ok(receipt) if receipt.is_success() => {
                debug!(what, tx = ?receipt.transaction_hash, logs = receipt.logs.len(), "recorded for indexing");
                true
            }
            Ok(receipt) => {
                warn!(what, tx = ?receipt.transaction_hash, "record operation reverted");
                false
            }
            Err(e) => {
                warn!(what, error = %e, "record operation failed");
                false
            }
        }
    }

    async fn refresh_balance(&self, token: Address) {
        let account = self.smart_account();
        let balance = match self.chain_reader.token_balance(token, account).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(token = ?token, error = %e, "balance refresh failed");
                return;
            }
        };
        if let Err(e) = self
            .registry
            .update_balance(self.chain_id(), account, token, balance)
        {
            warn!(token = ?token, error = %e, "could not store refreshed balance");
        }
    }
}

fn ensure_success(receipt: &Receipt) -> Result<(), OrchestratorError> {
    if receipt.is_success() {
        Ok(())
    } else {
        Err(SubmissionError::Reverted {
            tx_hash: receipt.transaction_hash,
        }
        .into())
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, OrchestratorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OrchestratorError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn address(field: &str, value: &str) -> Result<Address, OrchestratorError> {
    required(field, value)?
        .parse()
        .map_err(|_| OrchestratorError::Validation(format!("{field} is not a valid address: {value}")))
}

fn amount(field: &str, value: &str) -> Result<U256, OrchestratorError> {
    parse_ether(value)
        .map_err(|e| OrchestratorError::Validation(format!("{field} is not a valid amount ({value}): {e}")))
}
