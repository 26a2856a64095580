// src/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use serde::{Deserialize, Serialize};

/// ERC-4337 v0.6 user operation as it travels to the bundler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn with_envelope(mut self, envelope: &GasEnvelope) -> Self {
        self.call_gas_limit = envelope.call_gas_limit;
        self.verification_gas_limit = envelope.verification_gas_limit;
        self.pre_verification_gas = envelope.pre_verification_gas;
        self
    }
}

/// One `{destination, callData, value}` entry of a batched operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

impl Call {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub fn value_transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            data: Bytes::default(),
            value,
        }
    }
}

/// Unsigned description of one batched on-chain action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperationRequest {
    pub calls: Vec<Call>,
    pub sender: Address,
    pub chain: Chain,
}

/// Action the operation belongs to. Selects gas floors and the default confirmation timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Deploy,
    Mint,
    Transfer,
    Record,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Deploy => "deploy",
            ActionKind::Mint => "mint",
            ActionKind::Transfer => "transfer",
            ActionKind::Record => "record",
        })
    }
}

/// Gas values returned by `eth_estimateUserOperationGas`. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEnvelope {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

/// An operation the bundler has accepted, awaiting confirmation.
#[derive(Debug, Clone)]
pub struct SubmittedOperation {
    pub hash: H256,
    pub signature: Bytes,
    pub envelope: GasEnvelope,
    pub request: UserOperationRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl From<ethers::types::Log> for RawLog {
    fn from(log: ethers::types::Log) -> Self {
        Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: H256,
    pub status: ReceiptStatus,
    pub logs: Vec<RawLog>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        let status = if receipt.status == Some(1u64.into()) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failure
        };
        Self {
            transaction_hash: receipt.transaction_hash,
            status,
            logs: receipt.logs.into_iter().map(RawLog::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferred {
    pub caller: Address,
    pub token_address: Address,
    pub to: Address,
    pub amount: U256,
    pub timestamp: U256,
}

/// Fact extracted from a receipt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    TokenCreated { token_address: Address },
    TokenTransferred(TokenTransferred),
    Unrecognized,
}

/// Static layout of the single event the caller is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    /// `TokenCreated(address indexed token, ...)`
    Creation,
    /// `TokenTransferred(address indexed caller, address indexed token, address indexed to, uint256 amount, uint256 timestamp)`
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredToken {
    pub name: String,
    pub symbol: String,
    pub address: Address,
    pub chain_id: u64,
    pub owner_smart_account: Address,
    /// Supply as entered when the token was deployed. Minting is a separate action.
    pub supply: String,
    pub deploy_tx_hash: Option<H256>,
    pub created_at: DateTime<Utc>,
    pub last_known_balance: U256,
}

/// The two networks this service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum Chain {
    MonadTestnet,
    Sepolia,
}

impl Chain {
    pub fn id(&self) -> u64 {
        match self {
            Chain::MonadTestnet => 10143,
            Chain::Sepolia => 11155111,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::MonadTestnet => "MON",
            Chain::Sepolia => "ETH",
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            Chain::MonadTestnet => "https://testnet.monadexplorer.com",
            Chain::Sepolia => "https://sepolia.etherscan.io",
        }
    }

    pub fn tx_url(&self, hash: H256) -> String {
        format!("{}/tx/{:?}", self.explorer_url(), hash)
    }
}

impl TryFrom<u64> for Chain {
    type Error = String;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        match id {
            10143 => Ok(Chain::MonadTestnet),
            11155111 => Ok(Chain::Sepolia),
            other => Err(format!("unsupported chain id {other}; expected 10143 or 11155111")),
        }
    }
}

impl From<Chain> for u64 {
    fn from(chain: Chain) -> Self {
        chain.id()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::MonadTestnet => f.write_str("Monad Testnet"),
            Chain::Sepolia => f.write_str("Sepolia"),
        }
    }
}
