// src/error.rs
use std::time::Duration;

use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundlerError {
    #[error("Bundler transport error: {0}")]
    Transport(String),

    #[error("Bundler rejected operation ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Timed out after {0:?} waiting for user operation receipt")]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signer declined: {0}")]
    Declined(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Invalid user operation request: {0}")]
    InvalidRequest(String),

    #[error("Gas estimation failed: {0}")]
    Estimation(String),

    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Bundler rejected user operation: {0}")]
    SubmissionRejected(String),

    #[error("User operation {hash:?} not confirmed; bundler timed out and no transaction was found on chain")]
    ConfirmationTimeout { hash: H256 },

    #[error("Transaction {tx_hash:?} reverted")]
    Reverted { tx_hash: H256 },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Could not decode {0} from transaction logs")]
    Decoding(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Chain query failed: {0}")]
    Chain(#[from] BundlerError),
}

impl OrchestratorError {
    /// JSON-RPC error code reported for this failure.
    pub fn rpc_code(&self) -> i32 {
        match self {
            OrchestratorError::Validation(_) => -32602,
            OrchestratorError::Submission(_) => -32000,
            OrchestratorError::Decoding(_) => -32001,
            OrchestratorError::Registry(_) => -32002,
            OrchestratorError::Chain(_) => -32003,
        }
    }
}
