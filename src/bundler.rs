// src/bundler.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::AbiDecode;
use ethers::prelude::*;
use ethers::providers::RpcError;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::dummy_signature;
use crate::contracts;
use crate::error::BundlerError;
use crate::types::{GasEstimate, RawLog, Receipt, ReceiptStatus, UserOperation, UserOperationRequest};

/// Interval between `eth_getUserOperationReceipt` polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Unsigned operation with the bundler's raw gas estimate.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub user_op: UserOperation,
    pub estimate: GasEstimate,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    async fn prepare_user_operation(
        &self,
        request: &UserOperationRequest,
    ) -> Result<PreparedOperation, BundlerError>;

    async fn send_user_operation(&self, user_op: &UserOperation) -> Result<H256, BundlerError>;

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<Receipt>, BundlerError>;

    /// Poll for the receipt until it shows up or `timeout` elapses.
    async fn wait_for_user_operation_receipt(
        &self,
        hash: H256,
        timeout: Duration,
    ) -> Result<Receipt, BundlerError> {
        let poll = async {
            loop {
                match self.get_user_operation_receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!(hash = ?hash, "user operation receipt not yet available"),
                    Err(e) => warn!(hash = ?hash, error = %e, "receipt poll failed"),
                }
                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| BundlerError::Timeout(timeout))
    }
}

/// Direct chain access, used for the confirmation fallback and balance reads.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, BundlerError>;

    async fn native_balance(&self, account: Address) -> Result<U256, BundlerError>;

    async fn token_balance(&self, token: Address, account: Address) -> Result<U256, BundlerError>;
}

#[async_trait]
impl ChainReader for Provider<Http> {
    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, BundlerError> {
        Middleware::get_transaction_receipt(self, hash)
            .await
            .map(|receipt| receipt.map(Receipt::from))
            .map_err(transport)
    }

    async fn native_balance(&self, account: Address) -> Result<U256, BundlerError> {
        self.get_balance(account, None).await.map_err(transport)
    }

    async fn token_balance(&self, token: Address, account: Address) -> Result<U256, BundlerError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(token)
            .data(contracts::balance_of(account))
            .into();
        let output = self.call(&tx, None).await.map_err(transport)?;
        <U256 as AbiDecode>::decode(&output).map_err(|e| BundlerError::Transport(e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserOperationReceipt {
    success: bool,
    #[serde(default)]
    logs: Vec<Log>,
    receipt: TransactionReceipt,
}

impl From<UserOperationReceipt> for Receipt {
    fn from(r: UserOperationReceipt) -> Self {
        Receipt {
            transaction_hash: r.receipt.transaction_hash,
            status: if r.success {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Failure
            },
            logs: r.logs.into_iter().map(RawLog::from).collect(),
        }
    }
}

/// ERC-4337 bundler reached over JSON-RPC, with the chain RPC used to fill in
/// nonce and fee fields while preparing operations.
pub struct HttpBundler {
    bundler: Provider<Http>,
    chain: Arc<Provider<Http>>,
    entry_point: Address,
}

impl HttpBundler {
    pub fn new(bundler_url: &str, chain: Arc<Provider<Http>>, entry_point: Address) -> anyhow::Result<Self> {
        let bundler = Provider::<Http>::try_from(bundler_url)?;
        Ok(Self {
            bundler,
            chain,
            entry_point,
        })
    }

    async fn nonce(&self, sender: Address) -> Result<U256, BundlerError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.entry_point)
            .data(contracts::get_nonce(sender))
            .into();
        let output = self.chain.call(&tx, None).await.map_err(transport)?;
        <U256 as AbiDecode>::decode(&output).map_err(|e| BundlerError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Bundler for HttpBundler {
    async fn prepare_user_operation(
        &self,
        request: &UserOperationRequest,
    ) -> Result<PreparedOperation, BundlerError> {
        let nonce = self.nonce(request.sender).await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .chain
            .estimate_eip1559_fees(None)
            .await
            .map_err(transport)?;

        let user_op = UserOperation {
            sender: request.sender,
            nonce,
            call_data: contracts::account_call_data(&request.calls),
            max_fee_per_gas,
            max_priority_fee_per_gas,
            signature: dummy_signature(),
            ..Default::default()
        };

        let estimate: GasEstimate = self
            .bundler
            .request("eth_estimateUserOperationGas", (&user_op, self.entry_point))
            .await
            .map_err(rejected_or_transport)?;
        debug!(sender = ?request.sender, ?estimate, "bundler gas estimate");

        Ok(PreparedOperation { user_op, estimate })
    }

    async fn send_user_operation(&self, user_op: &UserOperation) -> Result<H256, BundlerError> {
        self.bundler
            .request("eth_sendUserOperation", (user_op, self.entry_point))
            .await
            .map_err(rejected_or_transport)
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<Receipt>, BundlerError> {
        let receipt: Option<UserOperationReceipt> = self
            .bundler
            .request("eth_getUserOperationReceipt", [hash])
            .await
            .map_err(transport)?;
        Ok(receipt.map(Receipt::from))
    }
}

fn transport(e: ProviderError) -> BundlerError {
    BundlerError::Transport(e.to_string())
}

fn rejected_or_transport(e: ProviderError) -> BundlerError {
    match RpcError::as_error_response(&e) {
        Some(err) => BundlerError::Rejected {
            code: err.code,
            message: err.message.clone(),
        },
        None => transport(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError};
    use std::sync::Mutex;

    struct SlowBundler {
        polls: Mutex<u32>,
        ready_after: u32,
    }

    #[async_trait]
    impl Bundler for SlowBundler {
        async fn prepare_user_operation(
            &self,
            _request: &UserOperationRequest,
        ) -> Result<PreparedOperation, BundlerError> {
            unimplemented!()
        }

        async fn send_user_operation(&self, _user_op: &UserOperation) -> Result<H256, BundlerError> {
            unimplemented!()
        }

        async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<Receipt>, BundlerError> {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            if *polls == 1 {
                return Err(BundlerError::Transport("connection reset".into()));
            }
            Ok((*polls >= self.ready_after).then(|| Receipt {
                transaction_hash: hash,
                status: ReceiptStatus::Success,
                logs: vec![],
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_survives_transient_errors() {
        let bundler = SlowBundler {
            polls: Mutex::new(0),
            ready_after: 4,
        };
        let receipt = bundler
            .wait_for_user_operation_receipt(H256::repeat_byte(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(receipt.transaction_hash, H256::repeat_byte(1));
        assert_eq!(*bundler.polls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_is_bounded_by_timeout() {
        let bundler = SlowBundler {
            polls: Mutex::new(0),
            ready_after: u32::MAX,
        };
        let err = bundler
            .wait_for_user_operation_receipt(H256::zero(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert_eq!(err, BundlerError::Timeout(Duration::from_secs(30)));
    }

    #[test]
    fn json_rpc_errors_become_rejections() {
        let err = ProviderError::from(HttpClientError::JsonRpcError(JsonRpcError {
            code: -32500,
            message: "AA21 didn't pay prefund".to_string(),
            data: None,
        }));
        assert_eq!(
            rejected_or_transport(err),
            BundlerError::Rejected {
                code: -32500,
                message: "AA21 didn't pay prefund".to_string(),
            }
        );

        let err = ProviderError::CustomError("connection refused".to_string());
        assert!(matches!(rejected_or_transport(err), BundlerError::Transport(_)));
    }

    #[test]
    fn user_operation_receipt_uses_op_scoped_logs_and_success_flag() {
        let json = serde_json::json!({
            "userOpHash": format!("{:?}", H256::repeat_byte(2)),
            "success": false,
            "logs": [{
                "address": "0xbae9f76833aaaafb2833ad258b75909601a35c80",
                "topics": [format!("{:?}", H256::repeat_byte(3))],
                "data": "0x"
            }],
            "receipt": {
                "transactionHash": format!("{:?}", H256::repeat_byte(4)),
                "transactionIndex": "0x0",
                "blockHash": format!("{:?}", H256::repeat_byte(5)),
                "blockNumber": "0x10",
                "from": "0x0000000000000000000000000000000000000001",
                "to": null,
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "contractAddress": null,
                "logs": [],
                "status": "0x1",
                "logsBloom": format!("0x{}", "00".repeat(256)),
                "type": "0x2",
                "effectiveGasPrice": "0x1"
            }
        });
        let parsed: UserOperationReceipt = serde_json::from_value(json).unwrap();
        let receipt = Receipt::from(parsed);
        assert_eq!(receipt.status, ReceiptStatus::Failure);
        assert_eq!(receipt.transaction_hash, H256::repeat_byte(4));
        assert_eq!(receipt.logs.len(), 1);
    }
}
