// src/testing.rs
//! In-memory stand-ins for the bundler, chain RPC and signer.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H160, H256, U256};

use crate::account::UserOpSigner;
use crate::bundler::{Bundler, ChainReader, PreparedOperation};
use crate::error::{BundlerError, SignerError};
use crate::types::{
    Call, GasEstimate, RawLog, Receipt, ReceiptStatus, UserOperation, UserOperationRequest,
};

pub const SENDER: Address = H160([0x5a; 20]);

pub fn call(byte: u8) -> Call {
    Call::new(Address::repeat_byte(byte), vec![0xde_u8, 0xad])
}

pub fn receipt(status: ReceiptStatus, logs: Vec<RawLog>) -> Receipt {
    Receipt {
        transaction_hash: H256::repeat_byte(0xee),
        status,
        logs,
    }
}

#[derive(Default)]
pub struct MockBundler {
    estimate: GasEstimate,
    estimation_error: Mutex<Option<BundlerError>>,
    prepared: Mutex<Vec<UserOperationRequest>>,
    sent: Mutex<Vec<UserOperation>>,
    send_results: Mutex<VecDeque<Result<H256, BundlerError>>>,
    receipts: Mutex<VecDeque<Result<Receipt, BundlerError>>>,
    waited: Mutex<Vec<Duration>>,
}

impl MockBundler {
    pub fn with_estimate(call: Option<u64>, verification: Option<u64>, pre: Option<u64>) -> Self {
        Self {
            estimate: GasEstimate {
                call_gas_limit: call.map(U256::from),
                verification_gas_limit: verification.map(U256::from),
                pre_verification_gas: pre.map(U256::from),
            },
            ..Default::default()
        }
    }

    pub fn fail_estimation(&self, error: BundlerError) {
        *self.estimation_error.lock().unwrap() = Some(error);
    }

    pub fn push_send(&self, result: Result<H256, BundlerError>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn push_receipt(&self, result: Result<Receipt, BundlerError>) {
        self.receipts.lock().unwrap().push_back(result);
    }

    pub fn prepared(&self) -> Vec<UserOperationRequest> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<UserOperation> {
        self.sent.lock().unwrap().clone()
    }

    pub fn waited_timeouts(&self) -> Vec<Duration> {
        self.waited.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bundler for MockBundler {
    async fn prepare_user_operation(
        &self,
        request: &UserOperationRequest,
    ) -> Result<PreparedOperation, BundlerError> {
        self.prepared.lock().unwrap().push(request.clone());
        if let Some(e) = self.estimation_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(PreparedOperation {
            user_op: UserOperation {
                sender: request.sender,
                call_data: crate::contracts::account_call_data(&request.calls),
                ..Default::default()
            },
            estimate: self.estimate.clone(),
        })
    }

    async fn send_user_operation(&self, user_op: &UserOperation) -> Result<H256, BundlerError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(user_op.clone());
        let default_hash = H256::from_low_u64_be(sent.len() as u64);
        self.send_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(default_hash))
    }

    async fn get_user_operation_receipt(&self, _hash: H256) -> Result<Option<Receipt>, BundlerError> {
        Ok(None)
    }

    async fn wait_for_user_operation_receipt(
        &self,
        _hash: H256,
        timeout: Duration,
    ) -> Result<Receipt, BundlerError> {
        self.waited.lock().unwrap().push(timeout);
        self.receipts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(BundlerError::Timeout(timeout)))
    }
}

#[derive(Default)]
pub struct MockChain {
    receipt: Mutex<Option<Receipt>>,
    receipt_queries: Mutex<usize>,
    failing_receipts: Mutex<bool>,
    native: Mutex<U256>,
    balances: Mutex<HashMap<Address, U256>>,
    failing_balances: Mutex<bool>,
}

impl MockChain {
    pub fn set_receipt(&self, receipt: Option<Receipt>) {
        *self.receipt.lock().unwrap() = receipt;
    }

    pub fn fail_receipts(&self) {
        *self.failing_receipts.lock().unwrap() = true;
    }

    pub fn receipt_queries(&self) -> usize {
        *self.receipt_queries.lock().unwrap()
    }

    pub fn set_native_balance(&self, balance: U256) {
        *self.native.lock().unwrap() = balance;
    }

    pub fn set_token_balance(&self, token: Address, balance: U256) {
        self.balances.lock().unwrap().insert(token, balance);
    }

    pub fn fail_balances(&self) {
        *self.failing_balances.lock().unwrap() = true;
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_transaction_receipt(&self, _hash: H256) -> Result<Option<Receipt>, BundlerError> {
        *self.receipt_queries.lock().unwrap() += 1;
        if *self.failing_receipts.lock().unwrap() {
            return Err(BundlerError::Transport("eth_getTransactionReceipt failed".into()));
        }
        Ok(self.receipt.lock().unwrap().clone())
    }

    async fn native_balance(&self, _account: Address) -> Result<U256, BundlerError> {
        Ok(*self.native.lock().unwrap())
    }

    async fn token_balance(&self, token: Address, _account: Address) -> Result<U256, BundlerError> {
        if *self.failing_balances.lock().unwrap() {
            return Err(BundlerError::Transport("eth_call failed".into()));
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or_default())
    }
}

pub struct MockSigner {
    approve: bool,
}

impl MockSigner {
    pub const SIGNATURE: [u8; 4] = [0x51, 0x61, 0x6e, 0x64];

    pub fn approving() -> Self {
        Self { approve: true }
    }

    pub fn declining() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl UserOpSigner for MockSigner {
    async fn sign_user_operation(&self, _user_op: &UserOperation) -> Result<Bytes, SignerError> {
        if self.approve {
            Ok(Bytes::from(Self::SIGNATURE.to_vec()))
        } else {
            Err(SignerError::Declined("user rejected the request".into()))
        }
    }
}
