// src/submitter.rs
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::H256;
use tracing::{debug, info, warn};

use crate::account::UserOpSigner;
use crate::bundler::{Bundler, ChainReader};
use crate::error::SubmissionError;
use crate::gas;
use crate::types::{
    ActionKind, Call, Chain, Receipt, ReceiptStatus, SubmittedOperation, UserOperationRequest,
};

/// Wait before asking the chain directly once the bundler stops answering.
pub const CONFIRMATION_GRACE: Duration = Duration::from_secs(15);

/// Default confirmation timeout for each kind of operation.
pub fn default_timeout(kind: ActionKind) -> Duration {
    match kind {
        ActionKind::Deploy | ActionKind::Transfer => Duration::from_secs(60),
        ActionKind::Mint => Duration::from_secs(120),
        ActionKind::Record => Duration::from_secs(30),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Building,
    GasAdjusted,
    Signed,
    Submitted,
    ConfirmationFallback,
    Confirmed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives one user operation from call list to confirmed receipt.
///
/// Holds no per-operation state, so one instance can serve concurrent actions.
#[derive(Clone)]
pub struct OperationSubmitter {
    bundler: Arc<dyn Bundler>,
    chain_reader: Arc<dyn ChainReader>,
    signer: Arc<dyn UserOpSigner>,
    sender: ethers::types::Address,
    chain: Chain,
    grace: Duration,
}

impl OperationSubmitter {
    pub fn new(
        bundler: Arc<dyn Bundler>,
        chain_reader: Arc<dyn ChainReader>,
        signer: Arc<dyn UserOpSigner>,
        sender: ethers::types::Address,
        chain: Chain,
    ) -> Self {
        Self {
            bundler,
            chain_reader,
            signer,
            sender,
            chain,
            grace: CONFIRMATION_GRACE,
        }
    }

    pub fn sender(&self) -> ethers::types::Address {
        self.sender
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Build, price, sign, send and confirm one operation.
    ///
    /// Bundler rejections are returned as-is; nothing here retries.
    pub async fn submit(
        &self,
        calls: Vec<Call>,
        kind: ActionKind,
        timeout_override: Option<Duration>,
    ) -> Result<Receipt, SubmissionError> {
        let result = self.run(calls, kind, timeout_override).await;
        if let Err(e) = &result {
            debug!(kind = %kind, stage = %Stage::Failed, error = %e, "user operation failed");
        }
        result
    }

    async fn run(
        &self,
        calls: Vec<Call>,
        kind: ActionKind,
        timeout_override: Option<Duration>,
    ) -> Result<Receipt, SubmissionError> {
        let request = self.build(calls)?;
        debug!(kind = %kind, stage = %Stage::Building, calls = request.calls.len(), "building user operation");

        let prepared = self
            .bundler
            .prepare_user_operation(&request)
            .await
            .map_err(|e| SubmissionError::Estimation(e.to_string()))?;
        let envelope = gas::adjust(&prepared.estimate, kind);
        debug!(kind = %kind, stage = %Stage::GasAdjusted, ?envelope, "gas limits adjusted");

        let mut user_op = prepared.user_op.with_envelope(&envelope);
        let signature = self
            .signer
            .sign_user_operation(&user_op)
            .await
            .map_err(|e| SubmissionError::SigningRejected(e.to_string()))?;
        user_op.signature = signature.clone();
        debug!(kind = %kind, stage = %Stage::Signed, "user operation signed");

        let hash = self
            .bundler
            .send_user_operation(&user_op)
            .await
            .map_err(|e| SubmissionError::SubmissionRejected(e.to_string()))?;
        let submitted = SubmittedOperation {
            hash,
            signature,
            envelope,
            request,
        };
        info!(kind = %kind, stage = %Stage::Submitted, hash = ?hash, "user operation sent to bundler");

        let timeout = timeout_override.unwrap_or_else(|| default_timeout(kind));
        let receipt = self.confirm(&submitted, timeout).await?;
        info!(
            kind = %kind,
            stage = %Stage::Confirmed,
            hash = ?hash,
            tx = %self.chain.tx_url(receipt.transaction_hash),
            status = ?receipt.status,
            "user operation confirmed"
        );
        Ok(receipt)
    }

    fn build(&self, calls: Vec<Call>) -> Result<UserOperationRequest, SubmissionError> {
        if calls.is_empty() {
            return Err(SubmissionError::InvalidRequest("call list is empty".to_string()));
        }
        if let Some(call) = calls.iter().find(|c| c.to.is_zero()) {
            return Err(SubmissionError::InvalidRequest(format!(
                "destination {:?} is not a valid address",
                call.to
            )));
        }
        Ok(UserOperationRequest {
            calls,
            sender: self.sender,
            chain: self.chain,
        })
    }

    async fn confirm(
        &self,
        submitted: &SubmittedOperation,
        timeout: Duration,
    ) -> Result<Receipt, SubmissionError> {
        match self
            .bundler
            .wait_for_user_operation_receipt(submitted.hash, timeout)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                warn!(hash = ?submitted.hash, error = %e, stage = %Stage::ConfirmationFallback, "bundler confirmation stalled, falling back to chain");
                self.fallback(submitted.hash).await
            }
        }
    }

    // The found transaction's status is not checked: a receipt on chain is
    // reported as success even if it reverted.
    async fn fallback(&self, hash: H256) -> Result<Receipt, SubmissionError> {
        tokio::time::sleep(self.grace).await;

        match self.chain_reader.get_transaction_receipt(hash).await {
            Ok(Some(found)) => Ok(Receipt {
                status: ReceiptStatus::Success,
                ..found
            }),
            Ok(None) => Err(SubmissionError::ConfirmationTimeout { hash }),
            Err(e) => {
                warn!(hash = ?hash, error = %e, "chain receipt lookup failed");
                Err(SubmissionError::ConfirmationTimeout { hash })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BundlerError;
    use crate::testing::{call, receipt, MockBundler, MockChain, MockSigner, SENDER};
    use ethers::types::U256;

    fn submitter(bundler: &Arc<MockBundler>, chain: &Arc<MockChain>, signer: MockSigner) -> OperationSubmitter {
        OperationSubmitter::new(
            bundler.clone(),
            chain.clone(),
            Arc::new(signer),
            SENDER,
            Chain::MonadTestnet,
        )
    }

    #[tokio::test]
    async fn confirms_through_bundler() {
        let bundler = Arc::new(MockBundler::default());
        bundler.push_receipt(Ok(receipt(ReceiptStatus::Success, vec![])));
        let chain = Arc::new(MockChain::default());

        let r = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Deploy, None)
            .await
            .unwrap();

        assert!(r.is_success());
        let sent = bundler.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signature.to_vec(), MockSigner::SIGNATURE.to_vec());
        assert_eq!(bundler.waited_timeouts(), vec![Duration::from_secs(60)]);
        assert_eq!(chain.receipt_queries(), 0);
    }

    #[tokio::test]
    async fn sends_gas_adjusted_operation() {
        let bundler = Arc::new(MockBundler::with_estimate(Some(100_000), None, Some(50_000)));
        bundler.push_receipt(Ok(receipt(ReceiptStatus::Success, vec![])));
        let chain = Arc::new(MockChain::default());

        submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Record, None)
            .await
            .unwrap();

        let op = &bundler.sent()[0];
        assert_eq!(op.call_gas_limit, U256::from(130_000u64));
        assert_eq!(op.verification_gas_limit, U256::from(1_000_000u64));
        assert_eq!(op.pre_verification_gas, U256::from(65_000u64));
        assert_eq!(bundler.waited_timeouts(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn empty_call_list_is_rejected_before_network() {
        let bundler = Arc::new(MockBundler::default());
        let chain = Arc::new(MockChain::default());
        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![], ActionKind::Transfer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidRequest(_)));
        assert!(bundler.prepared().is_empty());
    }

    #[tokio::test]
    async fn zero_destination_is_rejected() {
        let bundler = Arc::new(MockBundler::default());
        let chain = Arc::new(MockChain::default());
        let bad = Call::new(ethers::types::Address::zero(), Vec::<u8>::new());
        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1), bad], ActionKind::Transfer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidRequest(_)));
        assert!(bundler.prepared().is_empty());
    }

    #[tokio::test]
    async fn declined_signature_never_reaches_bundler() {
        let bundler = Arc::new(MockBundler::default());
        let chain = Arc::new(MockChain::default());
        let err = submitter(&bundler, &chain, MockSigner::declining())
            .submit(vec![call(1)], ActionKind::Mint, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::SigningRejected(_)));
        assert!(bundler.sent().is_empty());
    }

    #[tokio::test]
    async fn bundler_rejection_is_not_retried() {
        let bundler = Arc::new(MockBundler::default());
        bundler.push_send(Err(BundlerError::Rejected {
            code: -32602,
            message: "AA21 didn't pay prefund".into(),
        }));
        let chain = Arc::new(MockChain::default());
        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Mint, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::SubmissionRejected(ref m) if m.contains("AA21")));
        assert_eq!(bundler.sent().len(), 1);
        assert!(bundler.waited_timeouts().is_empty());
    }

    #[tokio::test]
    async fn estimation_failure_is_reported() {
        let bundler = Arc::new(MockBundler::default());
        bundler.fail_estimation(BundlerError::Transport("bundler down".into()));
        let chain = Arc::new(MockChain::default());
        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Deploy, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Estimation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_forces_success_for_found_transaction() {
        let bundler = Arc::new(MockBundler::default());
        bundler.push_receipt(Err(BundlerError::Timeout(Duration::from_secs(120))));
        let chain = Arc::new(MockChain::default());
        chain.set_receipt(Some(receipt(ReceiptStatus::Failure, vec![])));

        let started = tokio::time::Instant::now();
        let r = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Mint, None)
            .await
            .unwrap();

        // Reverted on chain, yet reported as success.
        assert_eq!(r.status, ReceiptStatus::Success);
        assert!(started.elapsed() >= CONFIRMATION_GRACE);
        assert_eq!(chain.receipt_queries(), 1);
        assert_eq!(bundler.waited_timeouts(), vec![Duration::from_secs(120)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_without_transaction_times_out() {
        let bundler = Arc::new(MockBundler::default());
        bundler.push_receipt(Err(BundlerError::Timeout(Duration::from_secs(5))));
        let chain = Arc::new(MockChain::default());

        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Deploy, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::ConfirmationTimeout { .. }));
        assert_eq!(chain.receipt_queries(), 1);
        assert_eq!(bundler.waited_timeouts(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_lookup_error_times_out() {
        let bundler = Arc::new(MockBundler::default());
        let chain = Arc::new(MockChain::default());
        chain.fail_receipts();
        chain.set_receipt(Some(receipt(ReceiptStatus::Success, vec![])));

        let err = submitter(&bundler, &chain, MockSigner::approving())
            .submit(vec![call(1)], ActionKind::Transfer, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::ConfirmationTimeout { hash } if hash == H256::from_low_u64_be(1)
        ));
        assert_eq!(chain.receipt_queries(), 1);
    }

    #[test]
    fn default_timeouts_per_kind() {
        assert_eq!(default_timeout(ActionKind::Deploy), Duration::from_secs(60));
        assert_eq!(default_timeout(ActionKind::Transfer), Duration::from_secs(60));
        assert_eq!(default_timeout(ActionKind::Mint), Duration::from_secs(120));
        assert_eq!(default_timeout(ActionKind::Record), Duration::from_secs(30));
    }
}
