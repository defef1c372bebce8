use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use exec_core::{
    BlockTag, ChainReader, ChainWriter, ConfirmStatus, ErrorKind, ExecError, HashExtraction,
    NonceSafeSubmitter, SendError, SubmitConfig, SubmitStatus, TxParams,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SENDER: Address = Address::repeat_byte(0xaa);

/// Scripted chain state for one account.
struct MockChain {
    confirmed: AtomicU64,
    pending: AtomicU64,
    latest_reads: AtomicUsize,
    pending_reads: AtomicUsize,
    /// Confirmed count catches up with pending on this latest-read
    settle_at_read: Option<usize>,
    /// Pending count grows by one on this pending-read
    bump_pending_at_read: Option<usize>,
    receipts: Mutex<VecDeque<Option<bool>>>,
}

impl MockChain {
    fn new(confirmed: u64, pending: u64) -> Self {
        Self {
            confirmed: AtomicU64::new(confirmed),
            pending: AtomicU64::new(pending),
            latest_reads: AtomicUsize::new(0),
            pending_reads: AtomicUsize::new(0),
            settle_at_read: None,
            bump_pending_at_read: None,
            receipts: Mutex::new(VecDeque::new()),
        }
    }

    fn settling_at(mut self, read: usize) -> Self {
        self.settle_at_read = Some(read);
        self
    }

    fn bumping_pending_at(mut self, read: usize) -> Self {
        self.bump_pending_at_read = Some(read);
        self
    }

    fn with_receipts(self, receipts: &[Option<bool>]) -> Self {
        *self.receipts.lock().unwrap() = receipts.iter().copied().collect();
        self
    }
}

#[async_trait]
impl ChainReader for MockChain {
    fn endpoint(&self) -> &str {
        "mock://chain"
    }

    async fn transaction_count(&self, _address: Address, tag: BlockTag) -> anyhow::Result<u64> {
        match tag {
            BlockTag::Latest => {
                let n = self.latest_reads.fetch_add(1, Ordering::SeqCst) + 1;
                if self.settle_at_read.is_some_and(|at| n >= at) {
                    self.confirmed
                        .store(self.pending.load(Ordering::SeqCst), Ordering::SeqCst);
                }
                Ok(self.confirmed.load(Ordering::SeqCst))
            }
            BlockTag::Pending => {
                let n = self.pending_reads.fetch_add(1, Ordering::SeqCst) + 1;
                if self.bump_pending_at_read == Some(n) {
                    self.pending.fetch_add(1, Ordering::SeqCst);
                }
                Ok(self.pending.load(Ordering::SeqCst))
            }
        }
    }

    async fn balance(&self, _address: Address) -> anyhow::Result<U256> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn estimate_gas(&self, _from: Address, _tx: &TxParams) -> anyhow::Result<u64> {
        Ok(21_000)
    }

    async fn receipt_status(&self, _hash: B256) -> anyhow::Result<Option<bool>> {
        Ok(self.receipts.lock().unwrap().pop_front().unwrap_or(None))
    }
}

/// Replays scripted send results and records the nonces it was given.
struct MockWriter {
    results: Mutex<VecDeque<Result<B256, SendError>>>,
    fallback: Result<B256, SendError>,
    nonces: Mutex<Vec<u64>>,
}

impl MockWriter {
    fn new(results: Vec<Result<B256, SendError>>, fallback: Result<B256, SendError>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            fallback,
            nonces: Mutex::new(Vec::new()),
        }
    }

    fn always(result: Result<B256, SendError>) -> Self {
        Self::new(Vec::new(), result)
    }

    fn calls(&self) -> usize {
        self.nonces.lock().unwrap().len()
    }

    fn nonces(&self) -> Vec<u64> {
        self.nonces.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainWriter for MockWriter {
    fn sender(&self) -> Address {
        SENDER
    }

    async fn send_transaction(&self, _tx: &TxParams, nonce: u64) -> Result<B256, SendError> {
        self.nonces.lock().unwrap().push(nonce);
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

fn tx_hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

fn tx() -> TxParams {
    TxParams {
        to: Address::repeat_byte(0x01),
        data: vec![0xa9, 0x05, 0x9c, 0xbb].into(),
        value: U256::ZERO,
        gas_limit: Some(100_000),
    }
}

fn submitter(policy: SubmitConfig) -> NonceSafeSubmitter {
    NonceSafeSubmitter::new(policy, CancellationToken::new())
}

#[tokio::test]
async fn test_safety_in_sync() {
    let chain = MockChain::new(5, 5);
    let state = submitter(SubmitConfig::default())
        .check_safety(&chain, SENDER)
        .await
        .unwrap();

    assert!(state.can_proceed());
    assert_eq!(state.recommended_nonce, 5);
    assert!(state.warnings.is_empty());
}

#[tokio::test]
async fn test_safety_with_transactions_in_flight() {
    let chain = MockChain::new(5, 7);
    let state = submitter(SubmitConfig::default())
        .check_safety(&chain, SENDER)
        .await
        .unwrap();

    assert!(!state.can_proceed());
    assert_eq!(state.confirmed_nonce, 5);
    assert_eq!(state.pending_nonce, 7);
    assert_eq!(state.warnings.len(), 2);
}

#[tokio::test]
async fn test_submit_sends_with_pending_nonce() {
    let chain = MockChain::new(5, 5);
    let writer = MockWriter::always(Ok(tx_hash(0x11)));

    let outcome = submitter(SubmitConfig::immediate(3))
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, SubmitStatus::Sent);
    assert_eq!(outcome.hash, Some(tx_hash(0x11)));
    assert_eq!(outcome.nonce, Some(5));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(writer.nonces(), vec![5]);
}

#[tokio::test]
async fn test_hash_recovered_from_error_is_not_retried() {
    let chain = MockChain::new(3, 3);
    let hash = format!("0x{}", "5e".repeat(32));
    let writer = MockWriter::always(Err(SendError::new("failed to decode response")
        .with_payload(json!({ "data": { "hash": hash } }))));

    let outcome = submitter(SubmitConfig::immediate(3))
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert!(outcome.is_recovered());
    assert_eq!(
        outcome.status,
        SubmitStatus::RecoveredFromError(HashExtraction::NestedData)
    );
    assert_eq!(outcome.hash, Some(tx_hash(0x5e)));
    assert!(outcome.error.is_none());
    assert_eq!(writer.calls(), 1);
}

#[tokio::test]
async fn test_already_known_recovers_hash_instead_of_cooling_down() {
    let chain = MockChain::new(4, 4);
    let hash = format!("0x{}", "ab".repeat(32));
    let writer = MockWriter::always(Err(
        SendError::new(format!("already known: {}", hash)).with_payload(json!({ "code": -32000 }))
    ));

    let outcome = submitter(SubmitConfig::immediate(3))
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert_eq!(
        outcome.status,
        SubmitStatus::RecoveredFromError(HashExtraction::MessagePattern)
    );
    assert_eq!(outcome.hash, Some(tx_hash(0xab)));
    assert_eq!(writer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nonce_conflict_cools_down_and_retries() {
    let chain = MockChain::new(8, 8);
    let writer = MockWriter::new(
        vec![Err(SendError::new("nonce too low: next nonce 9, tx nonce 8"))],
        Ok(tx_hash(0x22)),
    );
    let start = Instant::now();

    let outcome = submitter(SubmitConfig::default())
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(writer.calls(), 2);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_nonce_conflict_exhausts_attempts() {
    let chain = MockChain::new(1, 1);
    let writer = MockWriter::always(Err(SendError::new("replacement transaction underpriced")));

    let outcome = submitter(SubmitConfig::immediate(3))
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(!outcome.success);
    assert_eq!(writer.calls(), 3);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind(), ErrorKind::NonceConflict);
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_error_uses_failure_cooldown() {
    let chain = MockChain::new(1, 1);
    let writer = MockWriter::always(Err(SendError::new(
        "insufficient funds for gas * price + value",
    )));
    let start = Instant::now();

    let outcome = submitter(SubmitConfig::default())
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(writer.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    match outcome.error {
        Some(ExecError::Send { message }) => assert!(message.contains("insufficient funds")),
        other => panic!("expected Send error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_pending_before_sending() {
    // Check reads latest once, the first poll reads it again and sees it settle
    let chain = MockChain::new(5, 6).settling_at(2);
    let writer = MockWriter::always(Ok(tx_hash(0x33)));
    let start = Instant::now();

    let outcome = submitter(SubmitConfig::default())
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert_eq!(writer.nonces(), vec![6]);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_pending_timeout_abandons_attempt() {
    let chain = MockChain::new(5, 7);
    let writer = MockWriter::always(Ok(tx_hash(0x44)));
    let policy = SubmitConfig {
        max_retries: 1,
        ..SubmitConfig::default()
    };

    let outcome = submitter(policy).submit(&chain, &writer, SENDER, &tx()).await;

    assert!(!outcome.success);
    assert_eq!(writer.calls(), 0);
    match outcome.error {
        Some(ExecError::PendingTimeout {
            confirmed, pending, ..
        }) => {
            assert_eq!(confirmed, 5);
            assert_eq!(pending, 7);
        }
        other => panic!("expected PendingTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fresh_pending_nonce_wins_at_send() {
    // Safety check sees 5/5, the pre-send read sees another tx landed in the pool
    let chain = MockChain::new(5, 5).bumping_pending_at(2);
    let writer = MockWriter::always(Ok(tx_hash(0x55)));

    let outcome = submitter(SubmitConfig::immediate(1))
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.nonce, Some(6));
    assert_eq!(writer.nonces(), vec![6]);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_polls_until_receipt() {
    let chain = MockChain::new(0, 0).with_receipts(&[None, None, Some(true)]);
    let start = Instant::now();

    let status = submitter(SubmitConfig::default())
        .confirm(&chain, tx_hash(0x66))
        .await
        .unwrap();

    assert_eq!(status, ConfirmStatus::Success);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test]
async fn test_confirm_reports_revert() {
    let chain = MockChain::new(0, 0).with_receipts(&[Some(false)]);

    let status = submitter(SubmitConfig::immediate(1))
        .confirm(&chain, tx_hash(0x77))
        .await
        .unwrap();

    assert_eq!(status, ConfirmStatus::Reverted);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_times_out() {
    let chain = MockChain::new(0, 0);
    let policy = SubmitConfig {
        receipt_timeout_ms: 10_000,
        ..SubmitConfig::default()
    };

    let err = submitter(policy)
        .confirm(&chain, tx_hash(0x88))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::ReceiptTimeout { .. }));
}

#[tokio::test]
async fn test_submit_and_confirm_revert_is_distinct_failure() {
    let chain = MockChain::new(2, 2).with_receipts(&[Some(false)]);
    let writer = MockWriter::always(Ok(tx_hash(0x99)));

    let outcome = submitter(SubmitConfig::immediate(3))
        .submit_and_confirm(&chain, &writer, SENDER, &tx())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.hash, Some(tx_hash(0x99)));
    assert_eq!(outcome.receipt, Some(ConfirmStatus::Reverted));
    assert_eq!(writer.calls(), 1);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind(), ErrorKind::ExecutionReverted);
}

#[tokio::test]
async fn test_cancelled_submitter_does_not_send_when_in_sync() {
    let chain = MockChain::new(5, 5);
    let writer = MockWriter::always(Ok(tx_hash(0x13)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = NonceSafeSubmitter::new(SubmitConfig::default(), cancel)
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(!outcome.success);
    assert!(outcome.hash.is_none());
    assert!(matches!(outcome.error, Some(ExecError::Cancelled)));
    assert_eq!(writer.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_submitter_stops() {
    let chain = MockChain::new(1, 2);
    let writer = MockWriter::always(Ok(tx_hash(0x12)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = NonceSafeSubmitter::new(SubmitConfig::default(), cancel)
        .submit(&chain, &writer, SENDER, &tx())
        .await;

    assert!(!outcome.success);
    assert!(matches!(outcome.error, Some(ExecError::Cancelled)));
    assert_eq!(writer.calls(), 0);
}
