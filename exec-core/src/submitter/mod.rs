//! Nonce-Safe Submitter
//!
//! Each submission attempt runs `CHECK_SAFETY -> (WAIT_PENDING)? -> SEND`:
//!
//! - **check**: compare the confirmed and pending transaction counts of the
//!   sender. Only an account with nothing in flight may send.
//! - **wait**: poll until both counts converge or the wait ceiling passes.
//!   A timed-out wait abandons the attempt instead of sending a stale nonce.
//! - **send**: re-read the pending count, then dispatch with that explicit
//!   nonce. Nonce rejections cool down and restart from the check; other
//!   errors first go through [`recovery`] so an already broadcast
//!   transaction is never resent.
//!
//! Confirmation is a separate step ([`NonceSafeSubmitter::confirm`]) so a
//! reverted transaction stays distinguishable from a failed submission.

pub mod recovery;

use crate::config::SubmitConfig;
use crate::error::{ExecError, NetworkError};
use crate::traits::{BlockTag, ChainReader, ChainWriter, TxParams};
use crate::utils::sleep_or_cancel;
use alloy::primitives::{Address, B256};
use anyhow::Result;
use recovery::{is_nonce_conflict, recover_tx_hash, HashExtraction};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of an account's nonce counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSafetyState {
    pub confirmed_nonce: u64,
    pub pending_nonce: u64,
    pub recommended_nonce: u64,
    pub warnings: Vec<String>,
}

impl TransactionSafetyState {
    pub fn from_counts(confirmed: u64, pending: u64) -> Self {
        let mut warnings = Vec::new();

        if pending > confirmed {
            warnings.push(format!(
                "{} pending transaction(s) in flight (confirmed={}, pending={})",
                pending - confirmed,
                confirmed,
                pending
            ));
        } else if confirmed > pending {
            warnings.push(format!(
                "Confirmed count {} is ahead of pending count {}, endpoint may be out of sync",
                confirmed, pending
            ));
        }

        if confirmed != pending {
            warnings.push("Cannot proceed until pending transactions confirm".to_string());
        }

        Self {
            confirmed_nonce: confirmed,
            pending_nonce: pending,
            recommended_nonce: pending,
            warnings,
        }
    }

    pub fn can_proceed(&self) -> bool {
        self.confirmed_nonce == self.pending_nonce
    }

    pub fn in_flight(&self) -> u64 {
        self.pending_nonce.saturating_sub(self.confirmed_nonce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// The node accepted the transaction.
    Sent,
    /// The send call raised but the error carried the transaction hash.
    RecoveredFromError(HashExtraction),
    Failed,
}

/// On-chain result of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStatus {
    Success,
    Reverted,
}

/// Result of [`NonceSafeSubmitter::submit`]. Failures are reported here
/// rather than raised so callers can map them to success, skip or failure.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub hash: Option<B256>,
    pub success: bool,
    pub status: SubmitStatus,
    pub nonce: Option<u64>,
    pub attempts: u32,
    pub receipt: Option<ConfirmStatus>,
    pub error: Option<ExecError>,
}

impl SubmitOutcome {
    fn broadcast(hash: B256, nonce: u64, attempts: u32, status: SubmitStatus) -> Self {
        Self {
            hash: Some(hash),
            success: true,
            status,
            nonce: Some(nonce),
            attempts,
            receipt: None,
            error: None,
        }
    }

    fn failed(attempts: u32, error: ExecError) -> Self {
        Self {
            hash: None,
            success: false,
            status: SubmitStatus::Failed,
            nonce: None,
            attempts,
            receipt: None,
            error: Some(error),
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self.status, SubmitStatus::RecoveredFromError(_))
    }
}

enum AttemptResult {
    Sent { hash: B256, nonce: u64 },
    Recovered { hash: B256, nonce: u64, via: HashExtraction },
    NonceConflict { message: String },
}

#[derive(Debug, Clone)]
pub struct NonceSafeSubmitter {
    policy: SubmitConfig,
    cancel: CancellationToken,
}

impl NonceSafeSubmitter {
    pub fn new(policy: SubmitConfig, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &SubmitConfig {
        &self.policy
    }

    /// Reads both counters for `address` from the reader's endpoint.
    pub async fn check_safety(
        &self,
        reader: &dyn ChainReader,
        address: Address,
    ) -> Result<TransactionSafetyState> {
        let (confirmed, pending) = tokio::try_join!(
            reader.transaction_count(address, BlockTag::Latest),
            reader.transaction_count(address, BlockTag::Pending),
        )?;

        Ok(TransactionSafetyState::from_counts(confirmed, pending))
    }

    /// Polls until the counters converge. Read errors inside the window are
    /// treated as "not yet converged".
    pub async fn wait_for_pending(
        &self,
        reader: &dyn ChainReader,
        address: Address,
    ) -> Result<TransactionSafetyState, ExecError> {
        let started = Instant::now();
        let ceiling = self.policy.pending_wait_ceiling();
        let mut last_seen = (0, 0);

        loop {
            sleep_or_cancel(self.policy.pending_poll_interval(), &self.cancel).await?;

            match self.check_safety(reader, address).await {
                Ok(state) if state.can_proceed() => {
                    debug!(
                        "Pending transactions for {} settled at nonce {}",
                        address, state.recommended_nonce
                    );
                    return Ok(state);
                }
                Ok(state) => {
                    debug!(
                        "Waiting on {} in-flight transaction(s) for {}",
                        state.in_flight(),
                        address
                    );
                    last_seen = (state.confirmed_nonce, state.pending_nonce);
                }
                Err(e) => debug!("Nonce poll for {} failed: {:#}", address, e),
            }

            if started.elapsed() >= ceiling {
                return Err(ExecError::PendingTimeout {
                    address,
                    waited_ms: started.elapsed().as_millis() as u64,
                    confirmed: last_seen.0,
                    pending: last_seen.1,
                });
            }
        }
    }

    /// Runs up to `max_retries` attempts. Never raises: the outcome carries
    /// either the hash or the last error.
    pub async fn submit(
        &self,
        reader: &dyn ChainReader,
        writer: &dyn ChainWriter,
        sender: Address,
        tx: &TxParams,
    ) -> SubmitOutcome {
        let max_attempts = self.policy.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let cooldown = match self.attempt(reader, writer, sender, tx).await {
                Ok(AttemptResult::Sent { hash, nonce }) => {
                    info!("SUCCESS tx {} sent with nonce {} (attempt {})", hash, nonce, attempt);
                    return SubmitOutcome::broadcast(hash, nonce, attempt, SubmitStatus::Sent);
                }
                Ok(AttemptResult::Recovered { hash, nonce, via }) => {
                    info!(
                        "SUCCESS tx {} recovered from send error ({:?}), not resending",
                        hash, via
                    );
                    return SubmitOutcome::broadcast(
                        hash,
                        nonce,
                        attempt,
                        SubmitStatus::RecoveredFromError(via),
                    );
                }
                Ok(AttemptResult::NonceConflict { message }) => {
                    debug!(
                        "Nonce conflict on attempt {}/{}: {}",
                        attempt, max_attempts, message
                    );
                    last_error = Some(ExecError::NonceConflict { message });
                    self.policy.nonce_cooldown()
                }
                Err(ExecError::Cancelled) => {
                    return SubmitOutcome::failed(attempt, ExecError::Cancelled);
                }
                Err(e) => {
                    warn!("Submit attempt {}/{} FAILED: {}", attempt, max_attempts, e);
                    last_error = Some(e);
                    self.policy.failure_cooldown()
                }
            };

            if attempt < max_attempts {
                if let Err(e) = sleep_or_cancel(cooldown, &self.cancel).await {
                    return SubmitOutcome::failed(attempt, e);
                }
            }
        }

        let error = last_error.unwrap_or(ExecError::Send {
            message: "no attempt was made".to_string(),
        });
        warn!("Submit FAILED after {} attempts: {}", max_attempts, error);
        SubmitOutcome::failed(max_attempts, error)
    }

    async fn attempt(
        &self,
        reader: &dyn ChainReader,
        writer: &dyn ChainWriter,
        sender: Address,
        tx: &TxParams,
    ) -> Result<AttemptResult, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let state = self
            .check_safety(reader, sender)
            .await
            .map_err(|e| NetworkError::InvalidResponse {
                endpoint: reader.endpoint().to_string(),
                reason: format!("{:#}", e),
            })?;

        let mut nonce = state.recommended_nonce;
        if !state.can_proceed() {
            for warning in &state.warnings {
                warn!("{}: {}", sender, warning);
            }
            nonce = self.wait_for_pending(reader, sender).await?.recommended_nonce;
        }

        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        // Another process may have sent since the check; the freshest count wins.
        match reader.transaction_count(sender, BlockTag::Pending).await {
            Ok(fresh) if fresh != nonce => {
                debug!("Pending nonce for {} moved {} -> {}", sender, nonce, fresh);
                nonce = fresh;
            }
            Ok(_) => {}
            Err(e) => debug!("Pre-send nonce read failed, keeping {}: {:#}", nonce, e),
        }

        match writer.send_transaction(tx, nonce).await {
            Ok(hash) => Ok(AttemptResult::Sent { hash, nonce }),
            Err(e) if is_nonce_conflict(&e.message) => Ok(AttemptResult::NonceConflict {
                message: e.message,
            }),
            Err(e) => match recover_tx_hash(&e) {
                Some((hash, via)) => Ok(AttemptResult::Recovered { hash, nonce, via }),
                None => Err(ExecError::Send { message: e.message }),
            },
        }
    }

    /// Polls for the receipt of `hash`. Read errors are retried until the
    /// receipt timeout.
    pub async fn confirm(
        &self,
        reader: &dyn ChainReader,
        hash: B256,
    ) -> Result<ConfirmStatus, ExecError> {
        let started = Instant::now();
        let timeout = self.policy.receipt_timeout();

        loop {
            match reader.receipt_status(hash).await {
                Ok(Some(true)) => return Ok(ConfirmStatus::Success),
                Ok(Some(false)) => {
                    warn!("Transaction {} REVERTED", hash);
                    return Ok(ConfirmStatus::Reverted);
                }
                Ok(None) => {}
                Err(e) => debug!("Receipt poll for {} failed: {:#}", hash, e),
            }

            if started.elapsed() >= timeout {
                return Err(ExecError::ReceiptTimeout {
                    hash,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }

            sleep_or_cancel(self.policy.receipt_poll_interval(), &self.cancel).await?;
        }
    }

    /// [`submit`](Self::submit) followed by [`confirm`](Self::confirm).
    /// A reverted receipt turns the outcome into a failure carrying
    /// [`ExecError::Reverted`].
    pub async fn submit_and_confirm(
        &self,
        reader: &dyn ChainReader,
        writer: &dyn ChainWriter,
        sender: Address,
        tx: &TxParams,
    ) -> SubmitOutcome {
        let mut outcome = self.submit(reader, writer, sender, tx).await;
        let Some(hash) = outcome.hash else {
            return outcome;
        };

        match self.confirm(reader, hash).await {
            Ok(ConfirmStatus::Success) => {
                outcome.receipt = Some(ConfirmStatus::Success);
            }
            Ok(ConfirmStatus::Reverted) => {
                outcome.receipt = Some(ConfirmStatus::Reverted);
                outcome.success = false;
                outcome.error = Some(ExecError::Reverted { hash });
            }
            Err(e) => {
                outcome.success = false;
                outcome.error = Some(e);
            }
        }
        outcome
    }
}
