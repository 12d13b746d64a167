//! Transaction submitter: sign, record, broadcast, confirm.
//!
//! Every signed transaction is written to the audit log before it is
//! broadcast. Confirmation is awaited by polling receipts for every hash
//! signed for the nonce, with exponential backoff bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::TxEip1559;
use alloy_primitives::{B256, Bytes, TxKind, U256};
use snacks_core::audit::{AuditLog, SubmissionPurpose, SubmissionRecord, SubmissionStatus};
use snacks_core::chain::{ChainClient, ChainError, TxReceipt, UnsignedTx};
use snacks_core::clock::Clock;
use snacks_core::error::DomainError;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::account::DeployerAccount;
use crate::error::SubmitError;

const GWEI: u128 = 1_000_000_000;
const BURN_GAS_LIMIT: u64 = 21_000;

/// Fee pair an EIP-1559 transaction is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Max fee per gas, in wei.
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas, in wei.
    pub max_priority_fee_per_gas: u128,
}

impl FeeSchedule {
    /// Raises both fees by `bps` basis points, rounding up so a replacement
    /// always strictly exceeds the original.
    #[must_use]
    pub fn bumped(self, bps: u128) -> Self {
        let bump = |fee: u128| fee + (fee * bps).div_ceil(10_000).max(1);
        Self {
            max_fee_per_gas: bump(self.max_fee_per_gas),
            max_priority_fee_per_gas: bump(self.max_priority_fee_per_gas),
        }
    }
}

/// Submitter settings.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Chain id transactions are signed for.
    pub chain_id: u64,
    /// Fees for a first broadcast.
    pub fees: FeeSchedule,
    /// How long to wait for inclusion before reporting `Unconfirmed`.
    pub confirmation_timeout: Duration,
    /// First receipt poll interval.
    pub initial_poll_interval: Duration,
    /// Cap for the doubling poll interval.
    pub max_poll_interval: Duration,
    /// Fee increase per replacement, in basis points.
    pub fee_bump_bps: u128,
    /// Replacements attempted after a refused broadcast before burning.
    pub max_replacements: u32,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            chain_id: 5,
            fees: FeeSchedule {
                max_fee_per_gas: 20 * GWEI,
                max_priority_fee_per_gas: 10 * GWEI,
            },
            confirmation_timeout: Duration::from_secs(120),
            initial_poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(15),
            fee_bump_bps: 1_250,
            max_replacements: 3,
        }
    }
}

/// A transaction that was included and succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    /// Hash of the included transaction.
    pub tx_hash: B256,
    /// Nonce it consumed.
    pub nonce: u64,
    /// The parameters that were included.
    pub tx: UnsignedTx,
    /// Its receipt.
    pub receipt: TxReceipt,
}

/// Outcome of startup nonce gap repair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapRepair {
    /// Nonces whose recorded transaction was rebroadcast.
    pub rebroadcast: Vec<u64>,
    /// Nonces consumed with a self-transfer because nothing was recorded.
    pub burned: Vec<u64>,
}

struct Refusal {
    reason: String,
    attempts: u32,
}

/// Signs and submits transactions for the deployer account.
pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    account: DeployerAccount,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    config: SubmitterConfig,
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("account", &self.account)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransactionSubmitter {
    /// Creates a submitter.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        account: DeployerAccount,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            chain,
            account,
            audit,
            clock,
            config,
        }
    }

    /// The deployer address transactions are sent from.
    #[must_use]
    pub fn deployer(&self) -> alloy_primitives::Address {
        self.account.address()
    }

    /// Signs `tx` with `nonce`, records it, broadcasts it and waits for a
    /// receipt.
    ///
    /// # Errors
    ///
    /// - `SubmitError::Reverted` if the transaction was included and reverted.
    /// - `SubmitError::Unconfirmed` if no receipt appeared before the timeout.
    /// - `SubmitError::Rejected` if every broadcast was refused; the nonce
    ///   has been burned.
    /// - `SubmitError::Unsent` if signing or the audit write failed before
    ///   any candidate reached the node; the caller still owns the nonce.
    /// - `SubmitError::Audit` if the audit log failed after a broadcast.
    #[instrument(skip(self, tx, purpose), fields(to = %tx.to))]
    pub async fn submit(
        &self,
        tx: &UnsignedTx,
        nonce: u64,
        purpose: SubmissionPurpose,
    ) -> Result<Submitted, SubmitError> {
        let mut candidates = Vec::new();
        let broadcast = match self
            .broadcast_with_replacements(tx, nonce, self.config.fees, &purpose, &mut candidates)
            .await
        {
            Ok(broadcast) => broadcast,
            Err(err) if candidates.is_empty() => {
                return Err(SubmitError::Unsent {
                    nonce,
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        };
        if let Err(refusal) = broadcast {
            self.burn(nonce, self.config.fees.bumped(self.config.fee_bump_bps))
                .await;
            return Err(SubmitError::Rejected {
                nonce,
                reason: refusal.reason,
                attempts: refusal.attempts,
            });
        }
        self.await_inclusion(tx, nonce, &candidates).await
    }

    /// Resumes a step whose earlier submissions are still pending in the
    /// audit log: re-checks every recorded hash, then sends a fee-bumped
    /// replacement with the same nonce and waits on all candidates.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionSubmitter::submit`]. An empty `pending` slice is
    /// `SubmitError::Audit` wrapping `DomainError::NotFound`.
    #[instrument(skip_all, fields(records = pending.len()))]
    pub async fn resume(&self, pending: &[SubmissionRecord]) -> Result<Submitted, SubmitError> {
        let Some(latest) = pending.iter().max_by_key(|r| r.max_fee_per_gas) else {
            return Err(SubmitError::Audit(
                DomainError::NotFound("pending submission".into()),
            ));
        };
        let nonce = latest.nonce;
        let mut candidates: Vec<B256> = pending.iter().map(|r| r.tx_hash).collect();

        if let Some(outcome) = self.check_receipts(&latest.tx, nonce, &candidates).await? {
            info!(nonce, "pending submission was already included");
            return outcome;
        }

        let fees = FeeSchedule {
            max_fee_per_gas: latest.max_fee_per_gas,
            max_priority_fee_per_gas: latest.max_priority_fee_per_gas,
        }
        .bumped(self.config.fee_bump_bps);
        info!(nonce, ?fees, "replacing stuck submission");
        if let Err(refusal) = self
            .broadcast_with_replacements(&latest.tx, nonce, fees, &latest.purpose, &mut candidates)
            .await?
        {
            // Earlier candidates may still land; keep waiting on them.
            warn!(nonce, reason = %refusal.reason, "replacement refused");
        }
        self.await_inclusion(&latest.tx, nonce, &candidates).await
    }

    /// Makes every nonce in `[chain pending count, next)` usable again after
    /// a restart: recorded transactions are rebroadcast, unrecorded nonces
    /// (allocated but never signed) are burned.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Audit` if the chain or audit log cannot be read.
    #[instrument(skip(self))]
    pub async fn repair_nonce_gaps(&self, next: u64) -> Result<GapRepair, SubmitError> {
        let on_chain = self
            .chain
            .transaction_count(self.account.address())
            .await
            .map_err(DomainError::from)?;
        let mut report = GapRepair::default();
        if on_chain >= next {
            return Ok(report);
        }

        let pending = self.audit.pending_from_nonce(on_chain).await?;
        for nonce in on_chain..next {
            let latest = pending
                .iter()
                .filter(|r| r.nonce == nonce)
                .max_by_key(|r| r.max_fee_per_gas);
            match latest {
                Some(record) => {
                    self.rebroadcast(record).await;
                    report.rebroadcast.push(nonce);
                }
                None => {
                    self.burn(nonce, self.config.fees).await;
                    report.burned.push(nonce);
                }
            }
        }
        info!(
            on_chain,
            next,
            rebroadcast = report.rebroadcast.len(),
            burned = report.burned.len(),
            "nonce gap repair finished"
        );
        Ok(report)
    }

    /// Signs and broadcasts, re-signing with bumped fees while the node
    /// refuses. The outer `Result` carries audit failures; the inner one
    /// reports exhausted refusals.
    async fn broadcast_with_replacements(
        &self,
        tx: &UnsignedTx,
        nonce: u64,
        mut fees: FeeSchedule,
        purpose: &SubmissionPurpose,
        candidates: &mut Vec<B256>,
    ) -> Result<Result<(), Refusal>, SubmitError> {
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let record = self.sign_and_record(tx, nonce, fees, purpose).await?;
            candidates.push(record.tx_hash);

            match self.chain.send_raw_transaction(record.raw.clone()).await {
                Ok(_) | Err(ChainError::AlreadyKnown) => {
                    info!(nonce, tx_hash = %record.tx_hash, attempts, "transaction broadcast");
                    return Ok(Ok(()));
                }
                Err(ChainError::NonceTooLow) => {
                    // Another candidate with this nonce already landed.
                    warn!(nonce, tx_hash = %record.tx_hash, "nonce already consumed on chain");
                    return Ok(Ok(()));
                }
                Err(ChainError::Transport(msg)) => {
                    // The node may have accepted it before the connection broke.
                    warn!(nonce, tx_hash = %record.tx_hash, error = %msg, "broadcast outcome unknown");
                    return Ok(Ok(()));
                }
                Err(err @ (ChainError::Refused(_) | ChainError::CallReverted(_))) => {
                    candidates.pop();
                    self.audit
                        .set_status(record.tx_hash, SubmissionStatus::Refused)
                        .await?;
                    let reason = err.to_string();
                    if attempts > self.config.max_replacements {
                        return Ok(Err(Refusal { reason, attempts }));
                    }
                    fees = fees.bumped(self.config.fee_bump_bps);
                    warn!(nonce, attempts, %reason, ?fees, "broadcast refused, replacing");
                }
            }
        }
    }

    async fn sign_and_record(
        &self,
        tx: &UnsignedTx,
        nonce: u64,
        fees: FeeSchedule,
        purpose: &SubmissionPurpose,
    ) -> Result<SubmissionRecord, SubmitError> {
        let signed = self.account.sign(TxEip1559 {
            chain_id: self.config.chain_id,
            nonce,
            gas_limit: tx.gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.input.clone(),
            ..Default::default()
        })?;
        let record = SubmissionRecord {
            id: Uuid::now_v7(),
            purpose: purpose.clone(),
            nonce,
            tx_hash: signed.hash,
            tx: tx.clone(),
            raw: signed.raw,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            status: SubmissionStatus::Pending,
            recorded_at: self.clock.now(),
        };
        self.audit.record(&record).await?;
        debug!(nonce, tx_hash = %record.tx_hash, "submission recorded");
        Ok(record)
    }

    async fn await_inclusion(
        &self,
        tx: &UnsignedTx,
        nonce: u64,
        candidates: &[B256],
    ) -> Result<Submitted, SubmitError> {
        let started = Instant::now();
        let deadline = started + self.config.confirmation_timeout;
        let mut interval = self.config.initial_poll_interval;
        loop {
            if let Some(outcome) = self.check_receipts(tx, nonce, candidates).await? {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(nonce, waited = ?now - started, "transaction unconfirmed");
                return Err(SubmitError::Unconfirmed {
                    nonce,
                    tx_hashes: candidates.to_vec(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(self.config.max_poll_interval);
        }
    }

    /// Looks up one receipt per candidate. Returns `None` while none is
    /// included.
    async fn check_receipts(
        &self,
        tx: &UnsignedTx,
        nonce: u64,
        candidates: &[B256],
    ) -> Result<Option<Result<Submitted, SubmitError>>, SubmitError> {
        for hash in candidates {
            let receipt = match self.chain.transaction_receipt(*hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(err) => {
                    warn!(nonce, tx_hash = %hash, error = %err, "receipt lookup failed");
                    continue;
                }
            };

            for other in candidates.iter().filter(|c| *c != hash) {
                self.audit
                    .set_status(*other, SubmissionStatus::Superseded)
                    .await?;
            }

            if receipt.success {
                self.audit
                    .set_status(*hash, SubmissionStatus::Confirmed)
                    .await?;
                info!(nonce, tx_hash = %hash, block = receipt.block_number, "transaction confirmed");
                return Ok(Some(Ok(Submitted {
                    tx_hash: *hash,
                    nonce,
                    tx: tx.clone(),
                    receipt,
                })));
            }

            self.audit
                .set_status(*hash, SubmissionStatus::Reverted)
                .await?;
            error!(nonce, tx_hash = %hash, block = receipt.block_number, "transaction reverted");
            return Ok(Some(Err(SubmitError::Reverted {
                tx_hash: *hash,
                block_number: receipt.block_number,
            })));
        }
        Ok(None)
    }

    async fn rebroadcast(&self, record: &SubmissionRecord) {
        match self.chain.send_raw_transaction(record.raw.clone()).await {
            Ok(_) | Err(ChainError::AlreadyKnown | ChainError::NonceTooLow) => {
                info!(nonce = record.nonce, tx_hash = %record.tx_hash, "recorded transaction rebroadcast");
            }
            Err(err) => {
                warn!(nonce = record.nonce, tx_hash = %record.tx_hash, error = %err, "rebroadcast failed");
            }
        }
    }

    /// Consumes `nonce` with a zero-value self-transfer. Failures are logged;
    /// an unburnable nonce needs operator attention.
    async fn burn(&self, nonce: u64, fees: FeeSchedule) {
        let tx = UnsignedTx {
            to: self.account.address(),
            input: Bytes::new(),
            value: U256::ZERO,
            gas_limit: BURN_GAS_LIMIT,
        };
        let mut candidates = Vec::new();
        match self
            .broadcast_with_replacements(&tx, nonce, fees, &SubmissionPurpose::Burn, &mut candidates)
            .await
        {
            Ok(Ok(())) => info!(nonce, "nonce burned"),
            Ok(Err(refusal)) => {
                error!(nonce, reason = %refusal.reason, "nonce burn refused; subsequent nonces will stall");
            }
            Err(err) => error!(nonce, error = %err, "nonce burn could not be recorded"),
        }
    }
}
