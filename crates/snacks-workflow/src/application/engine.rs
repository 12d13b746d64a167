//! Workflow engine: runs one workflow request to completion or halt.
//!
//! Each step is gated by the idempotency ledger. A step whose earlier
//! submission is still pending in the audit log is resumed on the nonce it
//! already holds; only a step with nothing in flight allocates a new nonce.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use snacks_chain::{SubmitError, Submitted, TransactionSubmitter};
use snacks_core::asset::{AssetRecord, Restaurant};
use snacks_core::audit::{AuditLog, SubmissionPurpose};
use snacks_core::chain::{ChainClient, UnsignedTx};
use snacks_core::clock::Clock;
use snacks_core::error::DomainError;
use snacks_core::ledger::IdempotencyLedger;
use snacks_core::nonce::NonceAllocator;
use snacks_core::rng::DeterministicRng;
use snacks_core::store::AssetStore;
use snacks_core::wallet::WalletAddress;
use snacks_core::workflow::{
    IdempotencyKey, ProgressEntry, StepKind, StepResult, WorkflowRequest, WorkflowStatus,
};
use snacks_steps::{
    BasePointerPolicy, ContractSet, bind_account, evolve_asset, mint_asset, mint_attestation,
};
use tracing::{error, info, instrument, warn};

use crate::domain::lifecycle;

/// Engine settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Deployed contracts.
    pub contracts: ContractSet,
    /// Evolve the asset on checkins at restaurants without an attestation.
    pub evolve_without_attestation: bool,
}

/// Collaborators the engine drives.
pub struct EngineDeps {
    /// Workflow progress.
    pub ledger: Arc<dyn IdempotencyLedger>,
    /// Asset and restaurant documents.
    pub store: Arc<dyn AssetStore>,
    /// Submission audit log.
    pub audit: Arc<dyn AuditLog>,
    /// Nonce source for the deployer account.
    pub nonces: Arc<dyn NonceAllocator>,
    /// Signs, broadcasts and confirms.
    pub submitter: Arc<TransactionSubmitter>,
    /// Read-only calls.
    pub chain: Arc<dyn ChainClient>,
    /// Picks the pointer new assets are minted with.
    pub pointers: Arc<dyn BasePointerPolicy>,
    /// Randomness for the pointer policy.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    /// Time source for record timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Runs workflow requests. Not safe to run two requests concurrently; the
/// worker guarantees one at a time.
pub struct WorkflowEngine {
    deps: EngineDeps,
    config: EngineConfig,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Mutable state threaded through the steps of one delivery.
struct Run {
    key: IdempotencyKey,
    wallet: WalletAddress,
    record: AssetRecord,
    completed: BTreeMap<StepKind, StepResult>,
}

fn minted_token(run: &Run) -> Result<U256, DomainError> {
    run.record
        .token_id
        .ok_or_else(|| DomainError::Validation(format!("no asset minted for {}", run.wallet)))
}

impl WorkflowEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        Self { deps, config }
    }

    /// The ledger the engine records progress in.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn IdempotencyLedger> {
        Arc::clone(&self.deps.ledger)
    }

    /// Runs `request` from its last completed step.
    ///
    /// Returns `Ok(Completed)` when every step is done and `Ok(Failed)` when
    /// the workflow halted terminally; the ledger records either.
    ///
    /// # Errors
    ///
    /// Returns the retryable error (`ChainUnconfirmed`, `Infrastructure`,
    /// `ConcurrencyConflict`) that interrupted the run. The ledger entry stays
    /// pending and redelivering the same request resumes it.
    #[instrument(skip_all, fields(idempotency_key = %request.idempotency_key(), kind = request.kind().as_str()))]
    pub async fn run(&self, request: &WorkflowRequest) -> Result<WorkflowStatus, DomainError> {
        let entry = self.deps.ledger.begin(request).await?;
        if entry.status == WorkflowStatus::Completed {
            info!("workflow already completed");
            return Ok(WorkflowStatus::Completed);
        }

        match self.execute(entry.clone()).await {
            Ok(()) => {
                self.deps.ledger.finish(&entry.key).await?;
                info!("workflow completed");
                Ok(WorkflowStatus::Completed)
            }
            Err(err) if err.is_retryable() || matches!(err, DomainError::ConcurrencyConflict { .. }) => {
                warn!(error = %err, "workflow interrupted; left pending");
                Err(err)
            }
            Err(err) => {
                let reason = err.to_string();
                error!(%reason, "workflow failed");
                self.deps.ledger.fail(&entry.key, &reason).await?;
                Ok(WorkflowStatus::Failed { reason })
            }
        }
    }

    async fn execute(&self, entry: ProgressEntry) -> Result<(), DomainError> {
        let wallet = entry.request.wallet();
        let now = self.deps.clock.now();
        let mut record = self
            .deps
            .store
            .get_asset_record(&wallet)
            .await?
            .unwrap_or_else(|| AssetRecord::new(wallet, now));

        // Heal a crash between a ledger completion and the record write.
        let mut healed = false;
        for result in entry.completed.values() {
            healed |= lifecycle::apply(&mut record, result, now);
        }
        if healed {
            info!("re-applied completed steps to asset record");
            self.deps.store.put_asset_record(&record).await?;
        }

        let mut run = Run {
            key: entry.key,
            wallet,
            record,
            completed: entry.completed,
        };
        match &entry.request {
            WorkflowRequest::MintAndBind { .. } => {
                self.mint_asset(&mut run).await?;
                self.bind_account(&mut run).await?;
            }
            WorkflowRequest::AttestAndEvolve { restaurant_id, .. } => {
                if !run.record.state.accepts_checkins() {
                    return Err(DomainError::Validation(format!(
                        "asset for {wallet} is {} and cannot take checkins",
                        run.record.state.as_str()
                    )));
                }
                let restaurant = self
                    .deps
                    .store
                    .get_restaurant(restaurant_id)
                    .await?
                    .ok_or_else(|| DomainError::NotFound(format!("restaurant {restaurant_id}")))?;
                self.mint_attestation(&mut run, &restaurant).await?;
                self.evolve_asset(&mut run).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(step = "mint_asset"))]
    async fn mint_asset(&self, run: &mut Run) -> Result<(), DomainError> {
        if run.completed.contains_key(&StepKind::MintAsset) {
            return Ok(());
        }
        if let Some(token_id) = run.record.token_id {
            info!(%token_id, "asset already minted; adopting");
            let result = StepResult::AssetMinted {
                token_id,
                pointer: run.record.metadata_pointer.clone().unwrap_or_default(),
            };
            return self.complete(run, StepKind::MintAsset, result).await;
        }

        let contracts = &self.config.contracts;
        let submitted = match self.resume_pending(&run.key, StepKind::MintAsset).await? {
            Some(submitted) => submitted,
            None => {
                let pointer = self.choose_pointer()?;
                let tx = mint_asset::build(contracts, &run.wallet, &pointer);
                self.submit(&run.key, StepKind::MintAsset, &tx).await?
            }
        };
        let pointer = mint_asset::pointer_of(&submitted.tx).ok_or_else(|| {
            DomainError::Consistency(format!("mint {} has undecodable calldata", submitted.tx_hash))
        })?;
        let result = mint_asset::extract(contracts, &run.wallet, pointer, &submitted.receipt)?;
        self.complete(run, StepKind::MintAsset, result).await
    }

    #[instrument(skip_all, fields(step = "bind_account"))]
    async fn bind_account(&self, run: &mut Run) -> Result<(), DomainError> {
        if run.completed.contains_key(&StepKind::BindAccount) {
            return Ok(());
        }
        if let Some(account) = run.record.bound_account {
            info!(%account, "account already bound; adopting");
            return self
                .complete(run, StepKind::BindAccount, StepResult::AccountBound { account })
                .await;
        }
        let token_id = minted_token(run)?;

        let contracts = &self.config.contracts;
        let submitted = match self.resume_pending(&run.key, StepKind::BindAccount).await? {
            Some(submitted) => submitted,
            None => {
                let tx = bind_account::build(contracts, token_id);
                self.submit(&run.key, StepKind::BindAccount, &tx).await?
            }
        };

        let computed = bind_account::computed_account(contracts, token_id);
        let (registry, query) = bind_account::account_query(contracts, token_id);
        let output = self.deps.chain.call(registry, query).await?;
        let queried = bind_account::decode_account_query(&output)?;
        let emitted = bind_account::created_account(contracts, &submitted.receipt);
        let result = bind_account::verify(computed, queried, emitted)?;
        self.complete(run, StepKind::BindAccount, result).await
    }

    #[instrument(skip_all, fields(step = "mint_attestation", restaurant_id = %restaurant.id))]
    async fn mint_attestation(&self, run: &mut Run, restaurant: &Restaurant) -> Result<(), DomainError> {
        if run.completed.contains_key(&StepKind::MintAttestation) {
            return Ok(());
        }
        if let Some(existing) = run.record.attestation_for(&restaurant.id) {
            info!("attestation already recorded; adopting");
            let result = StepResult::AttestationMinted {
                restaurant_id: existing.restaurant_id.clone(),
                pointer: existing.pointer.clone(),
                token_id: existing.token_id,
                issued_at: existing.issued_at,
            };
            return self.complete(run, StepKind::MintAttestation, result).await;
        }
        let account = run.record.bound_account.ok_or_else(|| {
            DomainError::Validation(format!("asset for {} has no bound account", run.wallet))
        })?;

        let contracts = &self.config.contracts;
        let submitted = match self.resume_pending(&run.key, StepKind::MintAttestation).await? {
            Some(submitted) => submitted,
            None => match mint_attestation::build(contracts, account, restaurant) {
                Some(tx) => self.submit(&run.key, StepKind::MintAttestation, &tx).await?,
                None => {
                    info!("no attestation configured; skipping");
                    let result = mint_attestation::skipped(restaurant);
                    return self.complete(run, StepKind::MintAttestation, result).await;
                }
            },
        };
        let result = mint_attestation::extract(
            contracts,
            account,
            restaurant,
            &submitted.receipt,
            self.deps.clock.now(),
        );
        self.complete(run, StepKind::MintAttestation, result).await
    }

    #[instrument(skip_all, fields(step = "evolve_asset"))]
    async fn evolve_asset(&self, run: &mut Run) -> Result<(), DomainError> {
        if run.completed.contains_key(&StepKind::EvolveAsset) {
            return Ok(());
        }
        let attested = matches!(
            run.completed.get(&StepKind::MintAttestation),
            Some(StepResult::AttestationMinted { .. })
        );
        if !attested && !self.config.evolve_without_attestation {
            info!("no attestation and evolution without attestation is off");
            return self
                .complete(run, StepKind::EvolveAsset, StepResult::EvolutionSkipped)
                .await;
        }

        let token_id = minted_token(run)?;
        let current = run.record.metadata_pointer.clone().ok_or_else(|| {
            DomainError::Configuration(format!("asset {token_id} has no metadata pointer"))
        })?;

        let result = match self.resume_pending(&run.key, StepKind::EvolveAsset).await? {
            Some(submitted) => {
                let to = evolve_asset::pointer_of(&submitted.tx).ok_or_else(|| {
                    DomainError::Consistency(format!(
                        "evolution {} has undecodable calldata",
                        submitted.tx_hash
                    ))
                })?;
                StepResult::AssetEvolved { from: current, to }
            }
            None => {
                self.settle_sibling_evolutions(run).await?;
                let current = run.record.metadata_pointer.clone().unwrap_or(current);
                let evolution = evolve_asset::build(&self.config.contracts, token_id, &current)?;
                self.submit(&run.key, StepKind::EvolveAsset, &evolution.tx)
                    .await?;
                evolution.result
            }
        };
        self.complete(run, StepKind::EvolveAsset, result).await
    }

    /// Settles evolutions that other checkins of the same wallet left in
    /// flight, so the next evolution builds on the pointer they set.
    async fn settle_sibling_evolutions(&self, run: &mut Run) -> Result<(), DomainError> {
        for sibling in self.deps.ledger.unfinished().await? {
            let same_wallet = sibling.request.wallet() == run.wallet;
            if sibling.key == run.key
                || !same_wallet
                || !matches!(sibling.request, WorkflowRequest::AttestAndEvolve { .. })
                || sibling.is_complete(StepKind::EvolveAsset)
            {
                continue;
            }
            let submitted = match self.resume_pending(&sibling.key, StepKind::EvolveAsset).await {
                Ok(Some(submitted)) => submitted,
                Ok(None) => continue,
                Err(err) if err.is_retryable() => return Err(err),
                Err(err) => {
                    // The sibling rebuilds on its own redelivery.
                    warn!(sibling = %sibling.key, error = %err, "in-flight evolution did not land");
                    continue;
                }
            };
            let to = evolve_asset::pointer_of(&submitted.tx).ok_or_else(|| {
                DomainError::Consistency(format!(
                    "evolution {} has undecodable calldata",
                    submitted.tx_hash
                ))
            })?;
            let from = run.record.metadata_pointer.clone().unwrap_or_default();
            let result = StepResult::AssetEvolved { from, to };
            self.deps
                .ledger
                .complete(&sibling.key, StepKind::EvolveAsset, &result)
                .await?;
            if lifecycle::apply(&mut run.record, &result, self.deps.clock.now()) {
                self.deps.store.put_asset_record(&run.record).await?;
            }
            info!(sibling = %sibling.key, "settled in-flight evolution of another checkin");
        }
        Ok(())
    }

    fn choose_pointer(&self) -> Result<String, DomainError> {
        let mut rng = self
            .deps
            .rng
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("RNG mutex poisoned: {e}")))?;
        Ok(self.deps.pointers.choose(&mut *rng)?)
    }

    /// Resumes the step's in-flight submission, if the audit log has one.
    async fn resume_pending(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
    ) -> Result<Option<Submitted>, DomainError> {
        let pending = self.deps.audit.pending_for_step(key, step).await?;
        if pending.is_empty() {
            return Ok(None);
        }
        info!(%step, submissions = pending.len(), "resuming in-flight submission");
        Ok(Some(self.deps.submitter.resume(&pending).await?))
    }

    async fn submit(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
        tx: &UnsignedTx,
    ) -> Result<Submitted, DomainError> {
        let nonce = self.deps.nonces.allocate().await?;
        let purpose = SubmissionPurpose::Step {
            key: key.clone(),
            step,
        };
        match self.deps.submitter.submit(tx, nonce, purpose).await {
            Ok(submitted) => Ok(submitted),
            Err(SubmitError::Unsent { nonce, source }) => {
                warn!(nonce, error = %source, "nothing broadcast; releasing nonce");
                self.deps.nonces.release(nonce).await;
                Err((*source).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Marks `step` complete, then projects the result onto the record.
    async fn complete(
        &self,
        run: &mut Run,
        step: StepKind,
        result: StepResult,
    ) -> Result<(), DomainError> {
        self.deps.ledger.complete(&run.key, step, &result).await?;
        let now: DateTime<Utc> = self.deps.clock.now();
        if lifecycle::apply(&mut run.record, &result, now) {
            self.deps.store.put_asset_record(&run.record).await?;
        }
        info!(%step, "step completed");
        run.completed.insert(step, result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use snacks_chain::{DeployerAccount, SubmitterConfig};
    use snacks_core::asset::LifecycleState;
    use snacks_core::audit::SubmissionStatus;
    use snacks_steps::RandomBasePointer;
    use snacks_steps::bind_account::computed_account;
    use snacks_test_support::{
        CountingNonces, FakeChain, FixedClock, InMemoryAssetStore, InMemoryAuditLog,
        InMemoryLedger, MockRng, asset_token_id, lifecycle_chain,
        lifecycle_chain_with_registry_answer, test_contracts,
    };

    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    struct Harness {
        chain: Arc<FakeChain>,
        ledger: Arc<InMemoryLedger>,
        store: Arc<InMemoryAssetStore>,
        audit: Arc<InMemoryAuditLog>,
        engine: WorkflowEngine,
    }

    fn harness(chain: FakeChain, store: InMemoryAssetStore, evolve_without_attestation: bool) -> Harness {
        let chain = Arc::new(chain);
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(store);
        let audit = Arc::new(InMemoryAuditLog::new());
        let clock = Arc::new(FixedClock::standard());
        let submitter = TransactionSubmitter::new(
            chain.clone(),
            DeployerAccount::from_hex(DEV_KEY).unwrap(),
            audit.clone(),
            clock.clone(),
            SubmitterConfig {
                confirmation_timeout: Duration::from_millis(30),
                initial_poll_interval: Duration::from_millis(1),
                max_poll_interval: Duration::from_millis(4),
                ..SubmitterConfig::default()
            },
        );
        let engine = WorkflowEngine::new(
            EngineDeps {
                ledger: ledger.clone(),
                store: store.clone(),
                audit: audit.clone(),
                nonces: Arc::new(CountingNonces::starting_at(0)),
                submitter: Arc::new(submitter),
                chain: chain.clone(),
                pointers: Arc::new(RandomBasePointer::new(["cid/604".to_owned()])),
                rng: Arc::new(Mutex::new(MockRng)),
                clock,
            },
            EngineConfig {
                contracts: test_contracts(),
                evolve_without_attestation,
            },
        );
        Harness {
            chain,
            ledger,
            store,
            audit,
            engine,
        }
    }

    fn wallet() -> WalletAddress {
        "0x0000000000000000000000000000000000000ABC".parse().unwrap()
    }

    fn mint_and_bind() -> WorkflowRequest {
        WorkflowRequest::MintAndBind { wallet: wallet() }
    }

    fn checkin(restaurant_id: &str) -> WorkflowRequest {
        WorkflowRequest::AttestAndEvolve {
            wallet: wallet(),
            restaurant_id: restaurant_id.into(),
        }
    }

    fn restaurant(id: &str, pointer: &str) -> Restaurant {
        Restaurant {
            id: id.into(),
            name: id.into(),
            attestation_pointer: pointer.into(),
        }
    }

    fn bound_record(pointer: &str) -> AssetRecord {
        let mut record = AssetRecord::new(wallet(), FixedClock::standard().now());
        record.token_id = Some(U256::from(42));
        record.bound_account = Some(computed_account(&test_contracts(), U256::from(42)));
        record.metadata_pointer = Some(pointer.into());
        record.state = LifecycleState::Bound;
        record
    }

    #[tokio::test]
    async fn test_unregistered_wallet_ends_bound_with_token_and_account() {
        // Arrange
        let h = harness(lifecycle_chain(test_contracts()), InMemoryAssetStore::new(), true);

        // Act
        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        // Assert
        assert_eq!(status, WorkflowStatus::Completed);
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.state, LifecycleState::Bound);
        assert_eq!(record.token_id, Some(asset_token_id(0)));
        assert_eq!(
            record.bound_account,
            Some(computed_account(&test_contracts(), asset_token_id(0)))
        );
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/604"));
        assert_eq!(
            h.ledger.status(&mint_and_bind().idempotency_key()).await.unwrap(),
            Some(WorkflowStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_completed_workflow_is_not_resubmitted() {
        let h = harness(lifecycle_chain(test_contracts()), InMemoryAssetStore::new(), true);
        h.engine.run(&mint_and_bind()).await.unwrap();

        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        assert_eq!(status, WorkflowStatus::Completed);
        assert_eq!(h.chain.sent_to(test_contracts().asset).len(), 1);
        assert_eq!(h.chain.sent_to(test_contracts().registry).len(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_mint_resumes_at_bind_with_persisted_token() {
        // Arrange: the mint completed in the ledger, then the process died
        // before the asset record was written.
        let h = harness(lifecycle_chain(test_contracts()), InMemoryAssetStore::new(), true);
        let key = mint_and_bind().idempotency_key();
        h.ledger.begin(&mint_and_bind()).await.unwrap();
        h.ledger
            .complete(
                &key,
                StepKind::MintAsset,
                &StepResult::AssetMinted {
                    token_id: U256::from(77),
                    pointer: "cid/604".into(),
                },
            )
            .await
            .unwrap();

        // Act
        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        // Assert
        assert_eq!(status, WorkflowStatus::Completed);
        assert!(h.chain.sent_to(test_contracts().asset).is_empty());
        let binds = h.chain.sent_to(test_contracts().registry);
        assert_eq!(binds.len(), 1);
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.token_id, Some(U256::from(77)));
        assert_eq!(
            record.bound_account,
            Some(computed_account(&test_contracts(), U256::from(77)))
        );
    }

    #[tokio::test]
    async fn test_existing_record_is_adopted_without_submitting() {
        let store = InMemoryAssetStore::new().with_record(bound_record("cid/604"));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        assert_eq!(status, WorkflowStatus::Completed);
        assert!(h.chain.sent().is_empty());
        let entry = h.ledger.entry(&mint_and_bind().idempotency_key()).unwrap();
        assert!(entry.is_complete(StepKind::MintAsset));
        assert!(entry.is_complete(StepKind::BindAccount));
    }

    #[tokio::test]
    async fn test_reverted_mint_fails_workflow_and_leaves_asset_unregistered() {
        let chain = lifecycle_chain(test_contracts());
        chain.revert_calls_to(test_contracts().asset);
        let h = harness(chain, InMemoryAssetStore::new(), true);

        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        assert!(matches!(status, WorkflowStatus::Failed { .. }));
        assert!(h.store.record(&wallet()).is_none());
        assert!(h.chain.sent_to(test_contracts().registry).is_empty());
        assert!(matches!(
            h.ledger.status(&mint_and_bind().idempotency_key()).await.unwrap(),
            Some(WorkflowStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfirmed_mint_is_resumed_on_same_nonce() {
        // Arrange
        let chain = lifecycle_chain(test_contracts());
        chain.hold_inclusion(true);
        let h = harness(chain, InMemoryAssetStore::new(), true);

        // Act: first delivery times out.
        let err = h.engine.run(&mint_and_bind()).await.unwrap_err();
        assert!(matches!(err, DomainError::ChainUnconfirmed(_)));
        assert_eq!(
            h.ledger.status(&mint_and_bind().idempotency_key()).await.unwrap(),
            Some(WorkflowStatus::Pending)
        );

        // Act: the node includes it; redelivery resumes.
        h.chain.include_pending();
        h.chain.hold_inclusion(false);
        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        // Assert
        assert_eq!(status, WorkflowStatus::Completed);
        let mints = h.chain.sent_to(test_contracts().asset);
        assert_eq!(mints.len(), 1);
        assert_eq!(mints[0].nonce, 0);
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.token_id, Some(asset_token_id(0)));
        assert!(
            h.audit
                .records()
                .iter()
                .any(|r| r.tx_hash == mints[0].hash && r.status == SubmissionStatus::Confirmed)
        );
    }

    #[tokio::test]
    async fn test_bound_account_mismatch_is_consistency_failure() {
        let chain = lifecycle_chain_with_registry_answer(
            test_contracts(),
            Some(alloy_primitives::Address::repeat_byte(0x99)),
        );
        let h = harness(chain, InMemoryAssetStore::new(), true);

        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        let WorkflowStatus::Failed { reason } = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(reason.contains("consistency"));
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.state, LifecycleState::Minted);
        assert!(record.bound_account.is_none());
    }

    #[tokio::test]
    async fn test_checkin_mints_attestation_into_bound_account_and_evolves() {
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/7"))
            .with_restaurant(restaurant("le-comptoir", "poap/12"));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&checkin("le-comptoir")).await.unwrap();

        assert_eq!(status, WorkflowStatus::Completed);
        let attestations = h.chain.sent_to(test_contracts().attestation);
        assert_eq!(attestations.len(), 1);
        let evolutions = h.chain.sent_to(test_contracts().asset);
        assert_eq!(evolutions.len(), 1);
        assert!(attestations[0].nonce < evolutions[0].nonce);

        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/8"));
        assert_eq!(record.state, LifecycleState::Evolved);
        assert_eq!(record.visited_restaurants, vec!["le-comptoir"]);
        let attestation = record.attestation_for("le-comptoir").unwrap();
        assert_eq!(attestation.pointer, "poap/12");
        assert!(attestation.token_id.is_some());
    }

    #[tokio::test]
    async fn test_checkin_without_attestation_pointer_evolves_without_attestation() {
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/7"))
            .with_restaurant(restaurant("chez-janou", ""));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&checkin("chez-janou")).await.unwrap();

        assert_eq!(status, WorkflowStatus::Completed);
        assert!(h.chain.sent_to(test_contracts().attestation).is_empty());
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/8"));
        assert_eq!(record.visited_restaurants, vec!["chez-janou"]);
        assert!(record.attestations.is_empty());
    }

    #[tokio::test]
    async fn test_checkin_without_attestation_stays_put_when_policy_forbids() {
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/7"))
            .with_restaurant(restaurant("chez-janou", ""));
        let h = harness(lifecycle_chain(test_contracts()), store, false);

        let status = h.engine.run(&checkin("chez-janou")).await.unwrap();

        assert_eq!(status, WorkflowStatus::Completed);
        assert!(h.chain.sent().is_empty());
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/7"));
        assert_eq!(record.state, LifecycleState::Bound);
        assert_eq!(record.visited_restaurants, vec!["chez-janou"]);
    }

    #[tokio::test]
    async fn test_non_numeric_pointer_fails_with_configuration_error_and_no_tx() {
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/latest"))
            .with_restaurant(restaurant("chez-janou", ""));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&checkin("chez-janou")).await.unwrap();

        let WorkflowStatus::Failed { reason } = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(reason.contains("configuration"));
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_checkin_before_binding_is_terminal_validation_failure() {
        let store = InMemoryAssetStore::new().with_restaurant(restaurant("le-comptoir", "poap/12"));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&checkin("le-comptoir")).await.unwrap();

        assert!(matches!(status, WorkflowStatus::Failed { .. }));
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_restaurant_fails_workflow() {
        let store = InMemoryAssetStore::new().with_record(bound_record("cid/7"));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        let status = h.engine.run(&checkin("nowhere")).await.unwrap();

        let WorkflowStatus::Failed { reason } = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(reason.contains("restaurant nowhere"));
    }

    #[tokio::test]
    async fn test_checkins_at_two_restaurants_each_evolve_once_in_order() {
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/7"))
            .with_restaurant(restaurant("le-comptoir", "poap/12"))
            .with_restaurant(restaurant("chez-janou", "poap/13"));
        let h = harness(lifecycle_chain(test_contracts()), store, true);

        h.engine.run(&checkin("le-comptoir")).await.unwrap();
        h.engine.run(&checkin("chez-janou")).await.unwrap();
        h.engine.run(&checkin("le-comptoir")).await.unwrap();

        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/9"));
        assert_eq!(record.attestations.len(), 2);
        assert_eq!(h.chain.sent_to(test_contracts().asset).len(), 2);
    }

    #[tokio::test]
    async fn test_checkin_builds_on_evolution_left_in_flight_by_another_checkin() {
        // Arrange
        let store = InMemoryAssetStore::new()
            .with_record(bound_record("cid/7"))
            .with_restaurant(restaurant("le-comptoir", ""))
            .with_restaurant(restaurant("chez-janou", ""));
        let chain = lifecycle_chain(test_contracts());
        chain.hold_inclusion(true);
        let h = harness(chain, store, true);

        // Act: the first checkin's evolution times out and is requeued.
        let err = h.engine.run(&checkin("le-comptoir")).await.unwrap_err();
        assert!(matches!(err, DomainError::ChainUnconfirmed(_)));
        h.chain.hold_inclusion(false);
        let second = h.engine.run(&checkin("chez-janou")).await.unwrap();
        h.chain.include_pending();
        let first = h.engine.run(&checkin("le-comptoir")).await.unwrap();

        // Assert
        assert_eq!(second, WorkflowStatus::Completed);
        assert_eq!(first, WorkflowStatus::Completed);
        let uris: Vec<(u64, Option<String>)> = h
            .chain
            .sent_to(test_contracts().asset)
            .iter()
            .map(|tx| {
                let unsigned = UnsignedTx {
                    to: tx.to,
                    input: tx.input.clone(),
                    value: tx.value,
                    gas_limit: 0,
                };
                (tx.nonce, evolve_asset::pointer_of(&unsigned))
            })
            .collect();
        assert!(
            uris.iter()
                .filter(|(nonce, _)| *nonce == 0)
                .all(|(_, uri)| uri.as_deref() == Some("cid/8"))
        );
        assert_eq!(uris.last(), Some(&(1, Some("cid/9".to_owned()))));
        let record = h.store.record(&wallet()).unwrap();
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/9"));
        let entry = h.ledger.entry(&checkin("le-comptoir").idempotency_key()).unwrap();
        assert!(entry.is_complete(StepKind::EvolveAsset));
    }

    #[tokio::test]
    async fn test_nonce_is_reused_when_audit_write_fails_before_broadcast() {
        // Arrange
        let h = harness(lifecycle_chain(test_contracts()), InMemoryAssetStore::new(), true);
        h.audit.fail_next_record();

        // Act
        let err = h.engine.run(&mint_and_bind()).await.unwrap_err();
        let status = h.engine.run(&mint_and_bind()).await.unwrap();

        // Assert
        assert!(matches!(err, DomainError::Infrastructure(_)));
        assert_eq!(status, WorkflowStatus::Completed);
        let nonces: Vec<u64> = h.chain.sent().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);
    }
}
