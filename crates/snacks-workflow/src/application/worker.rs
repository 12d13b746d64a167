//! The single serial worker and the handle request handlers enqueue through.
//!
//! All chain-mutating work for the deployer account runs on one task that
//! drains an unbounded queue in order. Handlers never wait on the chain.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use snacks_core::error::DomainError;
use snacks_core::ledger::IdempotencyLedger;
use snacks_core::wallet::WalletAddress;
use snacks_core::workflow::{IdempotencyKey, WorkflowRequest, WorkflowStatus};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::application::engine::WorkflowEngine;

/// A request on the queue and how many times it has been delivered before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The request.
    pub request: WorkflowRequest,
    /// Zero for the first delivery.
    pub attempt: u32,
}

/// Cloneable, non-blocking entry point for request handlers.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::UnboundedSender<Delivery>,
    queued: Arc<Mutex<HashSet<IdempotencyKey>>>,
    ledger: Arc<dyn IdempotencyLedger>,
}

impl std::fmt::Debug for OrchestratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorHandle").finish_non_exhaustive()
    }
}

impl OrchestratorHandle {
    /// Queues a mint-and-bind for `wallet`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the worker has stopped.
    pub fn enqueue_mint_and_bind(&self, wallet: WalletAddress) -> Result<IdempotencyKey, DomainError> {
        self.enqueue(WorkflowRequest::MintAndBind { wallet })
    }

    /// Queues an attest-and-evolve for a checkin by `wallet` at `restaurant_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the worker has stopped.
    pub fn enqueue_attest_and_evolve(
        &self,
        wallet: WalletAddress,
        restaurant_id: impl Into<String>,
    ) -> Result<IdempotencyKey, DomainError> {
        self.enqueue(WorkflowRequest::AttestAndEvolve {
            wallet,
            restaurant_id: restaurant_id.into(),
        })
    }

    /// Queues `request` unless a request with the same key is already
    /// waiting. Returns the request's idempotency key either way.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the worker has stopped.
    pub fn enqueue(&self, request: WorkflowRequest) -> Result<IdempotencyKey, DomainError> {
        self.deliver(Delivery {
            request,
            attempt: 0,
        })
    }

    /// `Pending` while the request waits in the queue, otherwise what the
    /// ledger records. `None` for keys never seen.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the ledger cannot be read.
    pub async fn workflow_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<WorkflowStatus>, DomainError> {
        if self.is_queued(key)? {
            return Ok(Some(WorkflowStatus::Pending));
        }
        self.ledger.status(key).await
    }

    fn deliver(&self, delivery: Delivery) -> Result<IdempotencyKey, DomainError> {
        let key = delivery.request.idempotency_key();
        let mut queued = self.lock_queued()?;
        if !queued.insert(key.clone()) {
            debug!(idempotency_key = %key, "request already queued");
            return Ok(key);
        }
        if self.sender.send(delivery).is_err() {
            queued.remove(&key);
            return Err(DomainError::Infrastructure("workflow worker has stopped".into()));
        }
        debug!(idempotency_key = %key, "request queued");
        Ok(key)
    }

    fn dequeued(&self, key: &IdempotencyKey) -> Result<(), DomainError> {
        self.lock_queued()?.remove(key);
        Ok(())
    }

    fn is_queued(&self, key: &IdempotencyKey) -> Result<bool, DomainError> {
        Ok(self.lock_queued()?.contains(key))
    }

    fn lock_queued(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashSet<IdempotencyKey>>, DomainError> {
        self.queued
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("queue mutex poisoned: {e}")))
    }
}

/// Owns the engine and drains the queue one request at a time.
pub struct WorkflowWorker {
    engine: Arc<WorkflowEngine>,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    handle: OrchestratorHandle,
    max_redeliveries: u32,
}

impl std::fmt::Debug for WorkflowWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowWorker")
            .field("max_redeliveries", &self.max_redeliveries)
            .finish_non_exhaustive()
    }
}

/// Creates the queue, its handle and the worker that drains it.
#[must_use]
pub fn channel(engine: Arc<WorkflowEngine>, max_redeliveries: u32) -> (OrchestratorHandle, WorkflowWorker) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = OrchestratorHandle {
        sender,
        queued: Arc::new(Mutex::new(HashSet::new())),
        ledger: engine.ledger(),
    };
    let worker = WorkflowWorker {
        engine,
        receiver,
        handle: handle.clone(),
        max_redeliveries,
    };
    (handle, worker)
}

impl WorkflowWorker {
    /// Runs until every handle is dropped and the queue is empty.
    ///
    /// The worker keeps its own handle for redelivery, so in practice this
    /// runs for the life of the process.
    pub async fn run(mut self) {
        info!("workflow worker started");
        while let Some(delivery) = self.receiver.recv().await {
            self.process(delivery).await;
        }
        info!("workflow worker stopped");
    }

    /// Processes everything currently queued, including redeliveries it
    /// causes, then returns.
    pub async fn drain(&mut self) {
        while let Ok(delivery) = self.receiver.try_recv() {
            self.process(delivery).await;
        }
    }

    #[instrument(skip_all, fields(idempotency_key = %delivery.request.idempotency_key(), attempt = delivery.attempt))]
    async fn process(&mut self, delivery: Delivery) {
        let key = delivery.request.idempotency_key();
        if let Err(err) = self.handle.dequeued(&key) {
            error!(error = %err, "could not update queued set");
        }

        match self.engine.run(&delivery.request).await {
            Ok(WorkflowStatus::Completed) => debug!("delivery completed"),
            Ok(status) => warn!(status = status.as_str(), "delivery halted"),
            Err(err) if delivery.attempt < self.max_redeliveries => {
                warn!(error = %err, "redelivering");
                let redelivery = Delivery {
                    request: delivery.request,
                    attempt: delivery.attempt + 1,
                };
                if let Err(err) = self.handle.deliver(redelivery) {
                    error!(error = %err, "redelivery failed");
                }
            }
            Err(err) => {
                error!(error = %err, "redeliveries exhausted; left pending for restart recovery");
            }
        }
    }
}
