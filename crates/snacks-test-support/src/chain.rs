//! Scripted in-process chain for submitter and engine tests.
//!
//! Decodes every broadcast transaction, tracks nonces like a node's
//! mempool would, and produces receipts whose logs come from a test-supplied
//! responder.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy_primitives::{Address, B256, Bytes, Log, U256};
use async_trait::async_trait;
use snacks_core::chain::{ChainClient, ChainError, TxReceipt};

type LogResponder = Arc<dyn Fn(&SentTx) -> Vec<Log> + Send + Sync>;
type CallResponder = Arc<dyn Fn(Address, &Bytes) -> Result<Bytes, ChainError> + Send + Sync>;

/// A transaction accepted by the fake node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    /// Transaction hash.
    pub hash: B256,
    /// Nonce it was signed with.
    pub nonce: u64,
    /// Call target.
    pub to: Address,
    /// Calldata.
    pub input: Bytes,
    /// Value in wei.
    pub value: U256,
    /// Max fee per gas it was signed with.
    pub max_fee_per_gas: u128,
}

#[derive(Default)]
struct FakeChainState {
    initial_nonce: u64,
    sent: Vec<SentTx>,
    included_nonces: HashSet<u64>,
    receipts: HashMap<B256, TxReceipt>,
    polls_before_visible: u32,
    polls: HashMap<B256, u32>,
    refusals: VecDeque<String>,
    refused: usize,
    reverting_targets: HashSet<Address>,
    hold_inclusion: bool,
    block_number: u64,
    log_responder: Option<LogResponder>,
    call_responder: Option<CallResponder>,
}

impl FakeChainState {
    fn include(&mut self, tx: &SentTx) {
        self.block_number += 1;
        self.included_nonces.insert(tx.nonce);
        let success = !self.reverting_targets.contains(&tx.to);
        let logs = match (&self.log_responder, success) {
            (Some(responder), true) => responder(tx),
            _ => Vec::new(),
        };
        self.receipts.insert(
            tx.hash,
            TxReceipt {
                tx_hash: tx.hash,
                block_number: self.block_number,
                success,
                logs,
            },
        );
    }
}

/// A single-account chain double. All mutation goes through `&self` so the
/// fake can be shared behind an `Arc` with the code under test.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeChainState>,
}

impl fmt::Debug for FakeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("FakeChain")
            .field("sent", &state.sent.len())
            .field("block_number", &state.block_number)
            .finish_non_exhaustive()
    }
}

impl FakeChain {
    /// Creates a chain where the deployer has sent no transactions and every
    /// broadcast is included immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deployer's transaction count before the test starts.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_initial_nonce(self, nonce: u64) -> Self {
        self.state.lock().unwrap().initial_nonce = nonce;
        self
    }

    /// Installs the function that produces logs for successful transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_logs(self, responder: impl Fn(&SentTx) -> Vec<Log> + Send + Sync + 'static) -> Self {
        self.state.lock().unwrap().log_responder = Some(Arc::new(responder));
        self
    }

    /// Installs the function that answers read-only calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_calls(
        self,
        responder: impl Fn(Address, &Bytes) -> Result<Bytes, ChainError> + Send + Sync + 'static,
    ) -> Self {
        self.state.lock().unwrap().call_responder = Some(Arc::new(responder));
        self
    }

    /// Refuses the next broadcast with `reason`, as an underpriced
    /// transaction would be.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn refuse_next(&self, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .refusals
            .push_back(reason.to_owned());
    }

    /// Every transaction sent to `target` is included and reverts.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn revert_calls_to(&self, target: Address) {
        self.state.lock().unwrap().reverting_targets.insert(target);
    }

    /// While held, broadcasts are accepted into the "mempool" but never
    /// included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn hold_inclusion(&self, hold: bool) {
        self.state.lock().unwrap().hold_inclusion = hold;
    }

    /// Receipts only become visible after `polls` lookups of their hash.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_receipt_delay(&self, polls: u32) {
        self.state.lock().unwrap().polls_before_visible = polls;
    }

    /// Includes the most recent pending transaction for every nonce that has
    /// not been included yet, as a block would.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn include_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let mut latest: HashMap<u64, SentTx> = HashMap::new();
        for tx in &state.sent {
            if !state.included_nonces.contains(&tx.nonce) {
                latest.insert(tx.nonce, tx.clone());
            }
        }
        let mut ordered: Vec<_> = latest.into_values().collect();
        ordered.sort_by_key(|tx| tx.nonce);
        for tx in &ordered {
            state.include(tx);
        }
    }

    /// Every accepted broadcast, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Accepted broadcasts addressed to `target`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent_to(&self, target: Address) -> Vec<SentTx> {
        self.sent().into_iter().filter(|tx| tx.to == target).collect()
    }

    /// Number of refused broadcasts.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn refused(&self) -> usize {
        self.state.lock().unwrap().refused
    }

    /// Whether a transaction with `nonce` has been included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn is_included(&self, nonce: u64) -> bool {
        self.state.lock().unwrap().included_nonces.contains(&nonce)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn transaction_count(&self, _address: Address) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        let highest_sent = state.sent.iter().map(|tx| tx.nonce + 1).max();
        Ok(highest_sent.map_or(state.initial_nonce, |n| n.max(state.initial_nonce)))
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let state = self.state.lock().unwrap();
        match &state.call_responder {
            Some(responder) => responder(to, &input),
            None => Err(ChainError::CallReverted("no call responder installed".into())),
        }
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let mut buf: &[u8] = raw.as_ref();
        let envelope = TxEnvelope::decode_2718(&mut buf)
            .map_err(|e| ChainError::Transport(format!("undecodable transaction: {e}")))?;
        let hash = *envelope.tx_hash();

        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.refusals.pop_front() {
            state.refused += 1;
            return Err(ChainError::Refused(reason));
        }
        if state.sent.iter().any(|tx| tx.hash == hash) {
            return Err(ChainError::AlreadyKnown);
        }
        let nonce = envelope.nonce();
        if state.included_nonces.contains(&nonce) || nonce < state.initial_nonce {
            return Err(ChainError::NonceTooLow);
        }

        let tx = SentTx {
            hash,
            nonce,
            to: envelope.to().unwrap_or_default(),
            input: envelope.input().clone(),
            value: envelope.value(),
            max_fee_per_gas: envelope.max_fee_per_gas(),
        };
        state.sent.push(tx.clone());
        if !state.hold_inclusion {
            state.include(&tx);
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let mut state = self.state.lock().unwrap();
        let Some(receipt) = state.receipts.get(&tx_hash).cloned() else {
            return Ok(None);
        };
        let delay = state.polls_before_visible;
        let seen = state.polls.entry(tx_hash).or_insert(0);
        *seen += 1;
        if *seen <= delay {
            return Ok(None);
        }
        Ok(Some(receipt))
    }
}
