//! Workflow requests, idempotency keys and progress entries.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::wallet::WalletAddress;

/// The two workflow shapes the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Mint the user's asset and bind a token-bound account to it.
    MintAndBind,
    /// Mint a visit attestation and evolve the asset.
    AttestAndEvolve,
}

impl WorkflowKind {
    /// Stable string form, also the idempotency key prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MintAndBind => "mint_and_bind",
            Self::AttestAndEvolve => "attest_and_evolve",
        }
    }
}

/// Deterministic identifier that collapses duplicate executions of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives the key for `kind` over the given parts.
    fn derive(kind: WorkflowKind, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        for part in parts {
            // Length-prefix each part so ("ab", "c") and ("a", "bc") differ.
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("{}:{hex}", kind.as_str()))
    }

    /// Wraps a key received from outside, e.g. a status query.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of chain-mutating work queued for the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowRequest {
    /// Mint and bind for a newly seen user.
    MintAndBind {
        /// The user's wallet.
        wallet: WalletAddress,
    },
    /// Attest a checkin and evolve the user's asset.
    AttestAndEvolve {
        /// The user's wallet.
        wallet: WalletAddress,
        /// The restaurant checked in at.
        restaurant_id: String,
    },
}

impl WorkflowRequest {
    /// Returns the workflow kind.
    #[must_use]
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::MintAndBind { .. } => WorkflowKind::MintAndBind,
            Self::AttestAndEvolve { .. } => WorkflowKind::AttestAndEvolve,
        }
    }

    /// Returns the wallet the workflow acts for.
    #[must_use]
    pub fn wallet(&self) -> WalletAddress {
        match self {
            Self::MintAndBind { wallet } | Self::AttestAndEvolve { wallet, .. } => *wallet,
        }
    }

    /// Derives the idempotency key from (kind, wallet[, restaurant]).
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        match self {
            Self::MintAndBind { wallet } => {
                IdempotencyKey::derive(self.kind(), &[&wallet.checksummed()])
            }
            Self::AttestAndEvolve {
                wallet,
                restaurant_id,
            } => IdempotencyKey::derive(self.kind(), &[&wallet.checksummed(), restaurant_id]),
        }
    }
}

/// The four chain operations, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Mint the user's asset.
    MintAsset,
    /// Create the token-bound account.
    BindAccount,
    /// Mint a visit attestation into the bound account.
    MintAttestation,
    /// Advance the asset's metadata pointer.
    EvolveAsset,
}

impl StepKind {
    /// Position of the step within its workflow family.
    #[must_use]
    pub fn index(self) -> i16 {
        match self {
            Self::MintAsset => 1,
            Self::BindAccount => 2,
            Self::MintAttestation => 3,
            Self::EvolveAsset => 4,
        }
    }

    /// Inverse of [`StepKind::index`].
    #[must_use]
    pub fn from_index(index: i16) -> Option<Self> {
        match index {
            1 => Some(Self::MintAsset),
            2 => Some(Self::BindAccount),
            3 => Some(Self::MintAttestation),
            4 => Some(Self::EvolveAsset),
            _ => None,
        }
    }

    /// Stable string form used in logs and audit records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MintAsset => "mint_asset",
            Self::BindAccount => "bind_account",
            Self::MintAttestation => "mint_attestation",
            Self::EvolveAsset => "evolve_asset",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intermediate result captured when a step completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    /// The asset was minted.
    AssetMinted {
        /// Token id read from the mint's own Transfer event.
        token_id: U256,
        /// Pointer the asset was minted with.
        pointer: String,
    },
    /// The token-bound account exists.
    AccountBound {
        /// Verified bound-account address.
        account: Address,
    },
    /// An attestation was minted.
    AttestationMinted {
        /// Restaurant the attestation is for.
        restaurant_id: String,
        /// Attestation metadata pointer.
        pointer: String,
        /// Attestation token id, when the mint emitted one.
        token_id: Option<U256>,
        /// When the attestation was recorded.
        issued_at: DateTime<Utc>,
    },
    /// No attestation pointer is configured for the restaurant.
    AttestationSkipped {
        /// Restaurant checked in at.
        restaurant_id: String,
    },
    /// The asset's metadata pointer advanced.
    AssetEvolved {
        /// Pointer before evolution.
        from: String,
        /// Pointer after evolution.
        to: String,
    },
    /// Evolution did not happen under the configured policy.
    EvolutionSkipped,
}

/// Externally observable workflow status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Queued or in progress.
    Pending,
    /// All steps done.
    Completed,
    /// Halted; needs operator action or a deliberate re-enqueue.
    Failed {
        /// Why the workflow halted.
        reason: String,
    },
}

impl WorkflowStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Durable progress for one idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    /// The key this entry tracks.
    pub key: IdempotencyKey,
    /// The request that created the entry.
    pub request: WorkflowRequest,
    /// Current status.
    pub status: WorkflowStatus,
    /// Completed steps and their captured results.
    pub completed: BTreeMap<StepKind, StepResult>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl ProgressEntry {
    /// Creates a fresh pending entry.
    #[must_use]
    pub fn new(request: WorkflowRequest, now: DateTime<Utc>) -> Self {
        Self {
            key: request.idempotency_key(),
            request,
            status: WorkflowStatus::Pending,
            completed: BTreeMap::new(),
            updated_at: now,
        }
    }

    /// Whether `step` has been marked complete.
    #[must_use]
    pub fn is_complete(&self, step: StepKind) -> bool {
        self.completed.contains_key(&step)
    }
}
