//! Asset, attestation and restaurant records.
//!
//! These mirror documents owned by the persistence collaborator. The core
//! treats them as values passed in and out of the `AssetStore`.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wallet::WalletAddress;

/// Where a user's asset is in its on-chain lifecycle. Ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No asset minted yet.
    Unregistered,
    /// Asset minted; no token-bound account yet.
    Minted,
    /// Token-bound account created; awaiting the first evolution.
    Bound,
    /// Metadata evolved at least once; awaiting the next evolution.
    Evolved,
}

impl LifecycleState {
    /// Stable string form used in storage and API views.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Minted => "minted",
            Self::Bound => "bound",
            Self::Evolved => "evolved",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unregistered" => Some(Self::Unregistered),
            "minted" => Some(Self::Minted),
            "bound" => Some(Self::Bound),
            "evolved" => Some(Self::Evolved),
            _ => None,
        }
    }

    /// Whether the asset can receive attestations and evolve.
    #[must_use]
    pub fn accepts_checkins(self) -> bool {
        matches!(self, Self::Bound | Self::Evolved)
    }
}

/// A proof-of-visit attestation minted into a user's token-bound account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// The restaurant visited.
    pub restaurant_id: String,
    /// Metadata pointer of the attestation token.
    pub pointer: String,
    /// Token id of the attestation, when the mint emitted one.
    pub token_id: Option<U256>,
    /// When the attestation was recorded.
    pub issued_at: DateTime<Utc>,
}

/// A user's on-chain identity as mirrored in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Primary key.
    pub wallet: WalletAddress,
    /// Asset token id; assigned once.
    pub token_id: Option<U256>,
    /// Token-bound account address; assigned once.
    pub bound_account: Option<Address>,
    /// Current metadata pointer.
    pub metadata_pointer: Option<String>,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Restaurants checked in at, in checkin order.
    pub visited_restaurants: Vec<String>,
    /// Attestations issued, one per restaurant at most.
    pub attestations: Vec<AttestationRecord>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Creates an `Unregistered` record.
    #[must_use]
    pub fn new(wallet: WalletAddress, now: DateTime<Utc>) -> Self {
        Self {
            wallet,
            token_id: None,
            bound_account: None,
            metadata_pointer: None,
            state: LifecycleState::Unregistered,
            visited_restaurants: Vec::new(),
            attestations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Image URL for the current pointer, served through `gateway`.
    #[must_use]
    pub fn image_url(&self, gateway: &str) -> Option<String> {
        self.metadata_pointer
            .as_deref()
            .map(|pointer| format!("{}/{pointer}.png", gateway.trim_end_matches('/')))
    }

    /// Returns the attestation issued for `restaurant_id`, if any.
    #[must_use]
    pub fn attestation_for(&self, restaurant_id: &str) -> Option<&AttestationRecord> {
        self.attestations
            .iter()
            .find(|a| a.restaurant_id == restaurant_id)
    }
}

/// A restaurant as seen by the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Restaurant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Attestation metadata pointer; empty when none is configured.
    pub attestation_pointer: String,
}

impl Restaurant {
    /// Whether an attestation should be minted for checkins here.
    #[must_use]
    pub fn has_attestation(&self) -> bool {
        !self.attestation_pointer.trim().is_empty()
    }
}
