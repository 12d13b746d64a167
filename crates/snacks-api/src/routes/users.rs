//! Routes for user asset records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use snacks_core::asset::{AssetRecord, AttestationRecord, LifecycleState};
use snacks_core::wallet::WalletAddress;
use snacks_core::workflow::{WorkflowRequest, WorkflowStatus};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::routes::workflows::WorkflowResponse;
use crate::state::AppState;

/// One attestation held by the user's bound account.
#[derive(Debug, Serialize)]
pub struct AttestationView {
    /// Restaurant the attestation is for.
    pub restaurant_id: String,
    /// Attestation metadata pointer.
    pub pointer: String,
    /// Attestation token id, decimal.
    pub token_id: Option<String>,
    /// When it was recorded.
    pub issued_at: DateTime<Utc>,
}

impl From<&AttestationRecord> for AttestationView {
    fn from(record: &AttestationRecord) -> Self {
        Self {
            restaurant_id: record.restaurant_id.clone(),
            pointer: record.pointer.clone(),
            token_id: record.token_id.map(|t| t.to_string()),
            issued_at: record.issued_at,
        }
    }
}

/// A user's asset as the app sees it.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// Checksummed wallet address.
    pub wallet_address: String,
    /// Lifecycle state.
    pub state: &'static str,
    /// Asset token id, decimal.
    pub token_id: Option<String>,
    /// Checksummed token-bound account address.
    pub bound_account: Option<String>,
    /// Current metadata pointer.
    pub metadata_pointer: Option<String>,
    /// Profile image derived from the pointer.
    pub image_url: Option<String>,
    /// Restaurants checked in at.
    pub visited_restaurants: Vec<String>,
    /// Attestations minted into the bound account.
    pub attestations: Vec<AttestationView>,
    /// The wallet's mint-and-bind workflow while the asset is not bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowResponse>,
}

impl UserView {
    fn new(record: &AssetRecord, gateway: &str) -> Self {
        Self {
            wallet_address: record.wallet.checksummed(),
            state: record.state.as_str(),
            token_id: record.token_id.map(|t| t.to_string()),
            bound_account: record.bound_account.map(|a| a.to_checksum(None)),
            metadata_pointer: record.metadata_pointer.clone(),
            image_url: record.image_url(gateway),
            visited_restaurants: record.visited_restaurants.clone(),
            attestations: record.attestations.iter().map(AttestationView::from).collect(),
            workflow: None,
        }
    }

    fn unregistered(wallet: &WalletAddress) -> Self {
        Self {
            wallet_address: wallet.checksummed(),
            state: LifecycleState::Unregistered.as_str(),
            token_id: None,
            bound_account: None,
            metadata_pointer: None,
            image_url: None,
            visited_restaurants: Vec::new(),
            attestations: Vec::new(),
            workflow: None,
        }
    }
}

/// GET /{wallet}
///
/// A wallet seen for the first time, or one whose asset is not yet bound,
/// gets a mint-and-bind queued and a 202. A mint-and-bind that already
/// failed is reported, not retried.
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let wallet: WalletAddress = wallet.parse()?;
    let record = state.asset_store.get_asset_record(&wallet).await?;

    let mut view = match &record {
        Some(record) => UserView::new(record, &state.ipfs_gateway),
        None => UserView::unregistered(&wallet),
    };
    let bound = record
        .as_ref()
        .is_some_and(|r| r.state >= LifecycleState::Bound);
    if bound {
        return Ok((StatusCode::OK, Json(view)));
    }

    let key = WorkflowRequest::MintAndBind { wallet }.idempotency_key();
    if let Some(failed @ WorkflowStatus::Failed { .. }) =
        state.orchestrator.workflow_status(&key).await?
    {
        info!(idempotency_key = %key, "mint and bind failed earlier; not requeued");
        view.workflow = Some(WorkflowResponse::new(&key, &failed));
        return Ok((StatusCode::OK, Json(view)));
    }

    let key = state.orchestrator.enqueue_mint_and_bind(wallet)?;
    info!(idempotency_key = %key, "new user seen; mint and bind enqueued");
    view.workflow = Some(WorkflowResponse::new(&key, &WorkflowStatus::Pending));
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Returns the router for user routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/{wallet}", get(get_user))
}
