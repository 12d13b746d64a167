//! Routes for enqueuing workflows and querying their status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use snacks_core::error::DomainError;
use snacks_core::wallet::WalletAddress;
use snacks_core::workflow::{IdempotencyKey, WorkflowStatus};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /mint-and-bind.
#[derive(Debug, Deserialize)]
pub struct MintAndBindRequest {
    /// The user's wallet, any casing.
    pub wallet_address: String,
}

/// Request body for POST /attest-and-evolve.
#[derive(Debug, Deserialize)]
pub struct AttestAndEvolveRequest {
    /// The user's wallet, any casing.
    pub wallet_address: String,
    /// The restaurant checked in at.
    pub restaurant_id: String,
}

/// Status of one workflow.
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    /// Key to poll with.
    pub idempotency_key: String,
    /// `pending`, `completed` or `failed`.
    pub status: &'static str,
    /// Why the workflow failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WorkflowResponse {
    pub(crate) fn new(key: &IdempotencyKey, status: &WorkflowStatus) -> Self {
        let reason = match status {
            WorkflowStatus::Failed { reason } => Some(reason.clone()),
            WorkflowStatus::Pending | WorkflowStatus::Completed => None,
        };
        Self {
            idempotency_key: key.to_string(),
            status: status.as_str(),
            reason,
        }
    }

    pub(crate) fn accepted(key: &IdempotencyKey) -> (StatusCode, Json<Self>) {
        (
            StatusCode::ACCEPTED,
            Json(Self::new(key, &WorkflowStatus::Pending)),
        )
    }
}

pub(crate) fn parse_restaurant_id(raw: &str) -> Result<String, ApiError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(DomainError::Validation("restaurant id must not be empty".into()).into());
    }
    Ok(id.to_owned())
}

/// POST /mint-and-bind
#[instrument(skip(state, request), fields(wallet = %request.wallet_address))]
async fn mint_and_bind(
    State(state): State<AppState>,
    Json(request): Json<MintAndBindRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let wallet: WalletAddress = request.wallet_address.parse()?;
    let key = state.orchestrator.enqueue_mint_and_bind(wallet)?;
    info!(idempotency_key = %key, "mint and bind enqueued");
    Ok(WorkflowResponse::accepted(&key))
}

/// POST /attest-and-evolve
#[instrument(skip(state, request), fields(wallet = %request.wallet_address, restaurant_id = %request.restaurant_id))]
async fn attest_and_evolve(
    State(state): State<AppState>,
    Json(request): Json<AttestAndEvolveRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let wallet: WalletAddress = request.wallet_address.parse()?;
    let restaurant_id = parse_restaurant_id(&request.restaurant_id)?;
    let key = state
        .orchestrator
        .enqueue_attest_and_evolve(wallet, restaurant_id)?;
    info!(idempotency_key = %key, "attest and evolve enqueued");
    Ok(WorkflowResponse::accepted(&key))
}

/// GET /{key}
#[instrument(skip(state))]
async fn workflow_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let key = IdempotencyKey::from_raw(key);
    let status = state
        .orchestrator
        .workflow_status(&key)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("workflow {key}")))?;
    Ok(Json(WorkflowResponse::new(&key, &status)))
}

/// Returns the router for workflow routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mint-and-bind", post(mint_and_bind))
        .route("/attest-and-evolve", post(attest_and_evolve))
        .route("/{key}", get(workflow_status))
}
