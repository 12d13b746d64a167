//! Routes for restaurant checkins.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use snacks_core::wallet::WalletAddress;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::routes::workflows::{WorkflowResponse, parse_restaurant_id};
use crate::state::AppState;

/// Request body for POST /{id}/checkin.
#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    /// The visiting user's wallet, any casing.
    pub wallet_address: String,
}

/// POST /{id}/checkin
#[instrument(skip(state, request), fields(wallet = %request.wallet_address))]
async fn checkin(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Json(request): Json<CheckinRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let wallet: WalletAddress = request.wallet_address.parse()?;
    let restaurant_id = parse_restaurant_id(&restaurant_id)?;
    let key = state
        .orchestrator
        .enqueue_attest_and_evolve(wallet, restaurant_id)?;
    info!(idempotency_key = %key, "checkin recorded; attest and evolve enqueued");
    Ok(WorkflowResponse::accepted(&key))
}

/// Returns the router for restaurant routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/checkin", post(checkin))
}
