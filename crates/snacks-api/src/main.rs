//! Snacks API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use snacks_api::config::Config;
use snacks_api::error::AppError;
use snacks_api::routes;
use snacks_api::state::AppState;
use snacks_chain::{DeployerAccount, NonceSequencer, RpcChainClient, TransactionSubmitter};
use snacks_core::clock::{Clock, SystemClock};
use snacks_core::error::DomainError;
use snacks_core::rng::{DeterministicRng, StdRandom};
use snacks_steps::RandomBasePointer;
use snacks_store::schema::MIGRATOR;
use snacks_store::{PgAssetStore, PgAuditLog, PgIdempotencyLedger, PgNonceWatermark};
use snacks_workflow::application::engine::{EngineConfig, EngineDeps, WorkflowEngine};
use snacks_workflow::application::recovery::recover;
use snacks_workflow::application::worker::channel;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Snacks API server");

    let config = Config::from_env()?;
    tracing::info!(?config, "configuration loaded");

    // Database.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(AppError::from)?;
    MIGRATOR.run(&pool).await.map_err(AppError::from)?;

    // Chain and signing key.
    let chain = Arc::new(
        RpcChainClient::connect(&config.rpc_http_url)
            .await
            .map_err(|e| AppError::Startup(DomainError::from(e)))?,
    );
    let account = DeployerAccount::from_hex(&config.deployer_private_key)
        .map_err(|e| AppError::Config(format!("DEPLOYER_PRIVATE_KEY is invalid: {e}")))?;
    let deployer = account.address();
    tracing::info!(%deployer, chain_id = config.contracts.chain_id, "deployer account loaded");

    // Stores.
    let ledger = Arc::new(PgIdempotencyLedger::new(pool.clone()));
    let audit = Arc::new(PgAuditLog::new(pool.clone()));
    let asset_store = Arc::new(PgAssetStore::new(pool.clone()));
    let watermark = Arc::new(PgNonceWatermark::new(pool, deployer));

    // Orchestration.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let nonces = Arc::new(
        NonceSequencer::seed(chain.as_ref(), deployer, watermark)
            .await
            .map_err(AppError::Startup)?,
    );
    let submitter = Arc::new(TransactionSubmitter::new(
        chain.clone(),
        account,
        audit.clone(),
        clock.clone(),
        config.submitter_config(),
    ));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(StdRandom::from_os()));
    let engine = WorkflowEngine::new(
        EngineDeps {
            ledger: ledger.clone(),
            store: asset_store.clone(),
            audit,
            nonces: nonces.clone(),
            submitter: submitter.clone(),
            chain,
            pointers: Arc::new(RandomBasePointer::new(config.base_pointers.clone())),
            rng,
            clock,
        },
        EngineConfig {
            contracts: config.contracts,
            evolve_without_attestation: config.evolve_without_attestation,
        },
    );
    let (orchestrator, worker) = channel(Arc::new(engine), config.max_redeliveries);

    // Repair nonce gaps and requeue unfinished work before taking requests.
    let report = recover(&submitter, nonces.as_ref(), ledger.as_ref(), &orchestrator)
        .await
        .map_err(AppError::Startup)?;
    tracing::info!(?report, "startup recovery complete");
    tokio::spawn(worker.run());

    // Build application state.
    let app_state = AppState::new(orchestrator, asset_store, config.ipfs_gateway.clone());

    // Build router.
    // TODO: Replace CorsLayer::permissive() with the app's origins once they are fixed.
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::from)?;

    axum::serve(listener, app).await.map_err(AppError::from)?;

    Ok(())
}
