//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use snacks_chain::{DeployerAccount, SubmitterConfig, TransactionSubmitter};
use snacks_core::asset::Restaurant;
use snacks_core::clock::Clock;
use snacks_core::store::AssetStore;
use snacks_steps::RandomBasePointer;
use snacks_test_support::{
    CountingNonces, FakeChain, FixedClock, InMemoryAssetStore, InMemoryAuditLog, InMemoryLedger,
    MockRng, lifecycle_chain, test_contracts,
};
use snacks_workflow::application::engine::{EngineConfig, EngineDeps, WorkflowEngine};
use snacks_workflow::application::worker::{WorkflowWorker, channel};
use tower::ServiceExt;

use snacks_api::routes;
use snacks_api::state::AppState;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const GATEWAY: &str = "https://ipfs.test/ipfs";

pub const WALLET: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

pub const WALLET_CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// The app wired to in-memory fakes. The worker is not spawned; tests call
/// `drain` to run queued workflows deterministically.
pub struct TestApp {
    pub router: Router,
    pub worker: WorkflowWorker,
    pub chain: Arc<FakeChain>,
    pub store: Arc<InMemoryAssetStore>,
}

impl TestApp {
    pub async fn drain(&mut self) {
        self.worker.drain().await;
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        get_json(self.router.clone(), uri).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: &serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        post_json(self.router.clone(), uri, body).await
    }
}

pub fn restaurant(id: &str, attestation_pointer: &str) -> Restaurant {
    Restaurant {
        id: id.into(),
        name: id.into(),
        attestation_pointer: attestation_pointer.into(),
    }
}

/// Build the full app router over `store` and a chain that behaves like the
/// deployed contracts. Uses the same route structure as `main.rs`.
pub fn build_test_app(store: InMemoryAssetStore) -> TestApp {
    let store = Arc::new(store);
    let (router, worker, chain) = build_with_store(store.clone());
    TestApp {
        router,
        worker,
        chain,
        store,
    }
}

/// Like [`build_test_app`], but handlers read asset records from `store`.
pub fn build_with_store(
    store: Arc<dyn AssetStore>,
) -> (Router, WorkflowWorker, Arc<FakeChain>) {
    let chain = Arc::new(lifecycle_chain(test_contracts()));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::standard());
    let audit = Arc::new(InMemoryAuditLog::new());
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
            ledger: Arc::new(InMemoryLedger::new()),
            store: store.clone(),
            audit,
            nonces: Arc::new(CountingNonces::starting_at(0)),
            submitter: Arc::new(submitter),
            chain: chain.clone(),
            pointers: Arc::new(RandomBasePointer::new(["cid/604".to_owned()])),
            rng: Arc::new(Mutex::new(MockRng)),
            clock,
        },
        EngineConfig {
            contracts: test_contracts(),
            evolve_without_attestation: true,
        },
    );
    let (orchestrator, worker) = channel(Arc::new(engine), 3);
    let app_state = AppState::new(orchestrator, store, GATEWAY);

    (routes::router().with_state(app_state), worker, chain)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}
