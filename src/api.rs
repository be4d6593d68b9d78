//! Read-only REST API for auditing the FarmTrace ledger
//!
//! Every handler reads through the shared ledger handle. Nothing here
//! appends events or seals blocks.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{AnnotatedTransaction, ChainStats, HashedBlock, Ledger, Verification};
use crate::recorder::SharedLedger;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    pub ledger: SharedLedger,
    started_at: Instant,
}

impl ApiState {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            started_at: Instant::now(),
        }
    }

    /// Run a read against the ledger off the async workers. Integrity checks
    /// rehash the whole chain, which is CPU work proportional to its length.
    async fn read<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> T + Send + 'static,
    {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || {
            let guard = ledger.read();
            f(&*guard)
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("ledger read task failed: {}", e)))
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Response Types
// ============================================================================

pub const INTACT_MESSAGE: &str = "Blockchain integrity verified - no tampering detected";
pub const COMPROMISED_MESSAGE: &str = "WARNING: Blockchain integrity compromised!";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub total_blocks: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainSummary {
    #[serde(flatten)]
    pub stats: ChainStats,
    pub is_intact: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BlockchainResponse {
    pub blockchain: BlockchainSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHistoryResponse {
    pub batch_code: String,
    pub blockchain_records: Vec<AnnotatedTransaction>,
    pub total_records: usize,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullChainResponse {
    pub chain: Vec<HashedBlock>,
    pub verification: Verification,
    pub total_blocks: usize,
    pub message: &'static str,
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(ledger: SharedLedger) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/blockchain", get(get_blockchain))
        .route("/blockchain/verify", get(verify_blockchain))
        .route("/blockchain/batch/:code", get(get_batch_history))
        .route("/blockchain/full-chain", get(get_full_chain))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(ApiState::new(ledger));

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the audit API on `0.0.0.0:port` until the process is stopped.
pub async fn run_api_server(ledger: SharedLedger, port: u16) -> std::io::Result<()> {
    let app = build_api_router(ledger);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "api.listening");

    axum::serve(listener, app).await
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(state): State<ApiState>) -> Result<Json<HealthResponse>, ApiError> {
    let total_blocks = state.read(|ledger| ledger.len()).await?;
    Ok(Json(HealthResponse {
        status: "healthy",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        total_blocks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

async fn get_blockchain(
    State(state): State<ApiState>,
) -> Result<Json<BlockchainResponse>, ApiError> {
    let stats = state.read(|ledger| ledger.stats()).await?;
    let is_intact = stats.is_valid;
    Ok(Json(BlockchainResponse {
        blockchain: BlockchainSummary {
            stats,
            is_intact,
            message: if is_intact {
                INTACT_MESSAGE
            } else {
                COMPROMISED_MESSAGE
            },
        },
    }))
}

async fn verify_blockchain(State(state): State<ApiState>) -> Result<Json<Verification>, ApiError> {
    Ok(Json(state.read(|ledger| ledger.verify()).await?))
}

async fn get_batch_history(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> Result<Json<BatchHistoryResponse>, ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::InvalidInput("Batch code cannot be empty".to_string()));
    }

    let lookup = code.clone();
    let history = state
        .read(move |ledger| ledger.transactions_for_batch(&lookup))
        .await?;

    Ok(Json(BatchHistoryResponse {
        batch_code: code,
        total_records: history.len(),
        message: if history.is_empty() {
            "No blockchain records found for this batch"
        } else {
            "Blockchain history retrieved successfully"
        },
        blockchain_records: history,
    }))
}

async fn get_full_chain(
    State(state): State<ApiState>,
) -> Result<Json<FullChainResponse>, ApiError> {
    let (chain, verification) = state
        .read(|ledger| (ledger.full_chain().to_vec(), ledger.verify()))
        .await?;

    Ok(Json(FullChainResponse {
        total_blocks: chain.len(),
        chain,
        verification,
        message: "Full blockchain retrieved for audit",
    }))
}
