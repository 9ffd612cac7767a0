//! REST API server for WIPcoin
//!
//! Serves local clients (origination, mining, queries, peer management) and
//! the peer-facing broadcast routes that [`crate::network::HttpTransport`]
//! calls on other nodes.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::network::BlockEnvelope;
use crate::node::{BlockReceipt, Node, Origin};
use crate::transaction::{Endorsement, Transfer};

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
    NotFound(String),
    ResolutionNeeded,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BlockchainError(e) => match e {
                ChainError::RejectedRecord(_)
                | ChainError::InvalidBlock(_)
                | ChainError::InvalidBlockLinkage
                | ChainError::InvalidProofOfWork
                | ChainError::MissingIdentity
                | ChainError::CryptoError(_)
                | ChainError::SerializationError(_) => StatusCode::BAD_REQUEST,
                ChainError::StaleBlock => StatusCode::CONFLICT,
                ChainError::NetworkError(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ResolutionNeeded => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BlockchainError(e) => e.to_string(),
            ApiError::InvalidInput(msg) | ApiError::NotFound(msg) => msg,
            ApiError::ResolutionNeeded => {
                "Chain conflict detected; resolve conflicts before mining".to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct BalanceResponse {
    pub identity: String,
    pub balance: f64,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementRequest {
    pub recipient: String,
    pub place_id: Uuid,
    pub message: String,
    pub amount: f64,
}

#[derive(Deserialize)]
pub struct PeerRequest {
    pub node: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    message: String,
}

impl SuccessResponse {
    fn new(message: &str) -> Json<Self> {
        Json(SuccessResponse {
            message: message.to_string(),
        })
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status, duration and whether the node is waiting on
/// conflict resolution.
async fn logging_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        resolution_needed = node.needs_resolution(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        // Chain and pool queries
        .route("/chain", get(get_chain))
        .route("/balance", get(get_own_balance))
        .route("/balance/:identity", get(get_balance))
        .route("/transactions", get(get_pending_transfers))
        .route("/endorsements", get(get_pending_endorsements))
        // Local origination
        .route("/transaction", post(create_transfer))
        .route("/endorsement", post(create_endorsement))
        .route("/mine", post(mine_block))
        .route("/resolve-conflicts", post(resolve_conflicts))
        // Peer-facing
        .route("/broadcast-transaction", post(receive_transfer))
        .route("/broadcast-endorsement", post(receive_endorsement))
        .route("/broadcast-block", post(receive_block))
        // Peer management
        .route("/nodes", get(get_peers))
        .route("/node", post(add_peer))
        .route("/node/:address", delete(remove_peer))
        // System
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .with_state(node)
        .layer(cors)
}

pub async fn run_api_server(node: Arc<Node>, port: u16) -> Result<(), ChainError> {
    let app = build_api_router(node);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let blocks = node.export_chain().await.len();
    Json(serde_json::json!({
        "status": "healthy",
        "blocks": blocks,
        "resolutionNeeded": node.needs_resolution(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_chain(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.export_chain().await)
}

async fn get_own_balance(State(node): State<Arc<Node>>) -> Result<Json<BalanceResponse>, ApiError> {
    let identity = node.identity().ok_or(ChainError::MissingIdentity)?;
    let balance = node.balance(&identity).await;
    Ok(Json(BalanceResponse { identity, balance }))
}

async fn get_balance(State(node): State<Arc<Node>>, Path(identity): Path<String>) -> Json<BalanceResponse> {
    let balance = node.balance(&identity).await;
    Json(BalanceResponse { identity, balance })
}

async fn get_pending_transfers(State(node): State<Arc<Node>>) -> Json<Vec<Transfer>> {
    Json(node.pending_transfers().await)
}

async fn get_pending_endorsements(State(node): State<Arc<Node>>) -> Json<Vec<Endorsement>> {
    Json(node.pending_endorsements().await)
}

async fn create_transfer(
    State(node): State<Arc<Node>>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Transfer>), ApiError> {
    if request.recipient.is_empty() {
        return Err(ApiError::InvalidInput("Recipient cannot be empty".to_string()));
    }
    let transfer = node.create_transfer(request.recipient, request.amount).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

async fn create_endorsement(
    State(node): State<Arc<Node>>,
    Json(request): Json<EndorsementRequest>,
) -> Result<(StatusCode, Json<Endorsement>), ApiError> {
    if request.recipient.is_empty() {
        return Err(ApiError::InvalidInput("Recipient cannot be empty".to_string()));
    }
    let endorsement = node
        .create_endorsement(request.recipient, request.place_id, request.message, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(endorsement)))
}

async fn mine_block(State(node): State<Arc<Node>>) -> Result<(StatusCode, Json<Block>), ApiError> {
    if node.needs_resolution() {
        return Err(ApiError::ResolutionNeeded);
    }
    let block = node.mine_block().await?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn resolve_conflicts(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let replaced = node.resolve_conflicts().await;
    Json(serde_json::json!({
        "replaced": replaced,
        "length": node.export_chain().await.len()
    }))
}

async fn receive_transfer(
    State(node): State<Arc<Node>>,
    Json(transfer): Json<Transfer>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    node.admit_transfer(transfer, Origin::Peer).await?;
    Ok((StatusCode::CREATED, SuccessResponse::new("Transfer admitted")))
}

async fn receive_endorsement(
    State(node): State<Arc<Node>>,
    Json(endorsement): Json<Endorsement>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    node.admit_endorsement(endorsement, Origin::Peer).await?;
    Ok((StatusCode::CREATED, SuccessResponse::new("Endorsement admitted")))
}

async fn receive_block(
    State(node): State<Arc<Node>>,
    Json(envelope): Json<BlockEnvelope<serde_json::Value>>,
) -> Response {
    match node.receive_block(envelope.block).await {
        BlockReceipt::Added => (StatusCode::CREATED, SuccessResponse::new("Block added")).into_response(),
        BlockReceipt::Ahead => {
            (StatusCode::OK, SuccessResponse::new("Peer is ahead; resolution needed")).into_response()
        }
        BlockReceipt::Rejected(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: e.to_string() }),
        )
            .into_response(),
        BlockReceipt::Behind => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Block is behind the local chain".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn get_peers(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(serde_json::json!({ "nodes": node.peers().await }))
}

async fn add_peer(
    State(node): State<Arc<Node>>,
    Json(request): Json<PeerRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let address = request.node.trim();
    if address.is_empty() {
        return Err(ApiError::InvalidInput("Node address cannot be empty".to_string()));
    }
    if node.add_peer(address).await {
        Ok((StatusCode::CREATED, SuccessResponse::new("Node added")))
    } else {
        Ok((StatusCode::OK, SuccessResponse::new("Node already known")))
    }
}

async fn remove_peer(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if node.remove_peer(&address).await {
        Ok(SuccessResponse::new("Node removed"))
    } else {
        Err(ApiError::NotFound(format!("Node {} is not known", address)))
    }
}
