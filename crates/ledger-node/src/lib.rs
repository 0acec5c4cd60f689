//! HTTP front end for the ledger.
//!
//! Exposes the chain listing, transaction submission and mining over JSON.
//! Every handler that touches the ledger runs on the blocking pool. A mine
//! holds the ledger lock for its whole nonce search, so ledger requests queue
//! behind it without parking runtime workers, and `/health` stays responsive.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{ChainSnapshot, LedgerError, MineOutcome, SharedLedger, Transaction};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub ledger: SharedLedger,
}

#[derive(Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Pending {
    pub length: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Serialize, Deserialize)]
pub struct TxIn {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

#[derive(Serialize, Deserialize)]
pub struct TxAccepted {
    pub accepted: bool,
    pub block_index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResult {
    pub mined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<MineOutcome> for MineResult {
    fn from(outcome: MineOutcome) -> Self {
        match outcome {
            MineOutcome::Mined { index, nonce, hash } => Self {
                mined: true,
                index: Some(index),
                nonce: Some(nonce),
                hash: Some(hash),
                message: None,
            },
            MineOutcome::NothingToMine => Self {
                mined: false,
                index: None,
                nonce: None,
                hash: None,
                message: Some("no pending transactions".to_string()),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Validity {
    pub valid: bool,
    pub error: Option<String>,
}

/// Error returned by handlers; rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ledger(err @ LedgerError::LinkageMismatch { .. }) => {
                (StatusCode::CONFLICT, err.to_string())
            }
            ApiError::Ledger(err @ LedgerError::InvalidProof { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ApiError::Ledger(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        error!(%status, %message, "request failed");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/pending", get(pending))
        .route("/validate", get(validate))
        .route("/tx", post(submit))
        .route("/mine", post(mine))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

/// Run `f` against the shared ledger on the blocking pool.
async fn blocking<R, F>(state: &AppState, f: F) -> Result<R, ApiError>
where
    F: FnOnce(&SharedLedger) -> Result<R, LedgerError> + Send + 'static,
    R: Send + 'static,
{
    let ledger = state.ledger.clone();
    let result = tokio::task::spawn_blocking(move || f(&ledger))
        .await
        .map_err(|e| ApiError::Internal(format!("ledger task failed: {e}")))?;
    Ok(result?)
}

async fn chain(State(state): State<AppState>) -> Result<Json<ChainSnapshot>, ApiError> {
    Ok(Json(blocking(&state, |ledger| ledger.snapshot()).await?))
}

async fn head(State(state): State<AppState>) -> Result<Json<Head>, ApiError> {
    let head = blocking(&state, |ledger| {
        ledger.with(|l| {
            let tip = l.last_block();
            Head {
                height: tip.index,
                hash: tip.hash.clone(),
            }
        })
    })
    .await?;
    Ok(Json(head))
}

async fn pending(State(state): State<AppState>) -> Result<Json<Pending>, ApiError> {
    let transactions = blocking(&state, |ledger| ledger.pending()).await?;
    Ok(Json(Pending {
        length: transactions.len(),
        transactions,
    }))
}

async fn validate(State(state): State<AppState>) -> Result<Json<Validity>, ApiError> {
    // A poisoned lock is a server fault, not a verdict on the chain.
    let verdict = blocking(&state, |ledger| match ledger.validate() {
        Err(LedgerError::Poisoned) => Err(LedgerError::Poisoned),
        verdict => Ok(verdict),
    })
    .await?;
    Ok(Json(Validity {
        valid: verdict.is_ok(),
        error: verdict.err().map(|e| e.to_string()),
    }))
}

async fn submit(
    State(state): State<AppState>,
    Json(tx): Json<TxIn>,
) -> Result<(StatusCode, Json<TxAccepted>), ApiError> {
    let tx = Transaction {
        sender: tx.sender,
        recipient: tx.recipient,
        amount: tx.amount,
    };
    let block_index = blocking(&state, move |ledger| ledger.submit(tx)).await?;
    Ok((
        StatusCode::CREATED,
        Json(TxAccepted {
            accepted: true,
            block_index,
        }),
    ))
}

async fn mine(State(state): State<AppState>) -> Result<Json<MineResult>, ApiError> {
    let outcome = blocking(&state, |ledger| ledger.mine()).await?;
    Ok(Json(outcome.into()))
}
