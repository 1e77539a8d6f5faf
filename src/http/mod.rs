use std::collections::BTreeMap;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::ledger::LedgerError;
use crate::state::AppState;

mod faucet;

pub fn router(state: AppState) -> Router {
    // Browser wallets call the faucet directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let faucet_router = faucet::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/api", faucet_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Path normalization has to run before routing, so it wraps the router
/// rather than being one of its layers.
pub fn with_trailing_slash_support(router: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

async fn health_live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .ledger
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    Ok(Json(ReadyResponse {
        status: "ready",
        chain_id: state.chain_id,
        faucet_address: state.chain.sender().to_string(),
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    chain_id: u64,
    faucet_address: String,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    body: ErrorBody,
    retry_after: Option<Duration>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        Self {
            status,
            body: ErrorBody::Message { error: message },
            retry_after: None,
        }
    }

    /// 400 with the message attached to a single input field.
    pub fn field(field: &'static str, message: String) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field, vec![message]);
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Fields(fields),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }
}

impl From<LedgerError> for HttpError {
    fn from(err: LedgerError) -> Self {
        error!("Ledger unavailable: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Transaction ledger is unavailable".to_string(),
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error {}: {:?}", self.status, self.body);
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(wait) = self.retry_after {
            // Whole seconds, rounded up so clients never retry early
            let seconds = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds.max(1)));
        }
        response
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ErrorBody {
    Message { error: String },
    Fields(BTreeMap<&'static str, Vec<String>>),
}
