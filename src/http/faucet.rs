//! Public faucet endpoints: funding, history, statistics and eligibility.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::address::WalletAddress;
use crate::chain::TRANSFER_GAS_LIMIT;
use crate::faucet::FundOutcome;
use crate::models::faucet::{
    EligibilityResponse, FaucetStatusResponse, FundRequest, FundResponse, TransactionQuery,
    TransactionView,
};
use crate::reports::{self, FaucetStats, ReportError};
use crate::state::AppState;

use super::HttpError;

const WALLET_FIELD: &str = "wallet_address";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fund", post(fund))
        .route("/stats", get(stats))
        .route("/transactions", get(list_transactions))
        .route("/status", get(status))
        .route("/check/{address}", get(check_eligibility))
}

async fn fund(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    payload: Result<Json<FundRequest>, JsonRejection>,
) -> Result<Json<FundResponse>, HttpError> {
    let Json(request) =
        payload.map_err(|rejection| HttpError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    let Some(wallet_address) = request.wallet_address else {
        return Err(HttpError::field(
            WALLET_FIELD,
            "This field is required.".to_string(),
        ));
    };

    match state.faucet.fund(&wallet_address, remote.ip()).await? {
        FundOutcome::Funded { tx_hash } => Ok(Json(FundResponse {
            transaction_hash: tx_hash,
        })),
        FundOutcome::RateLimited(denial) => Err(HttpError::new(
            StatusCode::TOO_MANY_REQUESTS,
            denial.message().to_string(),
        )
        .with_retry_after(denial.retry_after())),
        FundOutcome::Rejected(err) => Err(HttpError::field(WALLET_FIELD, err.to_string())),
        FundOutcome::Failed { error } => Err(HttpError::new(StatusCode::BAD_REQUEST, error)),
    }
}

async fn stats(State(state): State<AppState>) -> Result<Json<FaucetStats>, HttpError> {
    let stats = reports::collect_stats(state.ledger.as_ref(), Utc::now()).await?;
    Ok(Json(stats))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionView>>, HttpError> {
    let rows = reports::list_transactions(state.ledger.as_ref(), &query.as_raw())
        .await
        .map_err(|err| match err {
            ReportError::Query(err) => HttpError::new(StatusCode::BAD_REQUEST, err.to_string()),
            ReportError::Ledger(err) => HttpError::from(err),
        })?;
    Ok(Json(rows.into_iter().map(TransactionView::from).collect()))
}

async fn status(State(state): State<AppState>) -> Result<Json<FaucetStatusResponse>, HttpError> {
    let balance = state
        .chain
        .sender_balance()
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;

    Ok(Json(FaucetStatusResponse {
        faucet_address: state.chain.sender().to_string(),
        balance_wei: balance.to_string(),
        payout_amount: state.faucet.amount(),
        payout_wei: state.faucet.amount_wei().to_string(),
        gas_limit: TRANSFER_GAS_LIMIT,
        chain_id: state.chain_id,
        wallet_cooldown_minutes: state.faucet_config.wallet_cooldown_minutes,
    }))
}

async fn check_eligibility(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<EligibilityResponse>, HttpError> {
    let wallet = WalletAddress::parse(&address)
        .map_err(|err| HttpError::field(WALLET_FIELD, err.to_string()))?;
    let eligibility = state.faucet.eligibility(wallet).await?;

    let wait_seconds = eligibility.wait.map(|wait| wait.as_secs().max(1));
    let message = match wait_seconds {
        Some(seconds) => format!("Please wait {seconds} seconds before requesting again"),
        None => "Address is eligible for funding".to_string(),
    };
    Ok(Json(EligibilityResponse {
        address: eligibility.wallet.to_string(),
        eligible: eligibility.eligible,
        next_eligible_at: eligibility.next_eligible_at,
        wait_seconds,
        message,
    }))
}
