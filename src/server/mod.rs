//! Webhook listener
//!
//! One POST route receives every alert. Higher-timeframe alerts update
//! the regime map and return immediately; everything else is validated
//! and handed to the admission gate. Malformed payloads are the
//! caller's problem (400); engine failures surface as 502 so the alert
//! source can retry.

use crate::engine::{AdmissionGate, EngineError, TradeSignal};
use crate::ledger::{Direction, StrategySource};
use crate::regime::{Regime, RegimeTracker};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for the webhook handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub regimes: Arc<RegimeTracker>,
    /// `timeframe` value that marks the regime channel
    pub regime_timeframe: String,
}

/// Inbound alert payload
///
/// Field aliases tolerate the spellings the alert templates have used
/// over time.
#[derive(Debug, Deserialize)]
pub struct SignalPayload {
    pub action: String,
    pub symbol: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default, alias = "lossAmountUsd")]
    pub loss_amount_usd: Option<Decimal>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Handler error mapped onto an HTTP status
enum ApiError {
    BadRequest(String),
    Engine(EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Engine(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Webhook listener bound");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<SignalPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }

    // Higher-timeframe channel: regime update only, ledger untouched
    if payload.timeframe.as_deref() == Some(state.regime_timeframe.as_str()) {
        let Some(regime) = parse_regime(&payload.action) else {
            return Err(ApiError::BadRequest(format!(
                "unknown regime marker '{}'",
                payload.action
            )));
        };
        state.regimes.set(&payload.symbol, regime).await;
        return Ok(Json(json!({ "status": "regime_updated" })));
    }

    let direction = match payload.action.as_str() {
        "buy" => Direction::Long,
        "sell" => Direction::Short,
        other => {
            return Err(ApiError::BadRequest(format!("unknown action '{other}'")));
        }
    };
    let quantity = payload.quantity.unwrap_or(Decimal::ZERO);
    if quantity <= Decimal::ZERO {
        return Err(ApiError::BadRequest(
            "quantity must be greater than zero".to_string(),
        ));
    }

    let signal = TradeSignal {
        id: uuid::Uuid::new_v4(),
        symbol: payload.symbol,
        direction,
        quantity,
        source: StrategySource::from_tag(payload.source.as_deref().unwrap_or("")),
        loss_usd: payload.loss_amount_usd,
    };

    let decision = state.gate.handle(signal).await.map_err(ApiError::Engine)?;
    let body = serde_json::to_value(&decision).expect("decision serialization is infallible");
    Ok(Json(body))
}

/// Parse a regime marker from the alert's action field
fn parse_regime(action: &str) -> Option<Regime> {
    match action {
        "consolidation" | "consolidating" => Some(Regime::Consolidating),
        "trending" | "trend" => Some(Regime::Trending),
        _ => None,
    }
}
