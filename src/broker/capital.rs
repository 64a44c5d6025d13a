//! Capital.com REST client
//!
//! Sessions are established via `POST /session`; the broker returns the
//! `CST` and `X-SECURITY-TOKEN` tokens in the response headers and
//! expects both echoed on every authenticated call. Tokens expire
//! server-side; any call that comes back 401 triggers exactly one
//! re-login and retry. Concurrent callers hitting an expired session
//! collapse into a single in-flight login.

use super::types::{
    BrokerError, BrokerPosition, DealConfirmation, DealStatus, DealingRule, MarketDetails,
    OpenOrder, RuleUnit,
};
use super::Broker;
use crate::ledger::Direction;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Demo environment base URL
pub const DEMO_API_URL: &str = "https://demo-api-capital.backend-capital.com/api/v1";

/// Configuration for the Capital.com client
#[derive(Debug, Clone)]
pub struct CapitalConfig {
    /// API base URL
    pub base_url: String,
    /// API key sent as `X-CAP-API-KEY`
    pub api_key: String,
    /// Account identifier used at login
    pub identifier: String,
    /// Account password used at login
    pub password: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// How many times to poll a lagging deal confirmation
    pub confirm_retries: u32,
    /// Delay between confirmation polls
    pub confirm_delay: Duration,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            base_url: DEMO_API_URL.to_string(),
            api_key: String::new(),
            identifier: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(10),
            confirm_retries: 5,
            confirm_delay: Duration::from_millis(300),
        }
    }
}

/// Session tokens plus a generation counter for refresh collapsing
struct Session {
    cst: String,
    security_token: String,
    generation: u64,
}

/// Client for the Capital.com trading API
pub struct CapitalClient {
    config: CapitalConfig,
    client: Client,
    session: RwLock<Option<Session>>,
    refresh_gate: Mutex<()>,
}

impl CapitalClient {
    /// Create a new client; the request timeout is baked into the HTTP client
    pub fn new(config: CapitalConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    async fn current_generation(&self) -> u64 {
        let session = self.session.read().await;
        session.as_ref().map(|s| s.generation).unwrap_or(0)
    }

    /// Perform the login call and return the session token pair
    async fn login(&self) -> Result<(String, String), BrokerError> {
        let url = format!("{}/session", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-CAP-API-KEY", &self.config.api_key)
            .json(&SessionRequest {
                identifier: &self.config.identifier,
                password: &self.config.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::AuthFailed(format!("{status} - {body}")));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        match (header("CST"), header("X-SECURITY-TOKEN")) {
            (Some(cst), Some(token)) => Ok((cst, token)),
            _ => Err(BrokerError::AuthFailed(
                "login response carried no session tokens".to_string(),
            )),
        }
    }

    /// Replace the session unless someone else already refreshed it
    ///
    /// `stale_generation` is the generation the caller observed failing;
    /// a session newer than that is reused as-is.
    async fn refresh_session(&self, stale_generation: u64) -> Result<(), BrokerError> {
        let _gate = self.refresh_gate.lock().await;

        {
            let session = self.session.read().await;
            if let Some(s) = &*session {
                if s.generation > stale_generation {
                    return Ok(());
                }
            }
        }

        let (cst, security_token) = self.login().await?;
        let mut slot = self.session.write().await;
        let generation = stale_generation + 1;
        *slot = Some(Session {
            cst,
            security_token,
            generation,
        });
        tracing::info!(generation, "Broker session established");
        Ok(())
    }

    /// Current session tokens, logging in first when none exist
    async fn session_tokens(&self) -> Result<(String, String, u64), BrokerError> {
        {
            let session = self.session.read().await;
            if let Some(s) = &*session {
                return Ok((s.cst.clone(), s.security_token.clone(), s.generation));
            }
        }
        self.refresh_session(0).await?;
        let session = self.session.read().await;
        let s = session.as_ref().ok_or(BrokerError::SessionExpired)?;
        Ok((s.cst.clone(), s.security_token.clone(), s.generation))
    }

    /// Send an authenticated request, retrying once through a re-login on 401
    async fn send_authed<F>(&self, build: F) -> Result<Response, BrokerError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let (cst, token, generation) = self.session_tokens().await?;
        let response = self.attach_auth(build(&self.client), &cst, &token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.refresh_session(generation).await?;
        let (cst, token, _) = self.session_tokens().await?;
        let response = self.attach_auth(build(&self.client), &cst, &token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BrokerError::SessionExpired);
        }
        Ok(response)
    }

    fn attach_auth(&self, request: RequestBuilder, cst: &str, token: &str) -> RequestBuilder {
        request
            .header("X-CAP-API-KEY", &self.config.api_key)
            .header("CST", cst)
            .header("X-SECURITY-TOKEN", token)
    }

    async fn into_json<T: DeserializeOwned>(response: Response) -> Result<T, BrokerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Poll a deal confirmation; confirmations can lag the triggering call
    async fn confirm(&self, deal_reference: &str) -> Result<DealConfirmation, BrokerError> {
        for attempt in 0..=self.config.confirm_retries {
            let url = format!("{}/confirms/{}", self.config.base_url, deal_reference);
            let response = self.send_authed(|client| client.get(&url)).await?;

            if response.status() == StatusCode::NOT_FOUND {
                tracing::debug!(deal_reference, attempt, "Confirmation not ready yet");
                tokio::time::sleep(self.config.confirm_delay).await;
                continue;
            }

            let confirm: ConfirmResponse = Self::into_json(response).await?;
            return Ok(confirm.into_confirmation(deal_reference));
        }
        Err(BrokerError::DealNotConfirmed(deal_reference.to_string()))
    }
}

#[async_trait]
impl Broker for CapitalClient {
    async fn authenticate(&self) -> Result<(), BrokerError> {
        let stale = self.current_generation().await;
        self.refresh_session(stale).await
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let url = format!("{}/positions", self.config.base_url);
        let response = self.send_authed(|client| client.get(&url)).await?;
        let listed: PositionsResponse = Self::into_json(response).await?;

        let mut positions = Vec::with_capacity(listed.positions.len());
        for envelope in listed.positions {
            let Some(direction) = Direction::from_broker_code(&envelope.position.direction) else {
                tracing::warn!(
                    epic = %envelope.market.epic,
                    direction = %envelope.position.direction,
                    "Skipping position with unknown direction"
                );
                continue;
            };
            positions.push(BrokerPosition {
                deal_id: envelope.position.deal_id,
                epic: envelope.market.epic,
                direction,
                size: envelope.position.size,
                level: envelope.position.level,
                currency: envelope.position.currency.unwrap_or_else(|| "USD".to_string()),
                leverage: envelope.position.leverage.unwrap_or(Decimal::ONE),
                stop_level: envelope.position.stop_level,
                profit_level: envelope.position.profit_level,
                upl: envelope.position.upl,
                bid: envelope.market.bid,
                offer: envelope.market.offer,
            });
        }
        Ok(positions)
    }

    async fn open_position(&self, order: &OpenOrder) -> Result<DealConfirmation, BrokerError> {
        let url = format!("{}/positions", self.config.base_url);
        let body = CreatePositionRequest {
            epic: &order.epic,
            direction: order.direction.broker_code(),
            size: order.size,
            order_type: "MARKET",
            stop_level: order.stop_level,
            profit_level: order.profit_level,
            currency_code: &order.currency_code,
        };
        let response = self
            .send_authed(|client| client.post(&url).json(&body))
            .await?;
        let created: DealReferenceResponse = Self::into_json(response).await?;
        self.confirm(&created.deal_reference).await
    }

    async fn close_position(&self, deal_id: &str) -> Result<DealConfirmation, BrokerError> {
        let url = format!("{}/positions/{}", self.config.base_url, deal_id);
        let response = self.send_authed(|client| client.delete(&url)).await?;
        let closed: DealReferenceResponse = Self::into_json(response).await?;
        self.confirm(&closed.deal_reference).await
    }

    async fn update_position(
        &self,
        deal_id: &str,
        stop_level: Option<Decimal>,
        profit_level: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let url = format!("{}/positions/{}", self.config.base_url, deal_id);
        let body = UpdatePositionRequest {
            stop_level,
            profit_level,
        };
        let response = self
            .send_authed(|client| client.put(&url).json(&body))
            .await?;
        let _: DealReferenceResponse = Self::into_json(response).await?;
        Ok(())
    }

    async fn market_details(&self, epic: &str) -> Result<MarketDetails, BrokerError> {
        let url = format!("{}/markets/{}", self.config.base_url, epic);
        let response = self.send_authed(|client| client.get(&url)).await?;
        let details: MarketDetailsResponse = Self::into_json(response).await?;

        Ok(MarketDetails {
            epic: epic.to_string(),
            min_deal_size: details.dealing_rules.min_deal_size.value,
            min_stop_distance: details.dealing_rules.min_stop_or_profit_distance.into_rule(),
            max_stop_distance: details
                .dealing_rules
                .max_stop_or_profit_distance
                .map(WireRule::into_rule),
            bid: details.snapshot.bid,
            offer: details.snapshot.offer,
            decimal_places: details.snapshot.decimal_places,
        })
    }
}

// Wire types

#[derive(Serialize)]
struct SessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct PositionsResponse {
    positions: Vec<PositionEnvelope>,
}

#[derive(Deserialize)]
struct PositionEnvelope {
    position: WirePosition,
    market: WireMarket,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePosition {
    deal_id: String,
    direction: String,
    size: Decimal,
    level: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    leverage: Option<Decimal>,
    #[serde(default)]
    stop_level: Option<Decimal>,
    #[serde(default)]
    profit_level: Option<Decimal>,
    #[serde(default)]
    upl: Option<Decimal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMarket {
    epic: String,
    bid: Decimal,
    offer: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePositionRequest<'a> {
    epic: &'a str,
    direction: &'a str,
    size: Decimal,
    #[serde(rename = "type")]
    order_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_level: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profit_level: Option<Decimal>,
    currency_code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePositionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_level: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profit_level: Option<Decimal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DealReferenceResponse {
    deal_reference: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    deal_status: String,
    #[serde(default)]
    deal_id: Option<String>,
    #[serde(default)]
    affected_deals: Vec<AffectedDeal>,
    #[serde(default)]
    level: Option<Decimal>,
    #[serde(default)]
    profit: Option<Decimal>,
    #[serde(default)]
    reject_reason: Option<String>,
}

impl ConfirmResponse {
    fn into_confirmation(self, deal_reference: &str) -> DealConfirmation {
        let status = if self.deal_status == "ACCEPTED" {
            DealStatus::Accepted
        } else {
            DealStatus::Rejected
        };
        let deal_id = self
            .deal_id
            .or_else(|| self.affected_deals.into_iter().next().map(|d| d.deal_id))
            .unwrap_or_default();
        DealConfirmation {
            deal_reference: deal_reference.to_string(),
            deal_id,
            status,
            level: self.level,
            profit: self.profit,
            reason: self.reject_reason,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AffectedDeal {
    deal_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketDetailsResponse {
    dealing_rules: WireDealingRules,
    snapshot: WireSnapshot,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDealingRules {
    min_deal_size: WireRule,
    min_stop_or_profit_distance: WireRule,
    #[serde(default)]
    max_stop_or_profit_distance: Option<WireRule>,
}

#[derive(Deserialize)]
struct WireRule {
    unit: String,
    value: Decimal,
}

impl WireRule {
    fn into_rule(self) -> DealingRule {
        let unit = if self.unit == "PERCENTAGE" {
            RuleUnit::Percentage
        } else {
            RuleUnit::Points
        };
        DealingRule {
            unit,
            value: self.value,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSnapshot {
    bid: Decimal,
    offer: Decimal,
    #[serde(default = "default_decimal_places")]
    decimal_places: u32,
}

fn default_decimal_places() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_positions_response() {
        let json = r#"{
            "positions": [
                {
                    "position": {
                        "dealId": "DIAAABBCC",
                        "direction": "BUY",
                        "size": 10000,
                        "level": 1.0850,
                        "currency": "USD",
                        "leverage": 30,
                        "stopLevel": 1.0820,
                        "upl": 4.5
                    },
                    "market": {
                        "epic": "EURUSD",
                        "bid": 1.0862,
                        "offer": 1.0864
                    }
                }
            ]
        }"#;
        let parsed: PositionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.positions.len(), 1);
        let envelope = &parsed.positions[0];
        assert_eq!(envelope.position.deal_id, "DIAAABBCC");
        assert_eq!(envelope.position.stop_level, Some(dec!(1.0820)));
        assert_eq!(envelope.position.profit_level, None);
        assert_eq!(envelope.market.epic, "EURUSD");
    }

    #[test]
    fn test_parse_confirmation() {
        let json = r#"{
            "dealStatus": "ACCEPTED",
            "affectedDeals": [{"dealId": "DIAAA111", "status": "OPENED"}],
            "level": 1.0851,
            "profit": null
        }"#;
        let parsed: ConfirmResponse = serde_json::from_str(json).unwrap();
        let confirmation = parsed.into_confirmation("ref-1");
        assert_eq!(confirmation.status, DealStatus::Accepted);
        assert_eq!(confirmation.deal_id, "DIAAA111");
        assert_eq!(confirmation.level, Some(dec!(1.0851)));
    }

    #[test]
    fn test_parse_rejected_confirmation() {
        let json = r#"{"dealStatus": "REJECTED", "rejectReason": "INSUFFICIENT_FUNDS"}"#;
        let parsed: ConfirmResponse = serde_json::from_str(json).unwrap();
        let confirmation = parsed.into_confirmation("ref-2");
        assert_eq!(confirmation.status, DealStatus::Rejected);
        assert_eq!(confirmation.reason.as_deref(), Some("INSUFFICIENT_FUNDS"));
    }

    #[test]
    fn test_parse_market_details() {
        let json = r#"{
            "dealingRules": {
                "minDealSize": {"unit": "AMOUNT", "value": 100},
                "minStopOrProfitDistance": {"unit": "PERCENTAGE", "value": 0.01},
                "maxStopOrProfitDistance": {"unit": "PERCENTAGE", "value": 60}
            },
            "snapshot": {"bid": 1.0862, "offer": 1.0864, "decimalPlaces": 5}
        }"#;
        let parsed: MarketDetailsResponse = serde_json::from_str(json).unwrap();
        let rule = parsed.dealing_rules.min_stop_or_profit_distance.into_rule();
        assert_eq!(rule.unit, RuleUnit::Percentage);
        assert_eq!(rule.value, dec!(0.01));
        assert_eq!(parsed.snapshot.decimal_places, 5);
    }
}
