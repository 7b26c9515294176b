//! Concrete tool adapters
//!
//! Local adapters for the workflow steps that do not require a remote MCP
//! session: token inspection, the service pricing catalog, query cost
//! calculation, and settlement over HTTP. Remote discovery and token issuance
//! stay behind whatever [`Tool`] implementations the embedding service
//! registers for them.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::DateTime;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::{Tool, ToolResult};

/// Decodes a JWT's header and payload without signature verification.
///
/// For analysis only: the inspector role uses this to classify issued tokens
/// as KYA or payment tokens and to surface their claims.
#[derive(Debug, Default, Clone)]
pub struct DecodeJwt;

impl DecodeJwt {
    fn decode_segment(segment: &str) -> std::result::Result<Value, String> {
        let trimmed = segment.trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| format!("invalid base64: {e}"))?;
        serde_json::from_slice(&bytes).map_err(|e| format!("invalid JSON: {e}"))
    }

    fn render_timestamp(value: &Value) -> Option<String> {
        let secs = value.as_i64()?;
        let ts = DateTime::from_timestamp(secs, 0)?;
        Some(ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    }
}

#[async_trait]
impl Tool for DecodeJwt {
    fn name(&self) -> &str {
        "decode-jwt"
    }

    fn description(&self) -> &str {
        "Decode a JWT's header and payload without verifying the signature"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string", "description": "The JWT to decode"}
            },
            "required": ["token"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let token = match arguments.get("token").and_then(|v| v.as_str()) {
            Some(token) => token,
            None => return Ok(ToolResult::error("missing required argument 'token'")),
        };

        let mut parts = token.split('.');
        let (header, payload) = match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(_signature)) => (h, p),
            _ => return Ok(ToolResult::error("token is not a three-part JWT")),
        };

        let header = match Self::decode_segment(header) {
            Ok(header) => header,
            Err(e) => return Ok(ToolResult::error(format!("failed to decode header: {e}"))),
        };
        let mut payload = match Self::decode_segment(payload) {
            Ok(payload) => payload,
            Err(e) => return Ok(ToolResult::error(format!("failed to decode payload: {e}"))),
        };

        if let Some(object) = payload.as_object_mut() {
            if let Some(readable) = object.get("iat").and_then(Self::render_timestamp) {
                object.insert("iat_readable".to_string(), Value::String(readable));
            }
            if let Some(readable) = object.get("exp").and_then(Self::render_timestamp) {
                object.insert("exp_readable".to_string(), Value::String(readable));
            }
        }

        Ok(ToolResult::success(json!({
            "header": header,
            "payload": payload,
        })))
    }
}

/// Per-query prices for the seller's tools, in USD.
pub fn pricing_sheet() -> Vec<(&'static str, f64)> {
    vec![
        ("benzinga", 0.1),
        ("iheartcats-ai", 0.01),
        ("iheartdogs-ai", 0.01),
        ("lifestyle-news", 0.1),
        ("one-green-planet", 0.01),
        ("real-time-search", 0.0),
        ("research-papers-search", 0.003),
        ("sports-news", 0.004),
        ("stock-market-data", 0.007),
        ("wish-tv-ai", 0.004),
    ]
}

/// Returns the seller's resource and pricing catalog.
#[derive(Debug, Default, Clone)]
pub struct PricingCatalog;

#[async_trait]
impl Tool for PricingCatalog {
    fn name(&self) -> &str {
        "get-service-pricing"
    }

    fn description(&self) -> &str {
        "Fetch the resource and pricing catalog for the connected service"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service_id": {"type": "string", "description": "Seller service id"}
            }
        })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult> {
        let entries: Vec<Value> = pricing_sheet()
            .into_iter()
            .map(|(tool_name, price)| {
                json!({
                    "toolName": tool_name,
                    "pricePerQuery": price,
                    "currency": "USD",
                })
            })
            .collect();
        Ok(ToolResult::success(json!({ "tools": entries })))
    }
}

/// Calculates the estimated cost of running a query against a priced tool.
#[derive(Debug, Default, Clone)]
pub struct QueryPricer;

#[async_trait]
impl Tool for QueryPricer {
    fn name(&self) -> &str {
        "calculate-query-price"
    }

    fn description(&self) -> &str {
        "Estimate the cost of a query: per-query price times expected calls"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Priced tool to use"},
                "calls": {"type": "integer", "description": "Expected number of calls", "minimum": 1}
            },
            "required": ["tool_name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let tool_name = match arguments.get("tool_name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => return Ok(ToolResult::error("missing required argument 'tool_name'")),
        };
        let calls = arguments
            .get("calls")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1);

        let price = pricing_sheet()
            .into_iter()
            .find(|(name, _)| *name == tool_name)
            .map(|(_, price)| price);
        let price = match price {
            Some(price) => price,
            None => {
                return Ok(ToolResult::error(format!(
                    "no pricing entry for tool '{tool_name}'"
                )))
            }
        };

        Ok(ToolResult::success(json!({
            "tool_name": tool_name,
            "price_per_query": price,
            "calls": calls,
            "total": price * calls as f64,
            "currency": "USD",
        })))
    }
}

/// Charges a payment token through the seller's settlement endpoint.
#[derive(Debug, Clone)]
pub struct ChargeToken {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChargeToken {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Tool for ChargeToken {
    fn name(&self) -> &str {
        "charge-token"
    }

    fn description(&self) -> &str {
        "Charge a payment token with the specified amount"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": {"type": "string", "description": "The payment token to charge"},
                "charge_amount": {"type": "string", "description": "Amount to charge, e.g. \"0.01\""}
            },
            "required": ["token", "charge_amount"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let token = match arguments.get("token").and_then(|v| v.as_str()) {
            Some(token) => token,
            None => return Ok(ToolResult::error("missing required argument 'token'")),
        };
        let amount = match arguments.get("charge_amount").and_then(|v| v.as_str()) {
            Some(amount) => amount,
            None => {
                return Ok(ToolResult::error(
                    "missing required argument 'charge_amount'",
                ))
            }
        };

        let url = format!("{}/api/v1/tokens/charge", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("skyfire-api-key", &self.api_key)
            .json(&json!({ "token": token, "chargeAmount": amount }))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                Ok(ToolResult::success(body))
            }
            Ok(response) => Ok(ToolResult::error(format!(
                "charge endpoint returned {}",
                response.status()
            ))),
            Err(e) => Ok(ToolResult::error(format!("charge request failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use pretty_assertions::assert_eq;

    fn jwt(payload: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.sig")
    }

    #[tokio::test]
    async fn test_decode_jwt_renders_claims() {
        let token = jwt(json!({"ssi": "seller-1", "env": "test", "iat": 1700000000}));
        let result = DecodeJwt
            .execute(json!({"token": token}))
            .await
            .unwrap();

        assert!(!result.is_error());
        assert_eq!(result.output["header"]["typ"], "JWT");
        assert_eq!(result.output["payload"]["ssi"], "seller-1");
        assert_eq!(
            result.output["payload"]["iat_readable"],
            "2023-11-14 22:13:20 UTC"
        );
    }

    #[tokio::test]
    async fn test_decode_jwt_rejects_malformed_tokens() {
        let result = DecodeJwt
            .execute(json!({"token": "not-a-jwt"}))
            .await
            .unwrap();
        assert!(result.is_error());

        let result = DecodeJwt
            .execute(json!({"token": "a.%%%.c"}))
            .await
            .unwrap();
        assert!(result.error.unwrap().contains("failed to decode header"));

        let result = DecodeJwt.execute(json!({})).await.unwrap();
        assert!(result.error.unwrap().contains("missing required argument"));
    }

    #[tokio::test]
    async fn test_pricing_catalog_lists_all_tools() {
        let result = PricingCatalog.execute(json!({})).await.unwrap();
        let tools = result.output["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 10);
        assert!(tools
            .iter()
            .any(|t| t["toolName"] == "real-time-search" && t["pricePerQuery"] == 0.0));
    }

    #[tokio::test]
    async fn test_query_pricer_multiplies_calls() {
        let result = QueryPricer
            .execute(json!({"tool_name": "sports-news", "calls": 3}))
            .await
            .unwrap();
        assert_eq!(result.output["price_per_query"], 0.004);
        let total = result.output["total"].as_f64().unwrap();
        assert!((total - 0.012).abs() < 1e-9);
        assert_eq!(result.output["currency"], "USD");
    }

    #[tokio::test]
    async fn test_query_pricer_defaults_to_one_call() {
        let result = QueryPricer
            .execute(json!({"tool_name": "stock-market-data"}))
            .await
            .unwrap();
        assert_eq!(result.output["calls"], 1);
        assert_eq!(result.output["total"], 0.007);
    }

    #[tokio::test]
    async fn test_query_pricer_unknown_tool() {
        let result = QueryPricer
            .execute(json!({"tool_name": "nonexistent"}))
            .await
            .unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_charge_token_validates_arguments() {
        let tool = ChargeToken::new("http://localhost:0", "key");
        assert_eq!(tool.name(), "charge-token");

        let result = tool.execute(json!({})).await.unwrap();
        assert!(result.error.unwrap().contains("'token'"));

        let result = tool.execute(json!({"token": "t"})).await.unwrap();
        assert!(result.error.unwrap().contains("'charge_amount'"));
    }
}
