//! HTTP client for the ledger API: tick info, contract queries, broadcasts.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RpcError;

/// A read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub contract_index: u32,
    pub input_type: u16,
    pub input_size: u16,
    /// Payload as base64
    pub request_data: String,
}

/// Acknowledgement of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub peers_broadcasted: u64,
    pub transaction_id: Option<String>,
    pub encoded_transaction: Option<String>,
}

/// The three network operations the dispatcher needs.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn current_tick(&self) -> Result<u32, RpcError>;

    /// Returns the base64 response data; empty when the contract returned nothing.
    async fn query_contract(&self, request: &QueryRequest) -> Result<String, RpcError>;

    async fn broadcast(&self, encoded_transaction: &str) -> Result<BroadcastReceipt, RpcError>;
}

/// `LedgerClient` over the public HTTP API.
pub struct RpcClient {
    client: reqwest::Client,
    base_url: String,
}

impl RpcClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Network(format!("building HTTP client: {}", e)))?;
        Ok(RpcClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn read_json(&self, resp: reqwest::Response) -> Result<Value, RpcError> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RpcError::Network(format!("reading response body: {}", e)))?;
        debug!(status = %status, bytes = text.len(), "ledger API response");
        classify_response(status.as_u16(), &text)
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn current_tick(&self) -> Result<u32, RpcError> {
        let resp = self.client.get(self.endpoint("tick-info")).send().await?;
        let body = self.read_json(resp).await?;
        parse_tick_info_response(&body)
    }

    async fn query_contract(&self, request: &QueryRequest) -> Result<String, RpcError> {
        let resp = self
            .client
            .post(self.endpoint("querySmartContract"))
            .json(&build_query_request(request))
            .send()
            .await?;
        let body = self.read_json(resp).await?;
        parse_query_response(&body)
    }

    async fn broadcast(&self, encoded_transaction: &str) -> Result<BroadcastReceipt, RpcError> {
        let resp = self
            .client
            .post(self.endpoint("broadcast-transaction"))
            .json(&json!({ "encodedTransaction": encoded_transaction }))
            .send()
            .await?;
        let body = self.read_json(resp).await?;
        parse_broadcast_response(&body)
    }
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

pub(crate) fn build_query_request(request: &QueryRequest) -> Value {
    json!({
        "contractIndex": request.contract_index,
        "inputType": request.input_type,
        "inputSize": request.input_size,
        "requestData": request.request_data,
    })
}

/// Map an HTTP status and body to JSON or an error.
///
/// 4xx means the network looked at the request and refused it; 5xx and
/// anything unreadable are transport problems.
pub(crate) fn classify_response(status: u16, body: &str) -> Result<Value, RpcError> {
    match status {
        200..=299 => serde_json::from_str(body)
            .map_err(|e| RpcError::InvalidResponse(format!("invalid JSON: {}", e))),
        400..=499 => Err(RpcError::Rejected(format!(
            "HTTP {}: {}",
            status,
            error_message(body)
        ))),
        _ => Err(RpcError::Network(format!("HTTP {}: {}", status, error_message(body)))),
    }
}

/// Pull a readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub(crate) fn parse_tick_info_response(response: &Value) -> Result<u32, RpcError> {
    response
        .get("tickInfo")
        .and_then(|info| info.get("tick"))
        .and_then(Value::as_u64)
        .and_then(|tick| u32::try_from(tick).ok())
        .ok_or_else(|| RpcError::InvalidResponse("missing or invalid 'tickInfo.tick'".to_string()))
}

pub(crate) fn parse_query_response(response: &Value) -> Result<String, RpcError> {
    match response.get("responseData") {
        Some(Value::String(data)) => Ok(data.clone()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(other) => Err(RpcError::InvalidResponse(format!(
            "'responseData' should be a string, got {}",
            other
        ))),
    }
}

pub(crate) fn parse_broadcast_response(response: &Value) -> Result<BroadcastReceipt, RpcError> {
    let peers = response
        .get("peersBroadcasted")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::InvalidResponse("missing 'peersBroadcasted'".to_string()))?;

    if peers == 0 {
        return Err(RpcError::Rejected("no peers accepted the transaction".to_string()));
    }

    Ok(BroadcastReceipt {
        peers_broadcasted: peers,
        transaction_id: response
            .get("transactionId")
            .and_then(Value::as_str)
            .map(str::to_string),
        encoded_transaction: response
            .get("encodedTransaction")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- tick-info ----

    #[test]
    fn parse_tick_info() {
        let response = json!({
            "tickInfo": {
                "tick": 15234567,
                "duration": 1,
                "epoch": 140,
                "initialTickOfEpoch": 15200000
            }
        });
        assert_eq!(parse_tick_info_response(&response), Ok(15234567));
    }

    #[test]
    fn parse_tick_info_missing() {
        let err = parse_tick_info_response(&json!({ "status": "ok" })).unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse(_)));
    }

    // ---- querySmartContract ----

    #[test]
    fn query_request_format() {
        let body = build_query_request(&QueryRequest {
            contract_index: 4,
            input_type: 1,
            input_size: 8,
            request_data: "AQAAAAAAAAA=".to_string(),
        });
        assert_eq!(body["contractIndex"], 4);
        assert_eq!(body["inputType"], 1);
        assert_eq!(body["inputSize"], 8);
        assert_eq!(body["requestData"], "AQAAAAAAAAA=");
    }

    #[test]
    fn parse_query_data() {
        let response = json!({ "responseData": "ZAAAAAAAAAA=" });
        assert_eq!(parse_query_response(&response), Ok("ZAAAAAAAAAA=".to_string()));
        assert_eq!(parse_query_response(&json!({})), Ok(String::new()));
        assert!(parse_query_response(&json!({ "responseData": 5 })).is_err());
    }

    // ---- broadcast-transaction ----

    #[test]
    fn parse_broadcast_accepted() {
        let response = json!({
            "peersBroadcasted": 3,
            "encodedTransaction": "AAAA",
            "transactionId": "abcdefgh"
        });
        let receipt = parse_broadcast_response(&response).unwrap();
        assert_eq!(receipt.peers_broadcasted, 3);
        assert_eq!(receipt.transaction_id.as_deref(), Some("abcdefgh"));
    }

    #[test]
    fn parse_broadcast_no_peers() {
        let response = json!({ "peersBroadcasted": 0, "encodedTransaction": "AAAA" });
        assert!(matches!(
            parse_broadcast_response(&response),
            Err(RpcError::Rejected(_))
        ));
    }

    // ---- status classification ----

    #[test]
    fn client_error_is_rejection() {
        let err = classify_response(400, r#"{"code":3,"message":"invalid input size"}"#).unwrap_err();
        assert_eq!(err, RpcError::Rejected("HTTP 400: invalid input size".to_string()));
    }

    #[test]
    fn server_error_is_network() {
        let err = classify_response(503, "upstream unavailable").unwrap_err();
        assert_eq!(err, RpcError::Network("HTTP 503: upstream unavailable".to_string()));
    }

    #[test]
    fn garbage_body_is_invalid_response() {
        assert!(matches!(
            classify_response(200, "<html>"),
            Err(RpcError::InvalidResponse(_))
        ));
    }
}
