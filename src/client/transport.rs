//! RPC Transport
//!
//! Sends a [`RemoteCall`] to the appliance and returns the raw JSON result.
//! Remote error objects are classified here; network failures become
//! [`ConnectionError`]s. The transport never retries.

use crate::client::errors::{
    ApiError, ConnectionError, ERR_CODE_NOT_AUTHENTICATED, ERR_CODE_NOT_AUTHORIZED,
};
use crate::client::rpc::{RemoteCall, RpcResponse};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

// =============================================================================
// Transport Port
// =============================================================================

/// A session able to carry remote calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single call and return its `result` value
    async fn call(&self, call: RemoteCall) -> Result<Value>;

    /// Host the session is bound to, for diagnostics
    fn host(&self) -> &str;
}

/// Turn a decoded response into a result, checking it answers `expected_id`
pub fn decode_response(response: RpcResponse, expected_id: u64) -> Result<Value> {
    if let Some(id) = response.id {
        if id != expected_id {
            return Err(Error::Protocol(format!(
                "response id {} does not match request id {}",
                id, expected_id
            )));
        }
    }

    if let Some(raw) = response.error {
        return Err(Error::Api(ApiError::from_raw(&raw)));
    }

    Ok(response.result.unwrap_or(Value::Null))
}

/// Decode an HTTP body into a call result.
///
/// A body that is not a JSON-RPC envelope is classified by HTTP status:
/// 401 and 403 (typically from a proxy in front of the appliance) map onto
/// the auth taxonomy, anything else is a protocol fault.
pub fn decode_body(method: &str, status: StatusCode, body: &[u8], expected_id: u64) -> Result<Value> {
    match serde_json::from_slice::<RpcResponse>(body) {
        Ok(decoded) => decode_response(decoded, expected_id),
        Err(e) => {
            let code = match status {
                StatusCode::UNAUTHORIZED => ERR_CODE_NOT_AUTHENTICATED,
                StatusCode::FORBIDDEN => ERR_CODE_NOT_AUTHORIZED,
                _ => {
                    return Err(Error::Protocol(format!(
                        "unexpected response to {} (HTTP {}): {}",
                        method, status, e
                    )))
                }
            };
            Err(Error::Api(ApiError::new(code, format!("HTTP {} from {}", status, method))))
        }
    }
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// JSON-RPC over HTTPS using an API key
#[derive(Debug)]
pub struct HttpTransport {
    host: String,
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| Error::Configuration(format!("Invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid HTTP client settings: {}", e)))?;

        Ok(Self {
            host: config.host.clone(),
            endpoint: config.endpoint(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    fn connection_error(&self, err: reqwest::Error) -> Error {
        Error::Connection(ConnectionError::new(self.host.clone(), Some(Box::new(err))))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, call: RemoteCall) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = call.method.clone();
        let request = call.into_request(id);

        trace!("-> {} #{}", method, id);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.connection_error(e))?;

        debug!("<- {} #{} (HTTP {})", method, id, status);
        decode_body(&method, status, &body, id)
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn response(json: Value) -> RpcResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_decode_result() {
        let value = decode_response(response(json!({"id": 4, "result": {"servers": 4}})), 4).unwrap();
        assert_eq!(value, json!({"servers": 4}));
    }

    #[test]
    fn test_decode_missing_result_is_null() {
        let value = decode_response(response(json!({"id": 4})), 4).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_decode_classifies_error() {
        let err = decode_response(
            response(json!({"id": 9, "error": {"code": 3, "message": "nfs not found"}})),
            9,
        )
        .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "TrueNAS API error 3: nfs not found");
    }

    #[test]
    fn test_decode_rejects_mismatched_id() {
        let err = decode_response(response(json!({"id": 2, "result": true})), 3).unwrap_err();
        assert_matches!(err, Error::Protocol(msg) if msg.contains("does not match"));
    }

    #[test]
    fn test_proxy_auth_status_is_classified() {
        let html = b"<html><body>401 Authorization Required</body></html>";
        let err = decode_body("nfs.config", StatusCode::UNAUTHORIZED, html, 1).unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(
            err.to_string(),
            "TrueNAS API error 1: HTTP 401 Unauthorized from nfs.config"
        );

        let err = decode_body("nfs.config", StatusCode::FORBIDDEN, b"denied", 1).unwrap_err();
        assert_matches!(&err, Error::Api(api) if api.code == 2);
        assert!(err.is_auth_error());
    }

    #[test]
    fn test_non_envelope_body_is_protocol_error() {
        let err = decode_body("nfs.config", StatusCode::BAD_GATEWAY, b"bad gateway", 1).unwrap_err();
        assert_matches!(err, Error::Protocol(msg) if msg.contains("HTTP 502"));

        // A JSON-RPC error envelope wins over the HTTP status
        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"gone"}}"#;
        let err = decode_body("nfs.config", StatusCode::UNAUTHORIZED, body, 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_http_transport_requires_host() {
        let config = ProviderConfig {
            api_key: "1-key".into(),
            ..Default::default()
        };
        assert_matches!(HttpTransport::new(&config), Err(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let config = ProviderConfig {
            host: "127.0.0.1:1".into(),
            api_key: "1-key".into(),
            insecure_http: true,
            request_timeout_secs: 2,
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport
            .call(RemoteCall::new("core.ping", vec![]))
            .await
            .unwrap_err();

        assert_matches!(&err, Error::Connection(conn) if conn.host == "127.0.0.1:1");
        assert!(err.to_string().contains("provider \"trueform\""));
        assert!(err.is_retryable());
    }
}
