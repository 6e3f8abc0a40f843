//! JSON-RPC wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// A single remote method invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RemoteCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Wrap into a request envelope with the given id
    pub fn into_request(self, id: u64) -> RpcRequest {
        RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: self.method,
            params: self.params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// Response envelope: exactly one of `result` or `error` is meaningful
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RawRpcError>,
}

/// Error object as sent by the appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
