//! JSON-RPC 2.0 wire types and the Solana subscribe request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request id used for the `programSubscribe` call on every connection.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Id echoed back by the node. Requests always use numbers; responses to
/// requests the node could not parse carry `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    Null,
}

/// Outgoing call: `programSubscribe` on the stream, `getAccountInfo` and
/// `getSlot` over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: RpcId::Number(id),
            method: method.into(),
            params,
        }
    }

    /// `programSubscribe` scoped to `program_id`, jsonParsed encoding.
    pub fn program_subscribe(program_id: &str, commitment: &str) -> Self {
        Self::new(
            SUBSCRIBE_REQUEST_ID,
            "programSubscribe",
            vec![
                Value::String(program_id.to_string()),
                serde_json::json!({
                    "encoding": "jsonParsed",
                    "commitment": commitment,
                }),
            ],
        )
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// Reply to a call. Stream notifications are not responses; they are read
/// by the extractor as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The `result` value (`null` when absent), or the node's error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }

    /// Returns `true` if this answers the request with the given numeric id.
    pub fn answers(&self, id: u64) -> bool {
        self.id == RpcId::Number(id)
    }
}
