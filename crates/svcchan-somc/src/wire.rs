//! The JSON-RPC-like frame shape the matching server speaks: `{jsonrpc, id, method?, params?,
//! result?, error?}`. Requests carry `id` and `method`; replies carry the same `id` with `result`
//! or `error`; server-initiated notifications (`subscribe` callbacks) carry `method` but no `id`.

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One wire frame, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl Frame {
    /// Builds an outgoing request frame.
    pub fn request(id: u64, method: &str, params: serde_json::Value) -> Self {
        Frame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// A frame is a reply to one of our requests if it carries an `id` and
    /// no `method`; otherwise it is a server-initiated notification.
    pub fn is_reply(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }
}

/// The three RPC methods this client calls.
pub mod methods {
    pub const NEW_OFFERING: &str = "newOffering";
    pub const GET_OFFERINGS: &str = "getOfferings";
    pub const CONNECTION_INFO: &str = "connectionInfo";
    pub const SUBSCRIBE: &str = "subscribe";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_without_method_is_recognized() {
        let f = Frame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(1),
            method: None,
            params: None,
            result: Some(serde_json::json!({"ok": true})),
            error: None,
        };
        assert!(f.is_reply());
    }

    #[test]
    fn notification_with_method_and_no_id_is_not_a_reply() {
        let f = Frame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some("subscribe".to_string()),
            params: Some(serde_json::json!({"stateChannel": "abc"})),
            result: None,
            error: None,
        };
        assert!(!f.is_reply());
    }

    #[test]
    fn request_frame_round_trips_through_json() {
        let f = Frame::request(7, methods::NEW_OFFERING, serde_json::json!({"hash": "x"}));
        let text = serde_json::to_string(&f).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, Some(7));
        assert_eq!(back.method.as_deref(), Some(methods::NEW_OFFERING));
        assert!(back.result.is_none());
    }
}
