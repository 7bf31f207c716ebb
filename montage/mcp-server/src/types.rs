//! Wire types shared by the broker, transport, and catalog layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Instruction sent to the plugin over the bridge socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionMessage {
    /// Unique message ID for response correlation
    pub id: String,

    /// Operation for the plugin to execute
    pub action: String,

    /// Action-specific payload, opaque to the broker
    pub data: Value,
}

/// Response received from the plugin.
///
/// A message only counts as a response when it carries a string `id` and at
/// least one of the `result`/`error` keys. Key presence is what matters:
/// `{"id": ..., "result": null}` is a valid success response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub id: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ResponseMessage {
    /// Extract a correlatable response from a decoded JSON value.
    ///
    /// Returns `None` for anything else: non-objects, objects without a
    /// string `id`, or objects carrying neither `result` nor `error`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id")?.as_str()?.to_string();
        let result = obj.get("result").cloned();
        let error = obj.get("error").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        if result.is_none() && error.is_none() {
            return None;
        }

        Some(Self { id, result, error })
    }
}

/// Uniform outcome shape returned by every catalog entry.
///
/// Carries either a result payload or a human-readable failure message; raw
/// errors never cross this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the operation succeeded
    pub success: bool,

    /// Result payload from the plugin on success
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,

    /// Failure description on error
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(result: Option<Value>) -> Self {
        Self {
            success: true,
            result,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_requires_id_and_payload() {
        assert!(ResponseMessage::from_value(&json!({"id": "a", "result": 1})).is_some());
        assert!(ResponseMessage::from_value(&json!({"id": "a", "error": "boom"})).is_some());

        // Neither result nor error.
        assert!(ResponseMessage::from_value(&json!({"id": "a"})).is_none());
        // Missing or non-string id.
        assert!(ResponseMessage::from_value(&json!({"result": 1})).is_none());
        assert!(ResponseMessage::from_value(&json!({"id": 7, "result": 1})).is_none());
        // Not an object at all.
        assert!(ResponseMessage::from_value(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn null_result_is_still_a_response() {
        let response =
            ResponseMessage::from_value(&json!({"id": "a", "result": null})).expect("response");
        assert_eq!(response.result, Some(Value::Null));
        assert!(response.error.is_none());
    }

    #[test]
    fn non_string_error_is_stringified() {
        let response = ResponseMessage::from_value(&json!({"id": "a", "error": {"code": 3}}))
            .expect("response");
        assert_eq!(response.error.as_deref(), Some(r#"{"code":3}"#));
    }

    #[test]
    fn outcome_serialization_omits_absent_fields() {
        let ok = serde_json::to_value(ActionOutcome::succeeded(Some(json!(1)))).unwrap();
        assert_eq!(ok, json!({"success": true, "result": 1}));

        let failed = serde_json::to_value(ActionOutcome::failed("nope")).unwrap();
        assert_eq!(failed, json!({"success": false, "message": "nope"}));
    }
}
