//! Envelope protocol
//!
//! Encode/decode rules shared by the client and the endpoint. Arguments and
//! results travel as JSON text inside the fixed `InvokeRequest`/`InvokeReply`
//! messages; errors travel as an `ErrorDescription` and are rebuilt into an
//! `RpcError` of the same category and code on the receiving side.

use serde_json::Value;
use switchboard_model::{ErrorDescription, RpcError};
use switchboard_proto::convert::{error_from_proto, error_to_proto};
use switchboard_proto::{InvokeReply, InvokeRequest};

/// A request envelope after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    pub method: String,
    pub correlation_id: Option<String>,
    pub args: Option<Value>,
}

/// Build a request envelope. `None` or `null` arguments are sent as empty.
pub fn encode_call(method: &str, correlation_id: Option<&str>, args: Option<&Value>) -> Result<InvokeRequest, RpcError> {
    let args_json = match args {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::to_string(value).map_err(|e| {
            RpcError::invocation(correlation_id, "ARGS_ENCODE_FAILED", "Failed to serialize arguments")
                .with_details("method", method)
                .with_cause(e)
        })?),
    };

    Ok(InvokeRequest {
        method: method.to_string(),
        correlation_id: correlation_id.map(str::to_string),
        args_empty: args_json.is_none(),
        args_json,
    })
}

/// Decode a request envelope. Malformed argument JSON is an `INVALID_ARGS`
/// invocation error local to the decoding side.
pub fn decode_call(request: &InvokeRequest) -> Result<DecodedCall, RpcError> {
    let correlation_id = request.correlation_id.clone().filter(|cid| !cid.is_empty());

    let args = match request.args_json.as_deref() {
        _ if request.args_empty => None,
        None | Some("") => None,
        Some(json) => Some(serde_json::from_str(json).map_err(|e| {
            RpcError::invocation(correlation_id.as_deref(), "INVALID_ARGS", "Failed to parse arguments JSON")
                .with_details("method", &request.method)
                .with_cause(e)
        })?),
    };

    Ok(DecodedCall {
        method: request.method.clone(),
        correlation_id,
        args,
    })
}

/// Build a success reply. `None` or `null` is sent as an empty result.
pub fn encode_result(correlation_id: Option<&str>, result: Option<&Value>) -> Result<InvokeReply, RpcError> {
    let result_json = match result {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::to_string(value).map_err(|e| {
            RpcError::invocation(correlation_id, "RESULT_ENCODE_FAILED", "Failed to serialize result").with_cause(e)
        })?),
    };

    Ok(InvokeReply {
        error: None,
        result_empty: result_json.is_none(),
        result_json,
    })
}

/// Build an error reply. The result is always empty.
pub fn encode_error(error: &RpcError) -> InvokeReply {
    InvokeReply {
        error: Some(error_to_proto(&ErrorDescription::from(error))),
        result_empty: true,
        result_json: None,
    }
}

/// Decode a reply into a value, "no value", or the reconstructed error.
pub fn decode_result(reply: InvokeReply, correlation_id: Option<&str>) -> Result<Option<Value>, RpcError> {
    if let Some(error) = reply.error {
        return Err(RpcError::from(error_from_proto(error)));
    }

    match reply.result_json.as_deref() {
        _ if reply.result_empty => Ok(None),
        None | Some("") => Ok(None),
        Some(json) => serde_json::from_str(json).map(Some).map_err(|e| {
            RpcError::invocation(correlation_id, "RESULT_PARSE_FAILED", "Failed to parse result JSON").with_cause(e)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_model::ErrorCategory;

    #[test]
    fn test_call_roundtrip() {
        let args = json!({ "id": "1", "tags": ["a", "b"], "nested": { "n": 2.5, "ok": true } });
        let req = encode_call("items.get_item", Some("cid-7"), Some(&args)).unwrap();
        assert!(!req.args_empty);

        let call = decode_call(&req).unwrap();
        assert_eq!(call.method, "items.get_item");
        assert_eq!(call.correlation_id.as_deref(), Some("cid-7"));
        assert_eq!(call.args, Some(args));
    }

    #[test]
    fn test_empty_args() {
        let req = encode_call("items.list", None, None).unwrap();
        assert!(req.args_empty);
        assert!(req.args_json.is_none());
        assert!(decode_call(&req).unwrap().args.is_none());

        let req = encode_call("items.list", None, Some(&Value::Null)).unwrap();
        assert!(req.args_empty);
    }

    #[test]
    fn test_malformed_args_json() {
        let req = InvokeRequest {
            method: "items.get_item".to_string(),
            correlation_id: Some("c".to_string()),
            args_empty: false,
            args_json: Some("{not json".to_string()),
        };
        let err = decode_call(&req).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Invocation);
        assert_eq!(err.code, "INVALID_ARGS");
        assert_eq!(err.detail("method"), Some("items.get_item"));
    }

    #[test]
    fn test_result_roundtrip() {
        for value in [json!({ "id": "1", "name": "x" }), json!([1, 2, 3]), json!("text"), json!(42)] {
            let reply = encode_result(None, Some(&value)).unwrap();
            assert_eq!(decode_result(reply, None).unwrap(), Some(value));
        }
    }

    #[test]
    fn test_empty_result_is_no_value() {
        let reply = encode_result(None, None).unwrap();
        assert!(reply.result_empty);
        assert!(reply.result_json.is_none());
        assert!(reply.error.is_none());
        assert_eq!(decode_result(reply, None).unwrap(), None);
    }

    #[test]
    fn test_error_roundtrip() {
        let err = RpcError::application(Some("cid"), "NOT_FOUND", "Item not found").with_details("id", "9");
        let reply = encode_error(&err);
        assert!(reply.result_empty);
        assert!(reply.result_json.is_none());

        let back = decode_result(reply, Some("cid")).unwrap_err();
        assert_eq!(back.category, ErrorCategory::Application);
        assert_eq!(back.code, "NOT_FOUND");
        assert_eq!(back.detail("id"), Some("9"));
    }

    #[test]
    fn test_malformed_result_json() {
        let reply = InvokeReply {
            error: None,
            result_empty: false,
            result_json: Some("[1,".to_string()),
        };
        let err = decode_result(reply, Some("cid")).unwrap_err();
        assert_eq!(err.code, "RESULT_PARSE_FAILED");
        assert_eq!(err.correlation_id.as_deref(), Some("cid"));
    }
}
