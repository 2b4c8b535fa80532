//! Proto ↔ Model conversion helpers for error descriptions.
//!
//! Standalone functions because the orphan rule prevents `From` impls when
//! both sides come from foreign crates (switchboard-model, prost output).

use crate::commandable::ErrorDescription as WireError;
use switchboard_model::ErrorDescription;

/// Model → Proto (infallible)
pub fn error_to_proto(desc: &ErrorDescription) -> WireError {
    WireError {
        r#type: desc.kind.clone().unwrap_or_default(),
        category: desc.category.clone(),
        code: desc.code.clone(),
        correlation_id: desc.correlation_id.clone().unwrap_or_default(),
        status: desc.status.to_string(),
        message: desc.message.clone(),
        cause: desc.cause.clone().unwrap_or_default(),
        stack_trace: desc.stack_trace.clone().unwrap_or_default(),
        details: desc.details.clone().into_iter().collect(),
    }
}

/// Proto → Model. Empty strings map back to absent fields and an
/// unparsable status falls back to 500.
pub fn error_from_proto(wire: WireError) -> ErrorDescription {
    ErrorDescription {
        kind: non_empty(wire.r#type),
        category: wire.category,
        status: wire.status.parse().unwrap_or(500),
        code: wire.code,
        message: wire.message,
        correlation_id: non_empty(wire.correlation_id),
        cause: non_empty(wire.cause),
        stack_trace: non_empty(wire.stack_trace),
        details: wire.details.into_iter().collect(),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
