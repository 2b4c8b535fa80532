//! Pluggable parameter validation
//!
//! The dispatch path only depends on the `Schema` trait. `ObjectSchema` is a
//! small property/type checker good enough for command arguments.

use crate::parameters::kind_of;
use crate::{Parameters, RpcError};
use serde_json::Value;

/// Validates a decoded parameter bag.
pub trait Schema: Send + Sync {
    fn validate(&self, correlation_id: Option<&str>, params: &Parameters) -> Result<(), RpcError>;
}

/// Expected JSON type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Any,
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

impl TypeCode {
    fn matches(&self, value: &Value) -> bool {
        match self {
            TypeCode::Any => true,
            TypeCode::String => value.is_string(),
            TypeCode::Integer => value.is_i64() || value.is_u64(),
            TypeCode::Float => value.is_number(),
            TypeCode::Boolean => value.is_boolean(),
            TypeCode::Object => value.is_object(),
            TypeCode::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone)]
struct PropertySchema {
    name: String,
    type_code: TypeCode,
    required: bool,
}

/// Schema for a flat object of named properties.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    properties: Vec<PropertySchema>,
    allow_undefined: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required_property(mut self, name: &str, type_code: TypeCode) -> Self {
        self.properties.push(PropertySchema {
            name: name.to_string(),
            type_code,
            required: true,
        });
        self
    }

    pub fn with_optional_property(mut self, name: &str, type_code: TypeCode) -> Self {
        self.properties.push(PropertySchema {
            name: name.to_string(),
            type_code,
            required: false,
        });
        self
    }

    /// Accept properties that are not declared.
    pub fn allow_undefined(mut self, allow: bool) -> Self {
        self.allow_undefined = allow;
        self
    }

    fn check(&self, params: &Parameters) -> Vec<RpcError> {
        let mut results = Vec::new();

        for prop in &self.properties {
            match params.get(&prop.name) {
                None | Some(Value::Null) if prop.required => results.push(
                    RpcError::validation(None, "VALUE_IS_NULL", format!("Property '{}' must not be null", prop.name))
                        .with_details("property", &prop.name),
                ),
                None | Some(Value::Null) => {}
                Some(value) if !prop.type_code.matches(value) => results.push(
                    RpcError::validation(
                        None,
                        "INVALID_TYPE",
                        format!(
                            "Property '{}' expected {:?} but found {}",
                            prop.name,
                            prop.type_code,
                            kind_of(value)
                        ),
                    )
                    .with_details("property", &prop.name),
                ),
                Some(_) => {}
            }
        }

        if !self.allow_undefined {
            for key in params.keys() {
                if !self.properties.iter().any(|p| &p.name == key) {
                    results.push(
                        RpcError::validation(None, "UNEXPECTED_PROPERTY", format!("Property '{}' is not expected", key))
                            .with_details("property", key),
                    );
                }
            }
        }

        results
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, correlation_id: Option<&str>, params: &Parameters) -> Result<(), RpcError> {
        let results = self.check(params);
        if results.is_empty() {
            return Ok(());
        }

        let message = results.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");
        let mut err = RpcError::validation(correlation_id, "INVALID_VALUE", message);
        for (index, result) in results.iter().enumerate() {
            err = err.with_details(format!("violation.{}", index), &result.code);
        }
        Err(err)
    }
}
