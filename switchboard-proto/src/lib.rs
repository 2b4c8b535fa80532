//! Generated Protobuf definitions for the commandable envelope
//!
//! One statically known service, `commandable.Commandable`, with a single
//! `invoke` method. Every named command rides through it.

pub mod commandable {
    tonic::include_proto!("commandable");
}

pub mod convert;

pub use commandable::{ErrorDescription, InvokeReply, InvokeRequest};

/// Fully qualified name of the envelope service.
pub const COMMANDABLE_SERVICE: &str = "commandable.Commandable";

/// Wire name of the single envelope method.
pub const INVOKE_METHOD: &str = "invoke";
