//! Commandable client
//!
//! Calls `"<service>.<command>"` through the single `invoke` method and
//! decodes the reply envelope into a value or a reconstructed error.

use crate::client::Client;
use crate::envelope::{decode_result, encode_call};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use switchboard_model::RpcError;
use switchboard_proto::{InvokeReply, InvokeRequest, COMMANDABLE_SERVICE, INVOKE_METHOD};

pub struct CommandableClient {
    client: Client,
    name: String,
}

impl CommandableClient {
    pub fn new(name: &str) -> Self {
        Self {
            client: Client::new(),
            name: name.to_string(),
        }
    }

    pub fn with_client(name: &str, client: Client) -> Self {
        Self {
            client,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn method_name(&self, command: &str) -> String {
        if self.name.is_empty() {
            command.to_string()
        } else {
            format!("{}.{}", self.name, command)
        }
    }

    /// Invoke a remote command. `Ok(None)` means the command returned no value.
    pub async fn call_command(
        &self,
        command: &str,
        correlation_id: Option<&str>,
        params: Option<Value>,
    ) -> Result<Option<Value>, RpcError> {
        let method = self.method_name(command);
        let timing = self.client.instrument(correlation_id, &method);

        let result = match encode_call(&method, correlation_id, params.as_ref()) {
            Ok(request) => self
                .client
                .call::<InvokeRequest, InvokeReply>(COMMANDABLE_SERVICE, INVOKE_METHOD, correlation_id, request)
                .await
                .and_then(|reply| decode_result(reply, correlation_id)),
            Err(e) => Err(e),
        };
        timing.end_timing();

        if let Err(e) = &result {
            self.client.instrument_error(correlation_id, &method, e);
        }
        result
    }

    /// Like `call_command`, deserializing the result into `T`.
    pub async fn call_command_as<T: DeserializeOwned>(
        &self,
        command: &str,
        correlation_id: Option<&str>,
        params: Option<Value>,
    ) -> Result<Option<T>, RpcError> {
        let Some(value) = self.call_command(command, correlation_id, params).await? else {
            return Ok(None);
        };
        serde_json::from_value(value).map(Some).map_err(|e| {
            RpcError::invocation(correlation_id, "RESULT_PARSE_FAILED", "Result does not match the expected type")
                .with_details("method", self.method_name(command))
                .with_cause(e)
        })
    }
}

impl Deref for CommandableClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl DerefMut for CommandableClient {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(CommandableClient::new("items").method_name("get_item"), "items.get_item");
        assert_eq!(CommandableClient::new("").method_name("get_item"), "get_item");
    }

    #[tokio::test]
    async fn test_call_before_open() {
        let client = CommandableClient::new("items");
        let err = client.call_command("get_item", Some("c"), None).await.unwrap_err();
        assert_eq!(err.code, "NO_CONNECTION");
    }
}
