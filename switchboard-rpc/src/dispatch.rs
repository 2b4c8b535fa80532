//! Command table and the `invoke` wire handler
//!
//! Every failure past the transport boundary (unknown command, bad
//! arguments, handler error or panic) is answered with a successful gRPC
//! response carrying an error envelope. The wire contract never changes no
//! matter how many commands or error kinds exist.

use crate::envelope::{decode_call, encode_error, encode_result};
use crate::interceptor::MethodAction;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use switchboard_model::{Parameters, RpcError, Schema};
use switchboard_proto::commandable::commandable_server::Commandable as CommandableRpc;
use switchboard_proto::{InvokeReply, InvokeRequest};
use tonic::{Request, Response, Status};
use tracing::{debug, error, trace};

/// A command table entry.
#[derive(Clone)]
pub struct CommandEntry {
    pub action: MethodAction,
    pub schema: Option<Arc<dyn Schema>>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, CommandEntry>,
    /// Registration that contributed each command, if any.
    owners: HashMap<String, usize>,
}

/// Name → handler map shared by the endpoint and its `invoke` service.
#[derive(Default)]
pub struct CommandRouter {
    table: RwLock<Table>,
    maintenance: AtomicBool,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a command. Last write wins.
    pub fn register(&self, name: &str, entry: CommandEntry, owner: Option<usize>) {
        let mut table = self.write();
        table.entries.insert(name.to_string(), entry);
        match owner {
            Some(owner) => table.owners.insert(name.to_string(), owner),
            None => table.owners.remove(name),
        };
    }

    pub fn get(&self, name: &str) -> Option<CommandEntry> {
        self.read().entries.get(name).cloned()
    }

    /// Drop every command contributed by `owner`. Returns how many went.
    pub fn remove_owned_by(&self, owner: usize) -> usize {
        let mut table = self.write();
        let names: Vec<String> = table
            .owners
            .iter()
            .filter(|(_, o)| **o == owner)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            table.entries.remove(name);
            table.owners.remove(name);
        }
        names.len()
    }

    pub fn clear(&self) {
        let mut table = self.write();
        table.entries.clear();
        table.owners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.maintenance.store(enabled, Ordering::SeqCst);
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    /// Handle one envelope request. Never fails at the transport level.
    pub async fn invoke(&self, request: InvokeRequest) -> InvokeReply {
        let cid = request.correlation_id.clone().filter(|c| !c.is_empty());
        let method = request.method.clone();

        if self.is_maintenance() {
            return encode_error(
                &RpcError::invalid_state(cid.as_deref(), "SERVICE_IN_MAINTENANCE", "Service is in maintenance")
                    .with_details("method", &method),
            );
        }

        let Some(entry) = self.get(&method) else {
            debug!(correlation_id = ?cid, method = %method, "Command not found");
            return encode_error(
                &RpcError::invocation(cid.as_deref(), "METHOD_NOT_FOUND", format!("Method {} was not found", method))
                    .with_details("method", &method),
            );
        };

        trace!(correlation_id = ?cid, method = %method, "Executing command");
        let outcome = self
            .execute(entry, &request, cid.clone())
            .await
            .and_then(|result| encode_result(cid.as_deref(), result.as_ref()));

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                error!(correlation_id = ?cid, method = %method, code = %e.code, "Command failed: {}", e.message);
                encode_error(&e)
            }
        }
    }

    async fn execute(
        &self,
        entry: CommandEntry,
        request: &InvokeRequest,
        cid: Option<String>,
    ) -> Result<Option<Value>, RpcError> {
        let method = request.method.as_str();
        let failed = || {
            RpcError::invocation(cid.as_deref(), "METHOD_FAILED", format!("Method {} failed", method))
                .with_details("method", method)
        };

        let call = decode_call(request).map_err(|e| failed().with_cause(e))?;
        let args = Parameters::from_value(call.args).map_err(|e| failed().with_cause(e))?;

        if let Some(schema) = &entry.schema {
            schema.validate(cid.as_deref(), &args)?;
        }

        // Lazy future so a panic while building the handler future is caught too
        let action = entry.action.clone();
        let handler_cid = cid.clone();
        let outcome = AssertUnwindSafe(async move { action(handler_cid, args).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(failed()
                .wrap(e)
                .with_details("method", method)
                .with_correlation_id(cid.as_deref())),
            Err(panic) => Err(failed().with_cause(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

/// The generated `Commandable` service, bound to a router.
pub struct InvokeService {
    router: Arc<CommandRouter>,
}

impl InvokeService {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self { router }
    }
}

#[tonic::async_trait]
impl CommandableRpc for InvokeService {
    async fn invoke(&self, request: Request<InvokeRequest>) -> Result<Response<InvokeReply>, Status> {
        Ok(Response::new(self.router.invoke(request.into_inner()).await))
    }
}
