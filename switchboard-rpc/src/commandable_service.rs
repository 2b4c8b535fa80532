//! Commandable service
//!
//! Exposes every command of a `controller` dependency as
//! `"<service>.<command>"` on the endpoint's `invoke` method, with timing
//! and error counters around each execution.

use crate::interceptor::action;
use crate::service::{Service, ServiceRegistration, ServiceRegistry};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock};
use switchboard_model::{
    Commandable, CounterTiming, Counters, DependencyResolver, NullCounters, References, RpcError,
};
use tracing::{error, trace};

#[derive(Clone)]
struct Collaborators {
    controller: Arc<dyn Commandable>,
    counters: Arc<dyn Counters>,
}

struct CommandRegistration {
    name: String,
    collaborators: RwLock<Option<Collaborators>>,
}

impl ServiceRegistration for CommandRegistration {
    fn set_references(&self, resolver: &DependencyResolver, references: &References) -> Result<(), RpcError> {
        let controller = resolver
            .get_required::<dyn Commandable>(references, "controller")
            .map_err(|e| e.with_details("service", &self.name))?;
        let counters = resolver
            .get_optional::<dyn Counters>(references, "counters")
            .unwrap_or_else(|| Arc::new(NullCounters));

        *self.collaborators.write().unwrap_or_else(|e| e.into_inner()) = Some(Collaborators { controller, counters });
        Ok(())
    }

    fn register(&self, registry: &mut ServiceRegistry<'_>) -> Result<(), RpcError> {
        let collaborators = self
            .collaborators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| {
                RpcError::invalid_state(None, "NO_CONTROLLER", "Controller reference is not set")
                    .with_details("service", &self.name)
            })?;

        let command_set = collaborators.controller.command_set();
        for command in command_set.commands() {
            let method = registry.qualify(command.name());
            let counters = collaborators.counters.clone();
            let command = command.clone();
            let schema = command.schema();
            let name = command.name().to_string();

            registry.register_method(
                &name,
                schema,
                action(move |cid: Option<String>, args| {
                    let command = command.clone();
                    let counters = counters.clone();
                    let method = method.clone();
                    async move {
                        trace!(correlation_id = ?cid, method = %method, "Executing command");
                        let timing = CounterTiming::begin(&counters, &format!("{}.exec_time", method));
                        counters.increment_one(&format!("{}.exec_count", method));

                        let result = command.execute(cid.as_deref(), args).await;
                        timing.end_timing();

                        if let Err(e) = &result {
                            counters.increment_one(&format!("{}.exec_errors", method));
                            error!(correlation_id = ?cid, method = %method, "Failed to execute command: {}", e);
                        }
                        result
                    }
                }),
            );
        }
        Ok(())
    }
}

/// A `Service` whose methods come from a controller's command set.
pub struct CommandableService {
    service: Service,
}

impl CommandableService {
    pub fn new(name: &str) -> Self {
        let registration = Arc::new(CommandRegistration {
            name: name.to_string(),
            collaborators: RwLock::new(None),
        });
        let service = Service::new(Some(name), registration).with_dependency("controller", "controller");
        Self { service }
    }
}

impl Deref for CommandableService {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

impl DerefMut for CommandableService {
    fn deref_mut(&mut self) -> &mut Service {
        &mut self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{decode_result, encode_call};
    use serde_json::json;
    use switchboard_model::{BoxError, CachedCounters, CommandSet, ErrorCategory, FnCommand};

    struct Items {
        commands: Arc<CommandSet>,
    }

    impl Items {
        fn new() -> Self {
            let commands = CommandSet::new()
                .with_command(FnCommand::new("get_item", |_, args: switchboard_model::Parameters| async move {
                    Ok::<_, BoxError>(Some(json!({ "id": args.get_as_string("id"), "name": "x" })))
                }))
                .with_command(FnCommand::new("fail_item", |cid: Option<String>, _| async move {
                    Err::<Option<serde_json::Value>, BoxError>(Box::new(RpcError::application(
                        cid.as_deref(),
                        "NOT_FOUND",
                        "Item not found",
                    )))
                }));
            Self {
                commands: Arc::new(commands),
            }
        }
    }

    impl Commandable for Items {
        fn command_set(&self) -> Arc<CommandSet> {
            self.commands.clone()
        }
    }

    #[test]
    fn test_missing_controller() {
        let mut service = CommandableService::new("items");
        let err = service.set_references(&References::new()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::InvalidState);
        assert_eq!(err.detail("role"), Some("controller"));
    }

    #[tokio::test]
    async fn test_commands_registered_and_counted() {
        let counters = Arc::new(CachedCounters::new());
        let controller: Arc<dyn Commandable> = Arc::new(Items::new());
        let counters_ref: Arc<dyn Counters> = counters.clone();
        let refs = References::new()
            .with("controller", controller)
            .with("counters", counters_ref);

        let mut service = CommandableService::new("items");
        service.configure(&switchboard_model::ConfigParams::from_tuples([
            ("connection.host", "127.0.0.1"),
            ("connection.port", "0"),
        ]));
        service.set_references(&refs).unwrap();
        service.open(None).await.unwrap();

        let endpoint = service.endpoint().unwrap();
        assert_eq!(
            endpoint.command_names(),
            vec!["items.fail_item".to_string(), "items.get_item".to_string()]
        );

        let reply = endpoint
            .invoke(encode_call("items.get_item", Some("c1"), Some(&json!({ "id": "1" }))).unwrap())
            .await;
        assert_eq!(decode_result(reply, None).unwrap(), Some(json!({ "id": "1", "name": "x" })));

        let reply = endpoint
            .invoke(encode_call("items.fail_item", Some("c2"), Some(&json!({}))).unwrap())
            .await;
        assert_eq!(decode_result(reply, None).unwrap_err().code, "NOT_FOUND");

        assert_eq!(counters.count("items.get_item.exec_count"), 1);
        assert_eq!(counters.count("items.fail_item.exec_errors"), 1);
        assert!(counters.get("items.get_item.exec_time").is_some());

        service.close(None).await.unwrap();
    }
}
