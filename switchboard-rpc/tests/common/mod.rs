#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_rpc::model::{
    BoxError, CommandSet, Commandable, ConfigParams, FnCommand, ObjectSchema, Parameters, References, RpcError,
    TypeCode,
};
use switchboard_rpc::{CommandableClient, CommandableService, Endpoint};

/// Controller with one succeeding and one failing command.
pub struct ItemsController {
    commands: Arc<CommandSet>,
}

impl ItemsController {
    pub fn new() -> Self {
        let commands = CommandSet::new()
            .with_command(
                FnCommand::new("get_item", |_, args: Parameters| async move {
                    let id = args.get_as_string("id").unwrap_or_default();
                    Ok::<_, BoxError>(Some(json!({ "id": id, "name": "x" })))
                })
                .with_schema(ObjectSchema::new().with_optional_property("id", TypeCode::String)),
            )
            .with_command(FnCommand::new("fail_item", |cid: Option<String>, _| async move {
                Err::<Option<Value>, BoxError>(Box::new(RpcError::application(
                    cid.as_deref(),
                    "NOT_FOUND",
                    "Item not found",
                )))
            }))
            .with_command(FnCommand::new("crash_item", |_, _| async {
                Err::<Option<Value>, BoxError>("storage offline".into())
            }))
            .with_command(FnCommand::new("clear_items", |_, _| async { Ok::<_, BoxError>(None) }));

        Self {
            commands: Arc::new(commands),
        }
    }
}

impl Commandable for ItemsController {
    fn command_set(&self) -> Arc<CommandSet> {
        self.commands.clone()
    }
}

/// Binds 127.0.0.1 on an ephemeral port.
pub fn loopback_config() -> ConfigParams {
    ConfigParams::from_tuples([("connection.host", "127.0.0.1"), ("connection.port", "0")])
}

pub fn controller_refs() -> References {
    let controller: Arc<dyn Commandable> = Arc::new(ItemsController::new());
    References::new().with("controller", controller)
}

/// An opened items service on its own endpoint.
pub async fn start_items_service() -> (CommandableService, SocketAddr) {
    let mut service = CommandableService::new("items");
    service.configure(&loopback_config());
    service.set_references(&controller_refs()).unwrap();
    service.open(Some("test")).await.unwrap();

    let addr = service.endpoint().and_then(|e| e.local_addr()).unwrap();
    (service, addr)
}

pub fn shared_endpoint() -> Arc<Endpoint> {
    let mut endpoint = Endpoint::new();
    endpoint.configure(&loopback_config()).unwrap();
    Arc::new(endpoint)
}

pub async fn connect(name: &str, addr: SocketAddr) -> CommandableClient {
    let mut client = CommandableClient::new(name);
    client
        .configure(&ConfigParams::from_tuples([
            ("connection.host", addr.ip().to_string()),
            ("connection.port", addr.port().to_string()),
        ]))
        .unwrap();
    client.open(Some("test")).await.unwrap();
    client
}
