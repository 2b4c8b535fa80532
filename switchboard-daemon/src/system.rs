//! Built-in `system` commands

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use switchboard_rpc::model::{
    BoxError, CommandSet, Commandable, FnCommand, ObjectSchema, Parameters, TypeCode,
};

pub struct SystemController {
    commands: Arc<CommandSet>,
}

impl SystemController {
    pub fn new() -> Self {
        let commands = CommandSet::new()
            .with_command(FnCommand::new("ping", |_, _| async {
                Ok::<_, BoxError>(Some(json!("pong")))
            }))
            .with_command(
                FnCommand::new("echo", |_, args: Parameters| async move {
                    Ok::<_, BoxError>(args.get("message").cloned())
                })
                .with_schema(ObjectSchema::new().with_required_property("message", TypeCode::Any)),
            )
            .with_command(FnCommand::new("time", |_, _| async {
                let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
                Ok::<_, BoxError>(Some(json!({ "unix_ms": now.as_millis() as u64 })))
            }))
            .with_command(FnCommand::new("version", |_, _| async {
                Ok::<_, BoxError>(Some(Value::from(env!("CARGO_PKG_VERSION"))))
            }));

        Self {
            commands: Arc::new(commands),
        }
    }
}

impl Commandable for SystemController {
    fn command_set(&self) -> Arc<CommandSet> {
        self.commands.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_commands() {
        let set = SystemController::new().command_set();
        let names: Vec<_> = set.commands().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["ping", "echo", "time", "version"]);

        let ping = set.find_command("ping").unwrap();
        assert_eq!(ping.execute(None, Parameters::new()).await.unwrap(), Some(json!("pong")));

        let echo = set.find_command("echo").unwrap();
        let args = Parameters::from_tuples([("message", json!({ "a": 1 }))]);
        assert_eq!(echo.execute(None, args).await.unwrap(), Some(json!({ "a": 1 })));

        let time = set.find_command("time").unwrap();
        let out = time.execute(None, Parameters::new()).await.unwrap().unwrap();
        assert!(out["unix_ms"].as_u64().unwrap() > 0);
    }
}
