//! Commands exposed by controllers
//!
//! A controller implements `Commandable` and hands out an ordered
//! `CommandSet`. Each `Command` has a name, an optional parameter schema, and
//! an async `execute`.

use crate::{BoxError, Parameters, Schema};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by command execution. `Ok(None)` means "no value".
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Value>, BoxError>> + Send + 'a>>;

/// A named, executable operation.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Schema the arguments must satisfy before `execute` runs.
    fn schema(&self) -> Option<Arc<dyn Schema>> {
        None
    }

    fn execute<'a>(&'a self, correlation_id: Option<&'a str>, args: Parameters) -> CommandFuture<'a>;
}

/// Something that exposes a set of commands (usually a controller).
pub trait Commandable: Send + Sync {
    fn command_set(&self) -> Arc<CommandSet>;
}

/// Ordered collection of commands, unique by name.
#[derive(Default, Clone)]
pub struct CommandSet {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. A command with the same name replaces the earlier one
    /// in place, keeping its position.
    pub fn add_command(&mut self, command: Arc<dyn Command>) {
        match self.commands.iter().position(|c| c.name() == command.name()) {
            Some(index) => self.commands[index] = command,
            None => self.commands.push(command),
        }
    }

    pub fn with_command(mut self, command: impl Command + 'static) -> Self {
        self.add_command(Arc::new(command));
        self
    }

    /// Merge every command of another set.
    pub fn add_command_set(&mut self, other: &CommandSet) {
        for command in &other.commands {
            self.add_command(command.clone());
        }
    }

    pub fn commands(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    pub fn find_command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.iter().find(|c| c.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Command backed by an async closure.
pub struct FnCommand<F> {
    name: String,
    schema: Option<Arc<dyn Schema>>,
    action: F,
}

impl<F, Fut> FnCommand<F>
where
    F: Fn(Option<String>, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            schema: None,
            action,
        }
    }

    pub fn with_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }
}

impl<F, Fut> Command for FnCommand<F>
where
    F: Fn(Option<String>, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Option<Arc<dyn Schema>> {
        self.schema.clone()
    }

    fn execute<'a>(&'a self, correlation_id: Option<&'a str>, args: Parameters) -> CommandFuture<'a> {
        Box::pin((self.action)(correlation_id.map(str::to_string), args))
    }
}
