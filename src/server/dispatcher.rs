use super::protocol::{Reply, Request};
use crate::output::StatSink;
use crate::MirrorError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handles one admin command
///
/// Returning `Ok(Some(value))` sends `value` as a JSON line before `OK`.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Result<Option<Value>, String>;
}

/// Registry mapping command names to handlers
#[derive(Default)]
pub struct CommandDispatcher {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the built-in `ping` and `stats` commands
    pub fn with_builtins(stats: Arc<StatSink>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.handlers.insert("ping".to_string(), Arc::new(PingHandler));
        dispatcher
            .handlers
            .insert("stats".to_string(), Arc::new(StatsHandler { stats }));
        dispatcher
    }

    /// Registers a handler under `command`
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Server`] if the command is empty or already registered.
    pub fn register(
        &mut self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), MirrorError> {
        if command.is_empty() {
            return Err(MirrorError::Server("command name cannot be empty".to_string()));
        }
        if self.handlers.contains_key(command) {
            return Err(MirrorError::Server(format!(
                "command '{}' is already registered",
                command
            )));
        }
        self.handlers.insert(command.to_string(), handler);
        Ok(())
    }

    pub fn commands(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn dispatch(&self, request: &Request) -> Reply {
        match self.handlers.get(&request.command) {
            Some(handler) => match handler.handle(request) {
                Ok(payload) => Reply::Ok(payload),
                Err(reason) => Reply::Err(reason),
            },
            None => Reply::Err(format!("unknown command '{}'", request.command)),
        }
    }
}

/// Liveness check; replies with `OK` only
pub struct PingHandler;

impl CommandHandler for PingHandler {
    fn handle(&self, _request: &Request) -> Result<Option<Value>, String> {
        Ok(None)
    }
}

/// Replies with the current statistics snapshot
pub struct StatsHandler {
    pub stats: Arc<StatSink>,
}

impl CommandHandler for StatsHandler {
    fn handle(&self, _request: &Request) -> Result<Option<Value>, String> {
        serde_json::to_value(self.stats.snapshot())
            .map(Some)
            .map_err(|e| format!("failed to encode stats: {}", e))
    }
}
