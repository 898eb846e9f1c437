//! Tool registry and dispatcher.
//!
//! Tools are registered once at startup under unique names. `dispatch` is the
//! single entry point for tool calls: it resolves the tool, checks the
//! arguments against the declared schema and runs the handler. Every failure
//! comes back as a [`ToolCallResult::Failure`], never as a panic or a raw error.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{ToolCallRequest, ToolCallResult, ToolDescriptor};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value as JsonValue};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Handler invoked with arguments that already match the descriptor.
pub type ToolHandler = Arc<
    dyn Fn(Map<String, JsonValue>) -> BoxFuture<'static, GatewayResult<JsonValue>> + Send + Sync,
>;

/// Wrap an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Map<String, JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GatewayResult<JsonValue>> + Send + 'static,
{
    Arc::new(move |arguments| f(arguments).boxed())
}

/// Longest tool name echoed into logs.
const MAX_LOGGED_NAME_LEN: usize = 64;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

/// Name-indexed set of tools, immutable once the gateway is built.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: ToolHandler) -> GatewayResult<()> {
        if self.get(&descriptor.name).is_some() {
            return Err(GatewayError::duplicate_tool(descriptor.name));
        }
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.get(name).map(|t| &t.descriptor)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Route a tool call. Always returns a result; argument values are never logged.
    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResult {
        let start = Instant::now();
        let ToolCallRequest { name, arguments } = request;

        let result = match self.run(&name, arguments).await {
            Ok(payload) => ToolCallResult::success(payload),
            Err(e) => ToolCallResult::failure(&e),
        };

        let logged_name: String = name.chars().take(MAX_LOGGED_NAME_LEN).collect();
        info!(
            tool = %logged_name,
            outcome = result.error_kind().map(|k| k.as_str()).unwrap_or("Success"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        result
    }

    async fn run(&self, name: &str, arguments: Map<String, JsonValue>) -> GatewayResult<JsonValue> {
        let tool = self
            .get(name)
            .ok_or_else(|| GatewayError::unknown_tool(name))?;
        let arguments = check_arguments(&tool.descriptor, arguments)?;

        // The handler is called inside the guarded future so that a panic
        // while building the future is caught as well.
        let guarded = AssertUnwindSafe(async { (tool.handler)(arguments).await });
        match guarded.catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %tool.descriptor.name, "Tool handler panicked");
                Err(GatewayError::internal("internal fault"))
            }
        }
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.descriptors().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Check `arguments` against the descriptor, dropping explicit nulls.
pub fn check_arguments(
    descriptor: &ToolDescriptor,
    arguments: Map<String, JsonValue>,
) -> GatewayResult<Map<String, JsonValue>> {
    let mut checked = Map::new();

    for (name, value) in arguments {
        let Some(spec) = descriptor.argument(&name) else {
            let shown: String = name.chars().take(MAX_LOGGED_NAME_LEN).collect();
            return Err(GatewayError::invalid_arguments(format!(
                "unknown argument '{}' for tool '{}'",
                shown, descriptor.name
            )));
        };
        if value.is_null() {
            continue;
        }
        if !spec.kind.accepts(&value) {
            return Err(GatewayError::invalid_arguments(format!(
                "argument '{}' must be of type {}",
                spec.name,
                spec.kind.json_type()
            )));
        }
        checked.insert(name, value);
    }

    if let Some(missing) = descriptor
        .arguments
        .iter()
        .find(|a| a.required && !checked.contains_key(&a.name))
    {
        return Err(GatewayError::invalid_arguments(format!(
            "missing required argument '{}'",
            missing.name
        )));
    }

    Ok(checked)
}
