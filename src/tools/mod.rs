//! Agent-facing tools.
//!
//! - `registry`: tool registration and default-deny dispatch
//! - `sql_validator`: SELECT-only policy and row bounds
//! - `ddl`: the `get_table_ddl` tool
//! - `select`: the `execute_select_query` tool

pub mod ddl;
pub mod registry;
pub mod select;
pub mod sql_validator;

pub use ddl::{DdlToolHandler, GetTableDdlInput};
pub use registry::{ToolHandler, ToolRegistry, check_arguments, handler_fn};
pub use select::{ExecuteSelectQueryInput, SelectToolHandler};
pub use sql_validator::QueryValidator;

use crate::error::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

/// Decode checked arguments into a tool's typed input.
pub fn parse_input<T: DeserializeOwned>(arguments: Map<String, JsonValue>) -> GatewayResult<T> {
    serde_json::from_value(JsonValue::Object(arguments))
        .map_err(|e| GatewayError::invalid_arguments(e.to_string()))
}
