//! Bounded SELECT tool.
//!
//! This module implements the `execute_select_query` tool. The query text is
//! validated and bounded first; only the resulting [`QuerySpec`] reaches the
//! runner.
//!
//! [`QuerySpec`]: crate::models::QuerySpec

use crate::db::QueryRunner;
use crate::error::GatewayResult;
use crate::models::{ArgumentSpec, ArgumentType, RowSet, ToolDescriptor};
use crate::tools::sql_validator::QueryValidator;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const TOOL_NAME: &str = "execute_select_query";

/// Input for the execute_select_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteSelectQueryInput {
    /// A single SELECT statement
    pub query: String,
    /// Maximum rows to return. Capped by the server's configured maximum.
    #[serde(default)]
    pub max_rows: Option<i64>,
}

pub fn descriptor(max_rows: u32) -> ToolDescriptor {
    ToolDescriptor::new(
        TOOL_NAME,
        format!(
            "Run one read-only SELECT query and return its rows.\n\
             Only SELECT is accepted; other statements and stacked queries are rejected.\n\
             At most {} rows are returned; `truncated` is true when more rows exist.",
            max_rows
        ),
    )
    .with_argument(ArgumentSpec::required(
        "query",
        ArgumentType::String,
        "A single SELECT statement.",
    ))
    .with_argument(ArgumentSpec::optional(
        "max_rows",
        ArgumentType::Integer,
        format!("Maximum rows to return (1..={}).", max_rows),
    ))
}

/// Handler for the execute_select_query tool.
pub struct SelectToolHandler {
    validator: QueryValidator,
    runner: Arc<dyn QueryRunner>,
}

impl SelectToolHandler {
    pub fn new(validator: QueryValidator, runner: Arc<dyn QueryRunner>) -> Self {
        Self { validator, runner }
    }

    pub async fn execute_select_query(&self, input: ExecuteSelectQueryInput) -> GatewayResult<RowSet> {
        let spec = self.validator.validate(&input.query, input.max_rows)?;

        info!(
            limit = spec.limit(),
            limit_imposed = spec.limit_imposed(),
            "Running SELECT query"
        );
        self.runner.run(&spec).await
    }
}
