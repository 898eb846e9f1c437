//! Table definition tool.
//!
//! This module implements the `get_table_ddl` tool. Names are checked against
//! the identifier grammar before anything is sent to the database.

use crate::db::SchemaSource;
use crate::error::GatewayResult;
use crate::models::{ArgumentSpec, ArgumentType, DdlDescription, TableIdentifier, ToolDescriptor};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const TOOL_NAME: &str = "get_table_ddl";

/// Input for the get_table_ddl tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableDdlInput {
    /// Table name: letters, digits and underscores, starting with a letter or underscore
    pub table_name: String,
    /// Schema that owns the table. Defaults to the configured schema.
    #[serde(default)]
    pub schema: Option<String>,
}

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        TOOL_NAME,
        "Return the CREATE statement (DDL) of a table.\n\
         Use it to learn column names and types before writing a query.",
    )
    .with_argument(ArgumentSpec::required(
        "table_name",
        ArgumentType::String,
        "Table name, e.g. EMPLOYEES. Letters, digits and underscores only.",
    ))
    .with_argument(ArgumentSpec::optional(
        "schema",
        ArgumentType::String,
        "Schema that owns the table. Omit to use the default schema.",
    ))
}

/// Handler for the get_table_ddl tool.
pub struct DdlToolHandler {
    schema: Arc<dyn SchemaSource>,
    default_schema: Option<String>,
}

impl DdlToolHandler {
    pub fn new(schema: Arc<dyn SchemaSource>, default_schema: Option<String>) -> Self {
        Self {
            schema,
            default_schema,
        }
    }

    pub async fn get_table_ddl(&self, input: GetTableDdlInput) -> GatewayResult<DdlDescription> {
        let table = TableIdentifier::parse(&input.table_name, input.schema.as_deref())?
            .or_schema(self.default_schema.as_deref());

        info!(table = %table, "Fetching table DDL");
        self.schema.describe(&table).await
    }
}
