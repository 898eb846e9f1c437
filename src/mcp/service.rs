//! MCP service implementation using rmcp.
//!
//! Tools are listed from the gateway's registry rather than generated by
//! macros, so the MCP surface always matches what `dispatch` accepts.

use crate::gateway::Gateway;
use crate::models::{DdlDescription, RowSet, ToolCallRequest, ToolDescriptor};
use crate::tools::{ddl, select};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, JsonObject, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use schemars::JsonSchema;
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayService {
    gateway: Arc<Gateway>,
}

impl GatewayService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// MCP tool definitions for every registered tool.
    pub fn tools(&self) -> Vec<Tool> {
        self.gateway.descriptors().map(to_mcp_tool).collect()
    }

    /// Dispatch one call and wrap the outcome as structured content.
    pub async fn handle_call(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult {
        let request = ToolCallRequest::new(name, arguments.unwrap_or_default());
        let result = self.gateway.dispatch(request).await;
        let envelope = result.to_envelope();
        if result.is_success() {
            CallToolResult::structured(envelope)
        } else {
            CallToolResult::structured_error(envelope)
        }
    }
}

fn to_mcp_tool(descriptor: &ToolDescriptor) -> Tool {
    let mut tool = Tool::new(
        descriptor.name.clone(),
        descriptor.description.clone(),
        Arc::new(descriptor.input_schema()),
    );
    tool.output_schema = match descriptor.name.as_str() {
        ddl::TOOL_NAME => Some(object_schema::<DdlDescription>()),
        select::TOOL_NAME => Some(object_schema::<RowSet>()),
        _ => None,
    };
    tool
}

fn object_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    Arc::new(schema.as_object().cloned().unwrap_or_default())
}

impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-check-mcp".to_owned(),
                title: Some("SQL Check MCP Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Read-only access to one {} database.\n\
                \n\
                ## Workflow\n\
                1. Call `get_table_ddl` with a table name to learn its columns and types\n\
                2. Call `execute_select_query` with a single SELECT statement\n\
                \n\
                ## Rules\n\
                - Table and schema names: letters, digits and underscores only\n\
                - Without `schema`, tables are looked up in {}\n\
                - Only one SELECT per call; no trailing statements\n\
                - At most {} rows are returned; `truncated: true` means more rows exist\n\
                - Failures return `{{error_kind, message}}`",
                self.gateway.db_type(),
                self.gateway.default_schema_hint(),
                self.gateway.max_rows()
            )),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.handle_call(&request.name, request.arguments).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, GatewaySettings};
    use crate::db::{QueryRunner, SchemaSource};
    use crate::error::{GatewayError, GatewayResult};
    use crate::models::{QuerySpec, ScalarValue, TableIdentifier};
    use crate::tools::{ExecuteSelectQueryInput, GetTableDdlInput};
    use futures_util::future::BoxFuture;
    use serde_json::json;

    struct FixedSource;

    impl SchemaSource for FixedSource {
        fn describe<'a>(
            &'a self,
            table: &'a TableIdentifier,
        ) -> BoxFuture<'a, GatewayResult<DdlDescription>> {
            Box::pin(async move {
                match table.table() {
                    "EMPLOYEES" => Ok(DdlDescription {
                        ddl: "CREATE TABLE EMPLOYEES (ID INTEGER)".into(),
                    }),
                    other => Err(GatewayError::not_found(other)),
                }
            })
        }
    }

    struct OneRow;

    impl QueryRunner for OneRow {
        fn run<'a>(&'a self, spec: &'a QuerySpec) -> BoxFuture<'a, GatewayResult<RowSet>> {
            Box::pin(async move {
                Ok(RowSet::bounded(
                    vec!["ONE".into()],
                    vec![vec![ScalarValue::Integer(1)]],
                    spec.limit(),
                ))
            })
        }
    }

    fn service() -> GatewayService {
        let settings = GatewaySettings::new(DatabaseConfig::parse("sqlite:unused.db").unwrap())
            .with_max_rows(50);
        let gateway =
            Gateway::with_components(&settings, Arc::new(FixedSource), Arc::new(OneRow)).unwrap();
        GatewayService::new(Arc::new(gateway))
    }

    #[test]
    fn test_get_info() {
        let info = service().get_info();
        assert_eq!(info.server_info.name, "sql-check-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("50 rows"));
    }

    #[test]
    fn test_tools_carry_input_and_output_schemas() {
        let tools = service().tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_table_ddl");
        assert_eq!(tools[1].name, "execute_select_query");
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
            let output = tool.output_schema.as_ref().unwrap();
            assert!(output.contains_key("properties"));
        }
    }

    #[test]
    fn test_input_structs_match_declared_arguments() {
        let service = service();
        let declared: Vec<(String, Vec<String>)> = service
            .gateway()
            .descriptors()
            .map(|d| {
                (
                    d.name.clone(),
                    d.arguments.iter().map(|a| a.name.clone()).collect(),
                )
            })
            .collect();

        let derived = |schema: schemars::Schema| -> Vec<String> {
            let mut names: Vec<String> = schema
                .as_object()
                .and_then(|o| o.get("properties"))
                .and_then(|p| p.as_object())
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default();
            names.sort();
            names
        };

        for (name, mut args) in declared {
            args.sort();
            let schema = match name.as_str() {
                ddl::TOOL_NAME => schemars::schema_for!(GetTableDdlInput),
                select::TOOL_NAME => schemars::schema_for!(ExecuteSelectQueryInput),
                other => panic!("unexpected tool {other}"),
            };
            assert_eq!(derived(schema), args, "{name}");
        }
    }

    #[tokio::test]
    async fn test_handle_call_success_is_structured() {
        let result = service()
            .handle_call(
                "execute_select_query",
                json!({"query": "SELECT 1 AS ONE"}).as_object().cloned(),
            )
            .await;
        assert_ne!(result.is_error, Some(true));
        let content = result.structured_content.unwrap();
        assert_eq!(content["columns"], json!(["ONE"]));
        assert_eq!(content["truncated"], json!(false));
    }

    #[tokio::test]
    async fn test_handle_call_failure_is_envelope() {
        let service = service();

        let result = service
            .handle_call(
                "get_table_ddl",
                json!({"table_name": "NOPE"}).as_object().cloned(),
            )
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.structured_content.unwrap()["error_kind"], "NotFound");

        let result = service.handle_call("drop_table", None).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.structured_content.unwrap()["error_kind"],
            "UnknownTool"
        );
    }
}
