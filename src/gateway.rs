//! The tool-execution gateway.
//!
//! Builds the registry with both tools bound to a schema source and a query
//! runner, and owns the connection manager when it created one. Everything
//! above this type (MCP service, transports) only sees `dispatch`.

use crate::config::GatewaySettings;
use crate::db::{ConnectionManager, QueryExecutor, QueryRunner, SchemaInspector, SchemaSource};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{DatabaseType, ToolCallRequest, ToolCallResult, ToolDescriptor, validate_identifier};
use crate::tools::{
    DdlToolHandler, ExecuteSelectQueryInput, GetTableDdlInput, QueryValidator, SelectToolHandler,
    ToolRegistry, ddl, handler_fn, parse_input, select,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

pub struct Gateway {
    registry: ToolRegistry,
    default_schema: Option<String>,
    manager: Option<Arc<ConnectionManager>>,
    db_type: DatabaseType,
    max_rows: u32,
}

impl Gateway {
    /// Gateway backed by the configured database.
    pub fn new(settings: &GatewaySettings) -> GatewayResult<Self> {
        let manager = Arc::new(ConnectionManager::from_settings(settings));
        let inspector = Arc::new(SchemaInspector::new(
            manager.clone(),
            settings.query_timeout,
        ));
        let executor = Arc::new(QueryExecutor::new(manager.clone(), settings.query_timeout));

        let mut gateway = Self::with_components(settings, inspector, executor)?;
        gateway.manager = Some(manager);
        Ok(gateway)
    }

    /// Gateway over caller-supplied components. No connection manager is owned.
    pub fn with_components(
        settings: &GatewaySettings,
        schema: Arc<dyn SchemaSource>,
        runner: Arc<dyn QueryRunner>,
    ) -> GatewayResult<Self> {
        if let Some(default_schema) = &settings.default_schema {
            validate_identifier(default_schema)
                .map_err(|e| GatewayError::config(format!("default schema: {}", e)))?;
        }

        let validator = QueryValidator::new(settings.database.db_type, settings.max_rows);
        let ddl_handler = Arc::new(DdlToolHandler::new(
            schema,
            settings.default_schema.clone(),
        ));
        let select_handler = Arc::new(SelectToolHandler::new(validator, runner));

        let mut registry = ToolRegistry::new();
        registry.register(
            ddl::descriptor(),
            handler_fn(move |arguments| {
                let handler = ddl_handler.clone();
                async move {
                    let input: GetTableDdlInput = parse_input(arguments)?;
                    let ddl = handler.get_table_ddl(input).await?;
                    to_payload(&ddl)
                }
            }),
        )?;
        registry.register(
            select::descriptor(validator.max_rows()),
            handler_fn(move |arguments| {
                let handler = select_handler.clone();
                async move {
                    let input: ExecuteSelectQueryInput = parse_input(arguments)?;
                    let rows = handler.execute_select_query(input).await?;
                    to_payload(&rows)
                }
            }),
        )?;

        Ok(Self {
            registry,
            manager: None,
            default_schema: settings.default_schema.clone(),
            db_type: validator.db_type(),
            max_rows: validator.max_rows(),
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Human-readable answer to "which schema does an unqualified name use?".
    pub fn default_schema_hint(&self) -> String {
        match &self.default_schema {
            Some(schema) => schema.clone(),
            None => self.db_type.default_schema_hint().to_string(),
        }
    }

    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResult {
        self.registry.dispatch(request).await
    }

    /// Convenience form of [`Gateway::dispatch`] for a JSON argument object.
    pub async fn call(&self, tool: &str, arguments: JsonValue) -> ToolCallResult {
        self.dispatch(ToolCallRequest::from_json(tool, arguments))
            .await
    }

    /// Open the database eagerly. A no-op without an owned connection manager.
    pub async fn connect(&self) -> GatewayResult<()> {
        match &self.manager {
            Some(manager) => manager.connect().await,
            None => Ok(()),
        }
    }

    pub async fn health_check(&self) -> GatewayResult<()> {
        match &self.manager {
            Some(manager) => manager.health_check().await,
            None => Ok(()),
        }
    }

    pub async fn close(&self) {
        if let Some(manager) = &self.manager {
            info!("Closing database connections");
            manager.close().await;
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("db_type", &self.db_type)
            .field("max_rows", &self.max_rows)
            .field("owns_connections", &self.manager.is_some())
            .finish()
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> GatewayResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| GatewayError::internal(e.to_string()))
}
