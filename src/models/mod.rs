//! Data models for the SQL check gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;
pub mod tool;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use query::{QuerySpec, RowSet, ScalarValue, StatementKind};
pub use schema::{DdlDescription, MAX_IDENTIFIER_LEN, TableIdentifier, validate_identifier};
pub use tool::{
    ArgumentSpec, ArgumentType, ErrorEnvelope, ToolCallRequest, ToolCallResult, ToolDescriptor,
};
