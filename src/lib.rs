//! SQL check gateway library.
//!
//! A tool-execution gateway that lets an AI agent inspect table definitions
//! and run bounded, read-only SELECT queries against one SQL database
//! (SQLite, PostgreSQL, MySQL), served over MCP.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use mcp::GatewayService;
