//! MCP server integration.
//!
//! Exposes the gateway's tools over the MCP protocol using the rmcp framework.

pub mod service;

pub use service::GatewayService;
