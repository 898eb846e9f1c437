//! Database access layer.
//!
//! - `pool`: connection lifecycle, retries and read-only sessions
//! - `executor`: bounded execution of validated queries
//! - `schema`: table definitions from the metadata catalogs
//! - `types`: native column types to result scalars

pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::{QueryExecutor, QueryRunner};
pub use pool::{ConnectionHandle, ConnectionManager, DbPool, PooledConnection};
pub use schema::{SchemaInspector, SchemaSource};
