//! Table definition lookup.
//!
//! Returns the CREATE statement for one table (or view) from the database's
//! own metadata facility. Names travel as bound parameters wherever the engine
//! allows it; the remaining interpolations only ever see identifiers that
//! passed the identifier grammar or names read back from the catalog.
//!
//! # Architecture
//!
//! SQL text lives in the `queries` submodule. Database-specific lookups are in
//! the `postgres`, `mysql` and `sqlite` submodules.

use crate::db::pool::{ConnectionHandle, ConnectionManager, PooledConnection};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{DdlDescription, TableIdentifier};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Source of table definitions.
pub trait SchemaSource: Send + Sync {
    fn describe<'a>(
        &'a self,
        table: &'a TableIdentifier,
    ) -> BoxFuture<'a, GatewayResult<DdlDescription>>;
}

/// Reads table definitions through the connection manager.
pub struct SchemaInspector {
    manager: Arc<ConnectionManager>,
    query_timeout: Duration,
}

impl SchemaInspector {
    pub fn new(manager: Arc<ConnectionManager>, query_timeout: Duration) -> Self {
        Self {
            manager,
            query_timeout,
        }
    }

    /// Fetch the DDL for `table`. A table without a schema is looked up in the
    /// session's default schema (`public`, `DATABASE()`, `main`).
    pub async fn describe_table(&self, table: &TableIdentifier) -> GatewayResult<DdlDescription> {
        debug!(table = %table, "Describing table");

        let mut handle = self.manager.acquire().await?;
        let result = match timeout(self.query_timeout, lookup(&mut handle, table)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(
                "table description",
                self.query_timeout.as_secs(),
            )),
        };
        if let Err(e) = &result {
            handle.note_failure(e);
        }
        self.manager.release(handle).await;

        let ddl = result?.ok_or_else(|| GatewayError::not_found(table.to_string()))?;
        Ok(DdlDescription { ddl })
    }
}

impl SchemaSource for SchemaInspector {
    fn describe<'a>(
        &'a self,
        table: &'a TableIdentifier,
    ) -> BoxFuture<'a, GatewayResult<DdlDescription>> {
        Box::pin(self.describe_table(table))
    }
}

async fn lookup(
    handle: &mut ConnectionHandle,
    table: &TableIdentifier,
) -> GatewayResult<Option<String>> {
    match handle.connection()? {
        PooledConnection::Postgres(c) => postgres::table_ddl(&mut **c, table).await,
        PooledConnection::MySql(c) => mysql::table_ddl(&mut **c, table).await,
        PooledConnection::SQLite(c) => sqlite::table_ddl(&mut **c, table).await,
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        /// Exact-case name wins over a case-insensitive match.
        pub const RESOLVE_RELATION: &str = r#"
        SELECT
            c.oid::int8 AS relation_oid,
            n.nspname AS schema_name,
            c.relname AS table_name,
            c.relkind::text AS relkind
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
        AND lower(c.relname) = lower($1)
        AND lower(n.nspname) = lower(COALESCE($2::text, current_schema()))
        ORDER BY
            (c.relname = $1) DESC,
            (n.nspname = COALESCE($2::text, current_schema())) DESC
        LIMIT 1
        "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            a.attname AS column_name,
            pg_catalog.format_type(a.atttypid, a.atttypmod) AS column_type,
            a.attnotnull AS not_null,
            pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default
        FROM pg_catalog.pg_attribute a
        LEFT JOIN pg_catalog.pg_attrdef d
            ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE a.attrelid = $1::oid
        AND a.attnum > 0
        AND NOT a.attisdropped
        ORDER BY a.attnum
        "#;

        pub const DESCRIBE_CONSTRAINTS: &str = r#"
        SELECT
            conname AS constraint_name,
            pg_catalog.pg_get_constraintdef(oid, true) AS definition
        FROM pg_catalog.pg_constraint
        WHERE conrelid = $1::oid
        AND contype <> 'n'
        ORDER BY
            CASE contype WHEN 'p' THEN 0 WHEN 'u' THEN 1 WHEN 'f' THEN 2 ELSE 3 END,
            conname
        "#;

        pub const VIEW_DEFINITION: &str = "SELECT pg_catalog.pg_get_viewdef($1::oid, true)";
    }

    pub mod mysql {
        pub const RESOLVE_TABLE: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND LOWER(TABLE_NAME) = LOWER(?)
        ORDER BY BINARY TABLE_NAME = BINARY ? DESC
        LIMIT 1
        "#;
    }

    pub mod sqlite {
        pub const SCHEMA_EXISTS: &str =
            "SELECT name FROM pragma_database_list WHERE name = ?1 COLLATE NOCASE";

        /// `{schema}` is substituted with a validated, quoted identifier.
        pub const TABLE_SQL: &str = r#"
            SELECT sql FROM {schema}.sqlite_master
            WHERE type IN ('table', 'view')
            AND name = ?1 COLLATE NOCASE
            AND sql IS NOT NULL
            ORDER BY name = ?1 DESC
            LIMIT 1
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn table_ddl(
        conn: &mut PgConnection,
        table: &TableIdentifier,
    ) -> GatewayResult<Option<String>> {
        let resolved = sqlx::query(queries::postgres::RESOLVE_RELATION)
            .bind(table.table())
            .bind(table.schema())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = resolved else {
            return Ok(None);
        };

        let oid: i64 = row.try_get("relation_oid")?;
        let schema_name: String = row.try_get("schema_name")?;
        let table_name: String = row.try_get("table_name")?;
        let relkind: String = row.try_get("relkind")?;
        let qualified = format!("{}.{}", quote_ident(&schema_name), quote_ident(&table_name));

        if relkind == "v" || relkind == "m" {
            let definition: String = sqlx::query_scalar(queries::postgres::VIEW_DEFINITION)
                .bind(oid)
                .fetch_one(&mut *conn)
                .await?;
            let kind = if relkind == "m" {
                "MATERIALIZED VIEW"
            } else {
                "VIEW"
            };
            return Ok(Some(format!(
                "CREATE {} {} AS\n{}",
                kind,
                qualified,
                definition.trim_end()
            )));
        }

        let columns = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(oid)
            .fetch_all(&mut *conn)
            .await?;
        let constraints = sqlx::query(queries::postgres::DESCRIBE_CONSTRAINTS)
            .bind(oid)
            .fetch_all(&mut *conn)
            .await?;

        let mut lines = Vec::with_capacity(columns.len() + constraints.len());
        for row in &columns {
            let name: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type")?;
            let not_null: bool = row.try_get("not_null")?;
            let default: Option<String> = row.try_get("column_default")?;

            let mut line = format!("    {} {}", quote_ident(&name), column_type);
            if let Some(default) = default {
                line.push_str(" DEFAULT ");
                line.push_str(&default);
            }
            if not_null {
                line.push_str(" NOT NULL");
            }
            lines.push(line);
        }
        for row in &constraints {
            let name: String = row.try_get("constraint_name")?;
            let definition: String = row.try_get("definition")?;
            lines.push(format!("    CONSTRAINT {} {}", quote_ident(&name), definition));
        }

        let object = if relkind == "f" {
            "FOREIGN TABLE"
        } else {
            "TABLE"
        };
        Ok(Some(format!(
            "CREATE {} {} (\n{}\n);",
            object,
            qualified,
            lines.join(",\n")
        )))
    }

    /// Quote a catalog name unless it is a plain lower-case identifier.
    pub fn quote_ident(name: &str) -> String {
        let plain = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if plain {
            name.to_string()
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }
}

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlConnection, Row};

    pub async fn table_ddl(
        conn: &mut MySqlConnection,
        table: &TableIdentifier,
    ) -> GatewayResult<Option<String>> {
        let resolved = sqlx::query(queries::mysql::RESOLVE_TABLE)
            .bind(table.schema())
            .bind(table.table())
            .bind(table.table())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = resolved else {
            return Ok(None);
        };

        let schema_name: String = row.try_get("TABLE_SCHEMA")?;
        let table_name: String = row.try_get("TABLE_NAME")?;
        let sql = format!(
            "SHOW CREATE TABLE {}.{}",
            quote_ident(&schema_name),
            quote_ident(&table_name)
        );

        // SHOW statements go over the text protocol.
        let Some(row) = conn.fetch_optional(sql.as_str()).await? else {
            return Ok(None);
        };
        Ok(string_at(&row, 1))
    }

    pub fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// SHOW output may be typed as text or as binary depending on the server.
    fn string_at(row: &sqlx::mysql::MySqlRow, index: usize) -> Option<String> {
        row.try_get::<String, _>(index).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;

    pub async fn table_ddl(
        conn: &mut SqliteConnection,
        table: &TableIdentifier,
    ) -> GatewayResult<Option<String>> {
        let schema = table.schema().unwrap_or("main");
        let attached: Option<String> = sqlx::query_scalar(queries::sqlite::SCHEMA_EXISTS)
            .bind(schema)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(schema) = attached else {
            return Ok(None);
        };

        let sql = queries::sqlite::TABLE_SQL.replace("{schema}", &quote_ident(&schema));
        let ddl: Option<String> = sqlx::query_scalar(&sql)
            .bind(table.table())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(ddl)
    }

    pub fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
