//! Schema-related data models.

use crate::error::{GatewayError, GatewayResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Longest accepted table or schema name.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Check a bare name against the identifier grammar:
/// `[A-Za-z_][A-Za-z0-9_]{0,63}`.
pub fn validate_identifier(value: &str) -> GatewayResult<()> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(GatewayError::invalid_identifier(value, "must not be empty"));
    };
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(GatewayError::invalid_identifier(
            value,
            format!("longer than {} characters", MAX_IDENTIFIER_LEN),
        ));
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(GatewayError::invalid_identifier(
            value,
            "must start with a letter or underscore",
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(GatewayError::invalid_identifier(
            value,
            format!("character {:?} is not allowed", bad),
        ));
    }
    Ok(())
}

/// A table reference that has passed the identifier grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    schema: Option<String>,
    table: String,
}

impl TableIdentifier {
    /// Validate both parts. Nothing reaches the database unless this succeeds.
    pub fn parse(table: &str, schema: Option<&str>) -> GatewayResult<Self> {
        validate_identifier(table)?;
        if let Some(schema) = schema {
            validate_identifier(schema)?;
        }
        Ok(Self {
            schema: schema.map(String::from),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Use `schema` when no schema was given explicitly.
    pub fn or_schema(mut self, schema: Option<&str>) -> Self {
        if self.schema.is_none() {
            self.schema = schema.map(String::from);
        }
        self
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// Result of `get_table_ddl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DdlDescription {
    /// CREATE statement for the table.
    pub ddl: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_identifiers() {
        for name in ["EMP", "employees", "_tmp", "T1", "a_b_c_123"] {
            assert!(validate_identifier(name).is_ok(), "{name} should be valid");
        }
        assert!(validate_identifier(&"A".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in [
            "",
            "1EMP",
            "EMP; DROP TABLE X",
            "EMP--",
            "\"EMP\"",
            "EMP.NAME",
            "EMP ",
            "ÉMP",
        ] {
            let err = validate_identifier(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidIdentifier, "{name:?}");
        }
        assert!(validate_identifier(&"A".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_table_identifier_validates_schema() {
        assert!(TableIdentifier::parse("EMP", Some("HR")).is_ok());
        assert!(TableIdentifier::parse("EMP", Some("HR;")).is_err());
    }

    #[test]
    fn test_or_schema_keeps_explicit_schema() {
        let ident = TableIdentifier::parse("EMP", Some("HR"))
            .unwrap()
            .or_schema(Some("SALES"));
        assert_eq!(ident.schema(), Some("HR"));

        let ident = TableIdentifier::parse("EMP", None)
            .unwrap()
            .or_schema(Some("SALES"));
        assert_eq!(ident.to_string(), "SALES.EMP");
    }
}
