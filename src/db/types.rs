//! Native column types to the closed scalar set.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders extract the value as a [`ScalarValue`]
//!
//! Anything that has no lossless JSON scalar (decimals, UUIDs, JSON documents,
//! temporal values, oversized unsigned integers) is rendered as text; binary
//! columns are base64-encoded.

use crate::models::{DatabaseType, ScalarValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Text,
    Binary,
    Json,
    Uuid,
    Unknown,
}

const INTEGER_TYPES: &[&str] = &[
    "int",
    "integer",
    "int2",
    "int4",
    "int8",
    "tinyint",
    "smallint",
    "mediumint",
    "bigint",
    "serial",
    "smallserial",
    "bigserial",
];

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower.trim_end_matches(" unsigned");

    if base.contains("decimal") || base.contains("numeric") {
        // SQLite's NUMERIC affinity holds integers or reals, never exact decimals
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if INTEGER_TYPES.contains(&base) {
        return TypeCategory::Integer;
    }

    if base == "bool" || base == "boolean" {
        return TypeCategory::Boolean;
    }

    if base.contains("float") || base.contains("double") || base == "real" {
        return TypeCategory::Float;
    }

    if base.starts_with("date") || base.starts_with("time") {
        return TypeCategory::Temporal;
    }

    if base == "json" || base == "jsonb" {
        return TypeCategory::Json;
    }

    if base == "uuid" {
        return TypeCategory::Uuid;
    }

    if base.contains("blob") || base.contains("binary") || base == "bytea" {
        return TypeCategory::Binary;
    }

    if base.contains("char") || base.contains("text") || base == "name" || base == "citext" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // MySQL sends DECIMAL as a length-encoded string in both protocols.
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

const PG_NUMERIC_NEG: u16 = 0x4000;
const PG_NUMERIC_NAN: u16 = 0xC000;
const PG_NUMERIC_PINF: u16 = 0xD000;
const PG_NUMERIC_NINF: u16 = 0xF000;

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as decimal text.
pub fn pg_numeric_to_string(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let read = |i: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*bytes.get(i)?, *bytes.get(i + 1)?]))
    };
    let header = (read(0), read(2), read(4), read(6));
    let (Some(ndigits), Some(weight), Some(sign), Some(dscale)) = header else {
        return Err("numeric value is shorter than its header".into());
    };
    let ndigits = ndigits as usize;
    let weight = weight as i16 as i32;
    let dscale = dscale as usize;

    match sign {
        PG_NUMERIC_NAN => return Ok("NaN".to_string()),
        PG_NUMERIC_PINF => return Ok("Infinity".to_string()),
        PG_NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()
        .ok_or("numeric value is shorter than its digit count")?;
    let group = |i: i32| -> u16 {
        if i < 0 {
            0
        } else {
            digits.get(i as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == PG_NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary cells are always base64 so the payload stays valid JSON text.
pub fn encode_binary_value(bytes: &[u8]) -> ScalarValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    ScalarValue::Text(STANDARD.encode(bytes))
}

/// Canonical 8-4-4-4-12 form of a 16-byte UUID.
pub fn format_uuid(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 16 {
        return None;
    }
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

// =============================================================================
// Row to Scalars Trait
// =============================================================================

/// Trait for converting database rows into positional scalar values.
pub trait RowToScalars {
    fn column_names(&self) -> Vec<String>;
    fn to_scalars(&self) -> Vec<ScalarValue>;
}

impl RowToScalars for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_scalars(&self) -> Vec<ScalarValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowToScalars for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_scalars(&self) -> Vec<ScalarValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowToScalars for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_scalars(&self) -> Vec<ScalarValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, category)
            })
            .collect()
    }
}

// =============================================================================
// Shared Decoders
// =============================================================================

fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, _>(idx).ok()
}

fn is_null<R>(row: &R, idx: usize) -> bool
where
    R: Row,
    usize: ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

fn decode_boolean<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
{
    get::<R, bool>(row, idx).map(ScalarValue::Bool)
}

fn decode_signed<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    i16: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
{
    get::<R, i64>(row, idx)
        .or_else(|| get::<R, i32>(row, idx).map(i64::from))
        .or_else(|| get::<R, i16>(row, idx).map(i64::from))
        .map(ScalarValue::Integer)
}

fn decode_float<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
{
    get::<R, f64>(row, idx)
        .or_else(|| get::<R, f32>(row, idx).map(f64::from))
        .map(ScalarValue::float)
}

fn decode_temporal<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    chrono::NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    chrono::DateTime<chrono::Utc>: Decode<'r, R::Database> + Type<R::Database>,
    chrono::NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    chrono::NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Some(v) = get::<R, chrono::NaiveDateTime>(row, idx) {
        return Some(ScalarValue::Text(
            v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        ));
    }
    if let Some(v) = get::<R, chrono::DateTime<chrono::Utc>>(row, idx) {
        return Some(ScalarValue::Text(v.to_rfc3339()));
    }
    if let Some(v) = get::<R, chrono::NaiveDate>(row, idx) {
        return Some(ScalarValue::Text(v.to_string()));
    }
    get::<R, chrono::NaiveTime>(row, idx).map(|v| ScalarValue::Text(v.to_string()))
}

fn decode_binary<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    get::<R, Vec<u8>>(row, idx).map(|v| encode_binary_value(&v))
}

/// Text first, then whatever the value's storage class allows.
fn decode_text<'r, R>(row: &'r R, idx: usize) -> Option<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    get::<R, String>(row, idx)
        .map(ScalarValue::Text)
        .or_else(|| get::<R, i64>(row, idx).map(ScalarValue::Integer))
        .or_else(|| get::<R, f64>(row, idx).map(ScalarValue::float))
        .or_else(|| decode_binary(row, idx))
}

fn undecodable(idx: usize, category: TypeCategory) -> ScalarValue {
    tracing::debug!(column = idx, ?category, "Column value could not be decoded");
    ScalarValue::Null
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> ScalarValue {
        if is_null(row, idx) {
            return ScalarValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|v| ScalarValue::Text(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx).or_else(|| decode_text(row, idx)),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => get::<_, serde_json::Value>(row, idx)
                .map(|v| ScalarValue::Text(v.to_string())),
            _ => decode_text(row, idx).or_else(|| decode_integer(row, idx)),
        };
        value.unwrap_or_else(|| undecodable(idx, category))
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<ScalarValue> {
        if let Some(v) = decode_signed(row, idx) {
            return Some(v);
        }
        if let Some(v) = get::<_, i8>(row, idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        if let Some(v) = get::<_, u8>(row, idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        if let Some(v) = get::<_, u16>(row, idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        if let Some(v) = get::<_, u32>(row, idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        get::<_, u64>(row, idx).map(|v| match i64::try_from(v) {
            Ok(signed) => ScalarValue::Integer(signed),
            Err(_) => ScalarValue::Text(v.to_string()),
        })
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> ScalarValue {
        if is_null(row, idx) {
            return ScalarValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|v| ScalarValue::Text(v.0)),
            TypeCategory::Integer => decode_signed(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => get::<_, serde_json::Value>(row, idx)
                .map(|v| ScalarValue::Text(v.to_string())),
            TypeCategory::Uuid => decode_uuid(row, idx),
            _ => get::<_, String>(row, idx).map(ScalarValue::Text),
        };
        value.unwrap_or_else(|| undecodable(idx, category))
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> Option<ScalarValue> {
        let raw = row.try_get_raw(idx).ok()?;
        match raw.format() {
            PgValueFormat::Text => raw.as_str().ok().map(|s| ScalarValue::Text(s.to_string())),
            PgValueFormat::Binary => raw
                .as_bytes()
                .ok()
                .and_then(format_uuid)
                .map(ScalarValue::Text),
        }
    }
}

mod sqlite {
    use super::*;

    // SQLite values carry their own storage class regardless of the declared
    // column type, so every category falls back to the text chain.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> ScalarValue {
        if is_null(row, idx) {
            return ScalarValue::Null;
        }
        let value = match category {
            TypeCategory::Integer => decode_signed(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            _ => None,
        };
        value
            .or_else(|| decode_text(row, idx))
            .unwrap_or_else(|| undecodable(idx, category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT8", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_does_not_confuse_int_substrings() {
        assert_eq!(
            categorize_type("POINT", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("TINYTEXT", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("TINYBLOB", DatabaseType::MySQL),
            TypeCategory::Binary
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        for name in ["DATE", "DATETIME", "TIMESTAMP", "TIMESTAMPTZ", "TIME"] {
            assert_eq!(
                categorize_type(name, DatabaseType::PostgreSQL),
                TypeCategory::Temporal,
                "{name}"
            );
        }
    }

    #[test]
    fn test_categorize_type_json_uuid() {
        assert_eq!(
            categorize_type("JSONB", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("UUID", DatabaseType::PostgreSQL),
            TypeCategory::Uuid
        );
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(&[0xff, 0xfe, 0x00]),
            ScalarValue::Text("//4A".to_string())
        );
        assert_eq!(encode_binary_value(&[]), ScalarValue::Text(String::new()));
    }

    #[test]
    fn test_format_uuid() {
        let bytes: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            format_uuid(&bytes).unwrap(),
            "00010203-0405-0607-0809-0a0b0c0d0e0f"
        );
        assert!(format_uuid(&bytes[..15]).is_none());
    }

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in [ndigits, weight as u16, sign, dscale] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_pg_numeric_to_string() {
        assert_eq!(
            pg_numeric_to_string(&numeric(2, 0, 0, 2, &[123, 4500])).unwrap(),
            "123.45"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, -1, 0, 2, &[500])).unwrap(),
            "0.05"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(2, -1, 0, 7, &[1, 2340])).unwrap(),
            "0.0001234"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, 1, 0, 0, &[1])).unwrap(),
            "10000"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, 0, PG_NUMERIC_NEG, 0, &[42])).unwrap(),
            "-42"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(0, 0, 0, 2, &[])).unwrap(),
            "0.00"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(0, 0, PG_NUMERIC_NAN, 0, &[])).unwrap(),
            "NaN"
        );
    }

    #[test]
    fn test_pg_numeric_rejects_truncated_input() {
        assert!(pg_numeric_to_string(&[0, 1]).is_err());
        assert!(pg_numeric_to_string(&numeric(3, 0, 0, 0, &[1])).is_err());
    }
}
