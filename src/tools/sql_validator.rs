//! Query policy: SELECT only, one statement, bounded result size.
//!
//! Validation happens in two passes over the text, both with the configured
//! database's dialect:
//! 1. Tokens: the first meaningful token must be `SELECT`, and the only
//!    statement terminator allowed is a single trailing one.
//! 2. AST: the text must parse as exactly one query built from SELECT blocks
//!    and set operations, with no `INTO` and no row locks.
//!
//! The row bound is then enforced by rewriting the outermost LIMIT (or FETCH)
//! clause. Anything the validator cannot understand is rejected.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) for both passes.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{DatabaseType, QuerySpec};
use sqlparser::ast::{Expr, LimitClause, Query, SetExpr, Statement, Value};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

mod error_messages {
    pub const NOT_SELECT: &str = "Only SELECT queries are allowed";
    pub const MULTIPLE_STATEMENTS: &str =
        "Multiple statements are not allowed; submit a single SELECT query";
    pub const SELECT_INTO: &str = "SELECT ... INTO is not allowed";
    pub const LOCKING: &str = "Row-locking clauses (FOR UPDATE / FOR SHARE) are not allowed";
    pub const EMPTY: &str = "query must not be empty";
    pub const BAD_MAX_ROWS: &str = "max_rows must be a positive integer";
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Validates agent-supplied query text and bounds its result size.
#[derive(Debug, Clone, Copy)]
pub struct QueryValidator {
    db_type: DatabaseType,
    max_rows: u32,
}

/// Outcome of enforcing the row bound on a parsed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitDecision {
    /// The query's own literal limit fits under the cap.
    Preserved(u32),
    /// The limit clause was added or replaced with cap + 1.
    Imposed,
}

impl QueryValidator {
    pub fn new(db_type: DatabaseType, max_rows: u32) -> Self {
        Self {
            db_type,
            max_rows: max_rows.max(1),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Configured row ceiling.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Validate `raw` and produce the bounded query to execute.
    ///
    /// # Examples
    ///
    /// ```
    /// use sql_check_mcp::models::DatabaseType;
    /// use sql_check_mcp::tools::QueryValidator;
    ///
    /// let validator = QueryValidator::new(DatabaseType::SQLite, 100);
    ///
    /// let spec = validator.validate("SELECT * FROM EMPLOYEES", None).unwrap();
    /// assert_eq!(spec.limit(), 100);
    /// assert!(spec.limit_imposed());
    ///
    /// assert!(validator.validate("DELETE FROM EMPLOYEES", None).is_err());
    /// ```
    pub fn validate(&self, raw: &str, requested_max_rows: Option<i64>) -> GatewayResult<QuerySpec> {
        let dialect = get_dialect(self.db_type);
        let text = strip_terminator(raw, dialect.as_ref())?;

        let mut statements = Parser::parse_sql(dialect.as_ref(), text)
            .map_err(|e| GatewayError::unsupported_syntax(e.to_string()))?;
        if statements.len() != 1 {
            return Err(GatewayError::forbidden(error_messages::MULTIPLE_STATEMENTS));
        }
        let Some(Statement::Query(mut query)) = statements.pop() else {
            return Err(GatewayError::forbidden(error_messages::NOT_SELECT));
        };
        check_query(&query)?;

        let cap = self.effective_cap(requested_max_rows)?;
        let spec = match apply_cap(&mut query, cap) {
            LimitDecision::Preserved(limit) => QuerySpec::new(raw, text, limit, false),
            LimitDecision::Imposed => {
                QuerySpec::new(raw, Statement::Query(query).to_string(), cap, true)
            }
        };
        Ok(spec)
    }

    /// min(requested, configured). Zero and negative requests are rejected.
    pub fn effective_cap(&self, requested: Option<i64>) -> GatewayResult<u32> {
        match requested {
            None => Ok(self.max_rows),
            Some(n) if n <= 0 => Err(GatewayError::invalid_arguments(
                error_messages::BAD_MAX_ROWS,
            )),
            Some(n) => Ok(u32::try_from(n).unwrap_or(u32::MAX).min(self.max_rows)),
        }
    }
}

// =============================================================================
// Token Pass
// =============================================================================

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::EOF)
}

/// Check the leading keyword and terminators; return the text without the
/// optional trailing `;`.
fn strip_terminator<'a>(raw: &'a str, dialect: &dyn Dialect) -> GatewayResult<&'a str> {
    let tokens: Vec<TokenWithSpan> = Tokenizer::new(dialect, raw)
        .tokenize_with_location()
        .map_err(|e| GatewayError::forbidden(format!("Query could not be tokenized: {}", e)))?;

    let mut meaningful = tokens.iter().filter(|t| !is_trivia(&t.token));
    match meaningful.next().map(|t| &t.token) {
        None => return Err(GatewayError::invalid_arguments(error_messages::EMPTY)),
        Some(Token::Word(word)) if word.keyword == Keyword::SELECT => {}
        Some(other) => {
            return Err(GatewayError::forbidden(format!(
                "{}; the query starts with '{}'",
                error_messages::NOT_SELECT,
                leading_word(other)
            )));
        }
    }

    let terminators: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| t.token == Token::SemiColon)
        .collect();
    let Some(last) = terminators.last() else {
        return Ok(raw);
    };
    if terminators.len() > 1 {
        return Err(GatewayError::forbidden(error_messages::MULTIPLE_STATEMENTS));
    }

    let trailing_only = tokens
        .iter()
        .skip_while(|t| t.token != Token::SemiColon)
        .skip(1)
        .all(|t| is_trivia(&t.token));
    if !trailing_only {
        return Err(GatewayError::forbidden(error_messages::MULTIPLE_STATEMENTS));
    }

    let cut = byte_offset(raw, last.span.start).ok_or_else(|| {
        GatewayError::forbidden("Query terminator could not be located")
    })?;
    Ok(raw[..cut].trim_end())
}

fn leading_word(token: &Token) -> String {
    let text = match token {
        Token::Word(word) => word.value.clone(),
        other => other.to_string(),
    };
    text.chars().take(32).collect()
}

/// Byte offset of a 1-based line/column location.
fn byte_offset(text: &str, location: Location) -> Option<usize> {
    let (mut line, mut column) = (1u64, 1u64);
    for (offset, ch) in text.char_indices() {
        if line == location.line && column == location.column {
            return Some(offset);
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    None
}

// =============================================================================
// AST Pass
// =============================================================================

fn check_query(query: &Query) -> GatewayResult<()> {
    if !query.locks.is_empty() {
        return Err(GatewayError::forbidden(error_messages::LOCKING));
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> GatewayResult<()> {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                return Err(GatewayError::forbidden(error_messages::SELECT_INTO));
            }
            Ok(())
        }
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        _ => Err(GatewayError::forbidden(error_messages::NOT_SELECT)),
    }
}

// =============================================================================
// Row Bound
// =============================================================================

fn number(n: u64) -> Expr {
    Expr::value(Value::Number(n.to_string(), false))
}

/// Value of an integer literal, looking through parentheses.
fn literal_count(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::Value(v) => match &v.value {
            Value::Number(n, _) => n.parse().ok(),
            _ => None,
        },
        Expr::Nested(inner) => literal_count(inner),
        _ => None,
    }
}

fn clamp(limit: &mut Expr, cap: u32) -> LimitDecision {
    match literal_count(limit) {
        Some(n) if n <= u64::from(cap) => LimitDecision::Preserved(n as u32),
        _ => {
            *limit = number(u64::from(cap) + 1);
            LimitDecision::Imposed
        }
    }
}

/// Enforce `cap` on the outermost query, fetching one probe row past it.
fn apply_cap(query: &mut Query, cap: u32) -> LimitDecision {
    if let Some(clause) = query.limit_clause.as_mut() {
        let limit = match clause {
            LimitClause::LimitOffset { limit, .. } => limit.as_mut(),
            LimitClause::OffsetCommaLimit { limit, .. } => Some(limit),
        };
        if let Some(limit) = limit {
            return clamp(limit, cap);
        }
    }

    if let Some(fetch) = query.fetch.as_mut() {
        if !fetch.percent {
            match fetch.quantity.as_mut() {
                Some(quantity) => return clamp(quantity, cap),
                // FETCH FIRST ROW ONLY
                None => return LimitDecision::Preserved(1),
            }
        }
        fetch.percent = false;
        fetch.quantity = Some(number(u64::from(cap) + 1));
        return LimitDecision::Imposed;
    }

    match query.limit_clause.as_mut() {
        Some(LimitClause::LimitOffset { limit, .. }) => *limit = Some(number(u64::from(cap) + 1)),
        _ => {
            query.limit_clause = Some(LimitClause::LimitOffset {
                limit: Some(number(u64::from(cap) + 1)),
                offset: None,
                limit_by: Vec::new(),
            })
        }
    }
    LimitDecision::Imposed
}
