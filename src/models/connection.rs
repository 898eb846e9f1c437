//! Database flavours the gateway can front.

/// The engine behind the configured URL. MariaDB counts as MySQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
}

/// URL prefixes, matched case-insensitively.
const URL_PREFIXES: &[(&str, DatabaseType)] = &[
    ("postgres://", DatabaseType::PostgreSQL),
    ("postgresql://", DatabaseType::PostgreSQL),
    ("mysql://", DatabaseType::MySQL),
    ("mariadb://", DatabaseType::MySQL),
    ("sqlite:", DatabaseType::SQLite),
];

impl DatabaseType {
    pub fn from_connection_string(url: &str) -> Option<Self> {
        URL_PREFIXES.iter().find_map(|(prefix, db_type)| {
            url.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| *db_type)
        })
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Where an unqualified table name is looked up.
    pub fn default_schema_hint(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "the session's current schema (usually public)",
            Self::MySQL => "the database named in the connection URL",
            Self::SQLite => "main",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
