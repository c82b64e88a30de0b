use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::str::FromStr;
use thiserror::Error;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("query error: {0}")]
    Query(String),

    /// Transaction error
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Driver lookup or registration error
    #[error("driver error: {0}")]
    Driver(String),

    /// Operation attempted on a connection that is not open
    #[error("connection is not open")]
    NotConnected,

    /// The blocking runtime could not be created
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// Error reported by an sqlx backed adapter
    #[cfg(feature = "database")]
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Error reported by the ODBC driver manager
    #[cfg(feature = "odbc")]
    #[error("odbc error: {0}")]
    Odbc(#[from] odbc_api::Error),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// The most recent backend error retained by a connection.
///
/// Adapters overwrite it after every call that reaches the backend, so it
/// always describes the last operation, the way native client libraries do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastError {
    code: u32,
    message: String,
}

impl LastError {
    /// A record that already carries a code and message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set(&mut self, code: u32, message: impl Into<String>) {
        self.code = code;
        self.message = message.into();
    }

    pub fn clear(&mut self) {
        self.code = 0;
        self.message.clear();
    }
}

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL database
    #[serde(alias = "pq", alias = "postgresql", alias = "pg")]
    Postgres,
    /// MySQL database
    MySql,
    /// SQLite database
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// Any engine reachable through an ODBC driver manager
    Odbc,
}

impl DatabaseType {
    /// Name of the driver module that implements this backend.
    pub fn module_name(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "pq",
            DatabaseType::MySql => "mysql",
            DatabaseType::Sqlite => "sqlite3",
            DatabaseType::Odbc => "odbc",
        }
    }
}

impl Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::Postgres => write!(f, "postgres"),
            DatabaseType::MySql => write!(f, "mysql"),
            DatabaseType::Sqlite => write!(f, "sqlite"),
            DatabaseType::Odbc => write!(f, "odbc"),
        }
    }
}

impl FromStr for DatabaseType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pq" | "pg" => Ok(DatabaseType::Postgres),
            "mysql" => Ok(DatabaseType::MySql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "odbc" => Ok(DatabaseType::Odbc),
            other => Err(DatabaseError::Configuration(format!(
                "unknown database type '{}'",
                other
            ))),
        }
    }
}

/// Session isolation levels understood by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionMode {
    /// Allows dirty reads, but fastest
    ReadUncommitted,
    /// Default for PostgreSQL and most commercial engines
    ReadCommitted,
    /// Default for MySQL
    RepeatableRead,
    /// Slowest and most restrictive
    Serializable,
}

impl TransactionMode {
    pub const ALL: [TransactionMode; 4] = [
        TransactionMode::ReadUncommitted,
        TransactionMode::ReadCommitted,
        TransactionMode::RepeatableRead,
        TransactionMode::Serializable,
    ];

    /// Statement issued by SQL-style backends (MySQL, PostgreSQL, ODBC).
    pub fn isolation_statement(&self) -> &'static str {
        match self {
            TransactionMode::ReadUncommitted => {
                "SET SESSION TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"
            }
            TransactionMode::ReadCommitted => "SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED",
            TransactionMode::RepeatableRead => {
                "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ"
            }
            TransactionMode::Serializable => "SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }

    /// Pragma issued by SQLite. Only SERIALIZABLE turns dirty reads off.
    pub fn sqlite_pragma(&self) -> &'static str {
        match self {
            TransactionMode::ReadUncommitted
            | TransactionMode::ReadCommitted
            | TransactionMode::RepeatableRead => "PRAGMA read_uncommitted = true",
            TransactionMode::Serializable => "PRAGMA read_uncommitted = false",
        }
    }
}

impl FromStr for TransactionMode {
    type Err = DatabaseError;

    /// Accepts `READ_COMMITTED`, `read-committed` or `read committed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "READ_UNCOMMITTED" => Ok(TransactionMode::ReadUncommitted),
            "READ_COMMITTED" => Ok(TransactionMode::ReadCommitted),
            "REPEATABLE_READ" => Ok(TransactionMode::RepeatableRead),
            "SERIALIZABLE" => Ok(TransactionMode::Serializable),
            _ => Err(DatabaseError::Configuration(format!(
                "unknown transaction mode '{}'",
                s
            ))),
        }
    }
}

/// Forward-only, read-only cursor over the rows produced by one query.
///
/// Columns are numbered from zero. Before the first successful [`next`]
/// every accessor returns `None` or zero. Only [`get_string`] can tell a SQL
/// NULL apart; the numeric and boolean getters return zero (or `false`) for
/// NULL and for text they cannot parse.
///
/// [`next`]: ResultSet::next
/// [`get_string`]: ResultSet::get_string
pub trait ResultSet: Send {
    /// Advance one row. Returns `false` once the rows are exhausted; the
    /// cursor then stays exhausted.
    fn next(&mut self) -> bool;

    /// Drain unread rows and release backend resources. Consumes the cursor.
    fn close(self: Box<Self>) -> bool;

    /// Index of the column called `name` (exact, case-sensitive), or the
    /// column count when no such column exists.
    fn find_column(&self, name: &str) -> usize;

    /// Number of columns in each row.
    fn column_count(&self) -> usize;

    /// Name of column `idx`, `None` past the last column.
    fn column_name(&self, idx: usize) -> Option<&str>;

    /// Number of rows in the result. Callers should not rely on it before
    /// the cursor has been drained.
    fn record_count(&self) -> u64;

    /// Text of column `idx` in the current row, `None` for SQL NULL.
    fn get_string(&self, idx: usize) -> Option<&str>;

    fn get_integer(&self, idx: usize) -> i32 {
        convert::to_int(self.get_string(idx))
    }

    fn get_bool(&self, idx: usize) -> bool {
        convert::to_bool(self.get_string(idx))
    }

    /// Seconds since the epoch, parsed from `YYYY-MM-DD HH:MM:SS` or
    /// `YYYYMMDDHHMMSS` text and read as local time.
    fn get_unix_time(&self, idx: usize) -> i64 {
        convert::to_unix_time(self.get_string(idx))
    }

    fn get_double(&self, idx: usize) -> f64 {
        convert::to_double(self.get_string(idx))
    }

    fn get_float(&self, idx: usize) -> f32 {
        convert::to_double(self.get_string(idx)) as f32
    }

    fn get_long(&self, idx: usize) -> i64 {
        convert::to_long(self.get_string(idx))
    }

    fn get_short(&self, idx: usize) -> i16 {
        convert::to_int(self.get_string(idx)) as i16
    }
}

/// One live session to one database instance.
///
/// Connections are created closed; [`open`](Connection::open) establishes
/// the session. Every failure is reported through the return value and the
/// details are kept for [`errorno`](Connection::errorno) and
/// [`errormsg`](Connection::errormsg). A connection may be used from one
/// thread at a time; distinct connections share no state.
pub trait Connection: Send {
    /// Open a session. The meaning of each argument is backend specific:
    /// SQLite treats `database` as a file path and ignores the rest, ODBC
    /// treats it as a connection string.
    fn open(
        &mut self,
        database: &str,
        host: Option<&str>,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> bool;

    /// Release the native session. Returns `false` when already closed.
    fn close(&mut self) -> bool;

    fn is_connected(&mut self) -> bool;

    /// Run a statement that produces no rows.
    fn execute(&mut self, sql: &str) -> bool;

    /// Run a statement that produces rows.
    ///
    /// Returns `None` both when the statement failed and when it produced
    /// no row set; consult [`errorno`](Connection::errorno) to tell them
    /// apart.
    fn execute_query(&mut self, sql: &str) -> Option<Box<dyn ResultSet>>;

    /// Quoted string literal for `text`, including the surrounding quotes.
    fn escape(&self, text: &str) -> String;

    /// Quoted `'YYYY-MM-DD HH:MM:SS'` literal for `time`, in UTC.
    fn unixtime_to_sql(&self, time: i64) -> String {
        literal::unixtime_to_sql(time)
    }

    /// Last auto-generated key, or zero where the backend has no such notion.
    fn insert_id(&mut self) -> u64;

    fn begin_trans(&mut self) -> bool;

    fn commit_trans(&mut self) -> bool;

    fn rollback_trans(&mut self) -> bool;

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> bool;

    fn errorno(&self) -> u32;

    fn errormsg(&self) -> &str;

    /// Adapter identification, plus the backend version once known.
    fn version(&self) -> &str;

    /// Names of the tables visible to the session.
    fn tables(&mut self) -> Vec<String> {
        Vec::new()
    }
}

pub mod config;
pub mod convert;
pub mod handle;
pub mod literal;
pub mod registry;
pub mod result_set;

#[cfg(feature = "database")]
mod runtime;

pub use config::{DatabaseConfig, create_database_connection};
pub use handle::ConnectionRef;
pub use literal::{Qstr, UnixTime, qstr, unixtime};
pub use registry::{
    ConnectionCreator, factory, module_key, register_driver, registered_drivers, try_factory,
    unregister_driver,
};
pub use result_set::{BufferedResultSet, TruthRule};

// Implementation modules for specific database types
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;
#[cfg(feature = "postgres")]
pub use registry::create_pq_connection;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "mysql")]
pub use mysql::MySqlConnection;
#[cfg(feature = "mysql")]
pub use registry::create_mysql_connection;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
#[cfg(feature = "sqlite")]
pub use registry::create_sqlite3_connection;

#[cfg(feature = "odbc")]
pub mod odbc;
#[cfg(feature = "odbc")]
pub use odbc::OdbcConnection;
#[cfg(feature = "odbc")]
pub use registry::create_odbc_connection;
