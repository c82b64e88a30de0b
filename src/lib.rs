//! Uniform, blocking access to MySQL, PostgreSQL, SQLite and ODBC databases.
//!
//! Every backend implements the same [`Connection`] and [`ResultSet`]
//! traits. Connections are obtained by driver name from the registry
//! ([`factory`]) or from a [`DatabaseConfig`], and are shared through
//! reference-counted [`ConnectionRef`] handles.

pub mod build;
pub mod database;
pub mod error;
pub mod logging;
mod utils;

#[cfg(all(test, feature = "sqlite"))]
mod database_tests;

pub use database::{
    BufferedResultSet, Connection, ConnectionCreator, ConnectionRef, DatabaseConfig,
    DatabaseError, DatabaseResult, DatabaseType, LastError, Qstr, ResultSet, TransactionMode,
    TruthRule, UnixTime, create_database_connection, factory, module_key, qstr, register_driver,
    registered_drivers, try_factory, unixtime, unregister_driver,
};

#[cfg(feature = "mysql")]
pub use database::{MySqlConnection, create_mysql_connection};
#[cfg(feature = "odbc")]
pub use database::{OdbcConnection, create_odbc_connection};
#[cfg(feature = "postgres")]
pub use database::{PostgresConnection, create_pq_connection};
#[cfg(feature = "sqlite")]
pub use database::{SqliteConnection, create_sqlite3_connection};

pub use error::{ConfigError, Error, Result};
pub use logging::init_logging;
pub use utils::{print_json, print_pretty_json};
