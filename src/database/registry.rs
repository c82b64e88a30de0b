//! Driver registry.
//!
//! Backends are selected at runtime by module name. Built-in adapters are
//! registered on first use; applications may add or replace drivers with
//! [`register_driver`].

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::path::Path;
use tracing::{debug, error};

use crate::database::{Connection, ConnectionRef, DatabaseError, DatabaseResult};

/// Constructor for a closed connection of one backend.
pub type ConnectionCreator = fn() -> Box<dyn Connection>;

static DRIVERS: Lazy<DashMap<String, ConnectionCreator>> = Lazy::new(|| {
    let drivers = DashMap::new();
    register_builtins(&drivers);
    drivers
});

#[allow(unused_variables)]
fn register_builtins(drivers: &DashMap<String, ConnectionCreator>) {
    #[cfg(feature = "mysql")]
    drivers.insert("mysql".to_string(), new_mysql as ConnectionCreator);
    #[cfg(feature = "postgres")]
    drivers.insert("pq".to_string(), new_pq as ConnectionCreator);
    #[cfg(feature = "sqlite")]
    drivers.insert("sqlite3".to_string(), new_sqlite3 as ConnectionCreator);
    #[cfg(feature = "odbc")]
    drivers.insert("odbc".to_string(), new_odbc as ConnectionCreator);
}

/// Reduce a module name or shared-library path to its registry key.
///
/// `/usr/lib/libdba_mysql.so`, `dba_mysql` and `MySQL` all give `mysql`.
/// Common aliases are folded (`postgres` to `pq`, `sqlite` to `sqlite3`).
pub fn module_key(module: &str) -> String {
    let file = Path::new(module.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(module)
        .to_ascii_lowercase();

    let mut key = file.as_str();
    for suffix in [".so", ".dylib", ".dll"] {
        if let Some(stripped) = key.strip_suffix(suffix) {
            key = stripped;
            break;
        }
    }
    if let Some(stripped) = key.strip_prefix("lib") {
        key = stripped;
    }
    if let Some(stripped) = key.strip_prefix("dba_") {
        key = stripped;
    }

    match key {
        "postgres" | "postgresql" | "pg" => "pq".to_string(),
        "sqlite" => "sqlite3".to_string(),
        other => other.to_string(),
    }
}

/// Register `creator` under `name`, replacing any earlier driver.
pub fn register_driver(name: &str, creator: ConnectionCreator) {
    let key = module_key(name);
    debug!(driver = %key, "registering database driver");
    DRIVERS.insert(key, creator);
}

/// Remove a driver. Returns `true` when one was registered.
pub fn unregister_driver(name: &str) -> bool {
    DRIVERS.remove(&module_key(name)).is_some()
}

/// Sorted names of every registered driver.
pub fn registered_drivers() -> Vec<String> {
    let mut names: Vec<String> = DRIVERS.iter().map(|entry| entry.key().clone()).collect();
    names.sort();
    names
}

/// Create a closed connection for `module`.
pub fn try_factory(module: &str) -> DatabaseResult<ConnectionRef> {
    let key = module_key(module);
    let creator = DRIVERS
        .get(&key)
        .map(|entry| *entry.value())
        .ok_or_else(|| DatabaseError::Driver(format!("no driver registered for '{}'", module)))?;
    debug!(driver = %key, "creating connection");
    Ok(ConnectionRef::new(creator()))
}

/// Create a closed connection for `module`, or `None` after logging why
/// no driver could be found.
pub fn factory(module: &str) -> Option<ConnectionRef> {
    match try_factory(module) {
        Ok(conn) => Some(conn),
        Err(e) => {
            error!(module = %module, "cannot create connection: {}", e);
            None
        }
    }
}

#[cfg(feature = "mysql")]
fn new_mysql() -> Box<dyn Connection> {
    Box::new(crate::database::MySqlConnection::new())
}

#[cfg(feature = "postgres")]
fn new_pq() -> Box<dyn Connection> {
    Box::new(crate::database::PostgresConnection::new())
}

#[cfg(feature = "sqlite")]
fn new_sqlite3() -> Box<dyn Connection> {
    Box::new(crate::database::SqliteConnection::new())
}

#[cfg(feature = "odbc")]
fn new_odbc() -> Box<dyn Connection> {
    Box::new(crate::database::OdbcConnection::new())
}

/// Create a MySQL connection without going through the registry.
#[cfg(feature = "mysql")]
pub fn create_mysql_connection() -> ConnectionRef {
    ConnectionRef::new(new_mysql())
}

/// Create a PostgreSQL connection without going through the registry.
#[cfg(feature = "postgres")]
pub fn create_pq_connection() -> ConnectionRef {
    ConnectionRef::new(new_pq())
}

/// Create a SQLite connection without going through the registry.
#[cfg(feature = "sqlite")]
pub fn create_sqlite3_connection() -> ConnectionRef {
    ConnectionRef::new(new_sqlite3())
}

/// Create an ODBC connection without going through the registry.
#[cfg(feature = "odbc")]
pub fn create_odbc_connection() -> ConnectionRef {
    ConnectionRef::new(new_odbc())
}
