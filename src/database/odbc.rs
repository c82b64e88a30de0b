//! ODBC adapter built on `odbc-api`.
//!
//! `database` is passed to the driver manager as a connection string
//! (`DSN=name` or `Driver={...};Server=...`). A user and password given to
//! `open` are appended as `UID` and `PWD`.

use odbc_api::{ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::database::result_set::TextRow;
use crate::database::{
    BufferedResultSet, Connection, DatabaseResult, LastError, ResultSet, TransactionMode, literal,
};
use crate::logging;
use crate::safe_log;

const DRIVER_VERSION: &str = "ODBC Driver v0.1";

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

/// Process-wide ODBC environment, allocated on first use.
fn environment() -> Result<&'static Environment, odbc_api::Error> {
    ENVIRONMENT.get_or_try_init(Environment::new)
}

/// Native error code and `SQLSTATE: text` message of an ODBC failure.
fn diagnostic(err: &odbc_api::Error) -> (u32, String) {
    match err {
        odbc_api::Error::Diagnostics { record, .. } => (
            record.native_error as u32,
            format!(
                "{}: {}",
                record.state.as_str(),
                String::from_utf8_lossy(&record.message).trim_end_matches('\0')
            ),
        ),
        other => (0, other.to_string()),
    }
}

fn connection_string(database: &str, user: Option<&str>, pass: Option<&str>) -> String {
    let mut conn_str = database.trim_end_matches(';').to_string();
    if let Some(user) = user {
        conn_str.push_str(&format!(";UID={}", user));
    }
    if let Some(pass) = pass {
        conn_str.push_str(&format!(";PWD={}", pass));
    }
    conn_str
}

/// Run `sql` on `conn` and read every row as text. `Ok(None)` when the
/// statement produced no result set.
fn query_rows(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
) -> Result<Option<BufferedResultSet>, odbc_api::Error> {
    let mut statement = conn.preallocate()?;
    let Some(mut cursor) = statement.execute(sql, ())? else {
        return Ok(None);
    };

    let count = u16::try_from(cursor.num_result_cols()?).unwrap_or(0);
    if count == 0 {
        return Ok(None);
    }
    let mut columns = Vec::with_capacity(usize::from(count));
    for col in 1..=count {
        columns.push(cursor.col_name(col)?);
    }

    let mut rows: Vec<TextRow> = Vec::new();
    let mut buf = Vec::new();
    while let Some(mut row) = cursor.next_row()? {
        let mut values = Vec::with_capacity(usize::from(count));
        for col in 1..=count {
            buf.clear();
            let value = if row.get_text(col, &mut buf)? {
                Some(String::from_utf8_lossy(&buf).into_owned())
            } else {
                None
            };
            values.push(value);
        }
        rows.push(values);
    }
    Ok(Some(BufferedResultSet::new(columns, rows)))
}

fn execute_statement(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
) -> Result<(), odbc_api::Error> {
    let mut statement = conn.preallocate()?;
    statement.execute(sql, ())?;
    Ok(())
}

/// ODBC implementation of [`Connection`].
pub struct OdbcConnection {
    conn: Option<odbc_api::Connection<'static>>,
    error: LastError,
    version: String,
}

impl Default for OdbcConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OdbcConnection {
    pub fn new() -> Self {
        Self {
            conn: None,
            error: LastError::default(),
            version: DRIVER_VERSION.to_string(),
        }
    }

    fn connect(conn_str: &str) -> DatabaseResult<odbc_api::Connection<'static>> {
        let env = environment()?;
        Ok(env.connect_with_connection_string(conn_str, ConnectionOptions::default())?)
    }

    fn not_connected(&mut self) {
        self.error.set(0, "connection not open");
    }

    fn record(&mut self, err: &odbc_api::Error) {
        let (code, message) = diagnostic(err);
        debug!(code, "odbc error: {}", message);
        self.error.set(code, message);
    }

    fn run(&mut self, sql: &str) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            self.not_connected();
            return false;
        };
        match execute_statement(conn, sql) {
            Ok(()) => {
                self.error.clear();
                true
            }
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }
}

impl Connection for OdbcConnection {
    fn open(
        &mut self,
        database: &str,
        _host: Option<&str>,
        _port: u16,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> bool {
        self.close();

        if let Some(pass) = pass {
            logging::register_for_redaction(pass);
        }
        let conn_str = connection_string(database, user, pass);
        match Self::connect(&conn_str) {
            Ok(conn) => {
                if let Ok(dbms) = conn.database_management_system_name() {
                    self.version = format!("{} using {}", DRIVER_VERSION, dbms);
                }
                self.conn = Some(conn);
                self.error.clear();
                true
            }
            Err(crate::database::DatabaseError::Odbc(e)) => {
                safe_log!(warn, "odbc connect with '{}' failed: {}", conn_str, e);
                self.record(&e);
                false
            }
            Err(e) => {
                safe_log!(warn, "odbc connect with '{}' failed: {}", conn_str, e);
                self.error.set(0, e.to_string());
                false
            }
        }
    }

    fn close(&mut self) -> bool {
        let Some(conn) = self.conn.take() else {
            return false;
        };
        // Dropping the handle rolls back any open transaction and disconnects.
        drop(conn);
        self.version = DRIVER_VERSION.to_string();
        true
    }

    fn is_connected(&mut self) -> bool {
        match self.conn.as_ref().map(|conn| conn.is_dead()) {
            Some(Ok(dead)) => !dead,
            Some(Err(e)) => {
                self.record(&e);
                false
            }
            None => false,
        }
    }

    fn execute(&mut self, sql: &str) -> bool {
        self.run(sql)
    }

    fn execute_query(&mut self, sql: &str) -> Option<Box<dyn ResultSet>> {
        let Some(conn) = self.conn.as_ref() else {
            self.not_connected();
            return None;
        };
        match query_rows(conn, sql) {
            Ok(rs) => {
                self.error.clear();
                rs.map(|rs| Box::new(rs) as Box<dyn ResultSet>)
            }
            Err(e) => {
                self.record(&e);
                None
            }
        }
    }

    fn escape(&self, text: &str) -> String {
        literal::escape_doubled_quotes(text)
    }

    fn insert_id(&mut self) -> u64 {
        0
    }

    fn begin_trans(&mut self) -> bool {
        self.run("BEGIN")
    }

    fn commit_trans(&mut self) -> bool {
        self.run("COMMIT")
    }

    fn rollback_trans(&mut self) -> bool {
        self.run("ROLLBACK")
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> bool {
        self.run(mode.isolation_statement())
    }

    fn errorno(&self) -> u32 {
        self.error.code()
    }

    fn errormsg(&self) -> &str {
        self.error.message()
    }

    fn version(&self) -> &str {
        &self.version
    }
}

impl Drop for OdbcConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_appended() {
        assert_eq!(
            connection_string("DSN=test;", Some("app"), Some("pw")),
            "DSN=test;UID=app;PWD=pw"
        );
        assert_eq!(connection_string("DSN=test", None, None), "DSN=test");
    }

    #[test]
    fn closed_connection_rejects_statements() {
        let mut conn = OdbcConnection::new();
        assert!(!conn.is_connected());
        assert!(!conn.execute("SELECT 1"));
        assert_eq!(conn.errormsg(), "connection not open");
        assert!(conn.execute_query("SELECT 1").is_none());
        assert!(!conn.begin_trans());
        assert!(!conn.close());
        assert_eq!(conn.escape("be'nden"), "'be''nden'");
        assert_eq!(conn.version(), "ODBC Driver v0.1");
    }
}
