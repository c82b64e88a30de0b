use sqlx::Connection as _;
use sqlx::Executor;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection as SqlxSqlite};
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::database::runtime::{self, BlockingSession};
use crate::database::{Connection, LastError, ResultSet, TransactionMode, literal};

const DRIVER_VERSION: &str = "Sqlite3 Driver v0.2";

const SQLITE_OK: u32 = 0;
const SQLITE_ERROR: u32 = 1;
const SQLITE_BUSY: u32 = 5;
const SQLITE_CANTOPEN: u32 = 14;
const SQLITE_MISUSE: u32 = 21;

/// How long a busy database is waited on before a query gives up.
const BUSY_RETRY_LIMIT: u32 = 30;
const BUSY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Primary result code and message for an sqlx failure.
fn sqlite_error(err: &sqlx::Error) -> (u32, String) {
    match err {
        sqlx::Error::Database(db) => {
            let code = db
                .code()
                .and_then(|c| c.parse::<u32>().ok())
                .map(|extended| extended & 0xff)
                .unwrap_or(SQLITE_ERROR);
            (code, db.message().to_string())
        }
        sqlx::Error::Io(e) => (SQLITE_CANTOPEN, e.to_string()),
        other => (SQLITE_ERROR, other.to_string()),
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(_)) && sqlite_error(err).0 == SQLITE_BUSY
}

/// SQLite implementation of [`Connection`].
///
/// `database` is a file path, created when missing, or `:memory:`. The
/// network arguments to `open` are ignored.
pub struct SqliteConnection {
    session: Option<BlockingSession<SqlxSqlite>>,
    error: LastError,
    version: String,
}

impl Default for SqliteConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnection {
    pub fn new() -> Self {
        Self {
            session: None,
            error: LastError::new(SQLITE_OK, "not an error"),
            version: DRIVER_VERSION.to_string(),
        }
    }

    fn not_connected(&mut self) {
        self.error.set(SQLITE_MISUSE, "bad parameter or other API misuse");
    }

    fn succeeded(&mut self) {
        self.error.set(SQLITE_OK, "not an error");
    }

    fn record(&mut self, err: &sqlx::Error) {
        let (code, message) = sqlite_error(err);
        debug!(code, "sqlite error: {}", message);
        self.error.set(code, message);
    }

    fn exec(&mut self, sql: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            self.not_connected();
            return false;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(conn.execute(sql)) {
            Ok(_) => {
                self.succeeded();
                true
            }
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }

    fn connect_options(database: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
        let options = if database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(database)
                .create_if_missing(true)
        };
        // Same pragmas as a plain sqlite3_open. Busy handling is done by
        // retrying whole queries.
        Ok(options
            .foreign_keys(false)
            .busy_timeout(Duration::ZERO)
            .statement_cache_capacity(0))
    }
}

impl Connection for SqliteConnection {
    fn open(
        &mut self,
        database: &str,
        _host: Option<&str>,
        _port: u16,
        _user: Option<&str>,
        _pass: Option<&str>,
    ) -> bool {
        self.close();

        let options = match Self::connect_options(database) {
            Ok(options) => options,
            Err(e) => {
                self.record(&e);
                return false;
            }
        };

        let mut session = match BlockingSession::connect(|| SqlxSqlite::connect_with(&options)) {
            Ok(session) => session,
            Err(crate::database::DatabaseError::Sqlx(e)) => {
                warn!(database, "sqlite open failed: {}", e);
                self.record(&e);
                return false;
            }
            Err(e) => {
                warn!(database, "sqlite open failed: {}", e);
                self.error.set(SQLITE_CANTOPEN, e.to_string());
                return false;
            }
        };

        let (rt, conn) = session.parts();
        if let Ok(Some(lib)) = rt
            .block_on(runtime::fetch_first_column::<Sqlite>(conn, "SELECT sqlite_version()"))
            .map(|v| v.into_iter().next())
        {
            self.version = format!("{} using {}", DRIVER_VERSION, lib);
        }

        self.session = Some(session);
        self.succeeded();
        true
    }

    fn close(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let (rt, conn) = session.into_parts();
        if let Err(e) = rt.block_on(conn.close()) {
            debug!("sqlite close: {}", e);
        }
        self.version = DRIVER_VERSION.to_string();
        true
    }

    fn is_connected(&mut self) -> bool {
        self.session.is_some()
    }

    fn execute(&mut self, sql: &str) -> bool {
        self.exec(sql)
    }

    fn execute_query(&mut self, sql: &str) -> Option<Box<dyn ResultSet>> {
        let mut attempt = 0;
        loop {
            let Some(session) = self.session.as_mut() else {
                self.not_connected();
                return None;
            };
            let (rt, conn) = session.parts();
            match rt.block_on(runtime::fetch_buffered::<Sqlite>(conn, sql)) {
                Ok(rs) => {
                    self.succeeded();
                    return rs.map(|rs| Box::new(rs) as Box<dyn ResultSet>);
                }
                Err(e) if is_busy(&e) && attempt < BUSY_RETRY_LIMIT => {
                    attempt += 1;
                    debug!(attempt, "sqlite database is busy, retrying");
                    thread::sleep(BUSY_RETRY_DELAY);
                }
                Err(e) => {
                    self.record(&e);
                    return None;
                }
            }
        }
    }

    fn escape(&self, text: &str) -> String {
        literal::escape_doubled_quotes(text)
    }

    fn insert_id(&mut self) -> u64 {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let (rt, conn) = session.parts();
        rt.block_on(runtime::fetch_first_column::<Sqlite>(
            conn,
            "SELECT last_insert_rowid()",
        ))
        .ok()
        .and_then(|v| v.into_iter().next())
        .and_then(|id| id.parse::<u64>().ok())
        .unwrap_or(0)
    }

    fn begin_trans(&mut self) -> bool {
        self.exec("BEGIN TRANSACTION")
    }

    fn commit_trans(&mut self) -> bool {
        self.exec("COMMIT TRANSACTION")
    }

    fn rollback_trans(&mut self) -> bool {
        self.exec("ROLLBACK TRANSACTION")
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> bool {
        self.exec(mode.sqlite_pragma())
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

    fn tables(&mut self) -> Vec<String> {
        let Some(session) = self.session.as_mut() else {
            self.not_connected();
            return Vec::new();
        };
        let (rt, conn) = session.parts();
        let sql = "SELECT name FROM sqlite_master WHERE type='table'";
        match rt.block_on(runtime::fetch_first_column::<Sqlite>(conn, sql)) {
            Ok(tables) => tables,
            Err(e) => {
                self.record(&e);
                Vec::new()
            }
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close();
    }
}
