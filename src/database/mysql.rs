use sqlx::Connection as _;
use sqlx::Executor;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection as SqlxMySql, MySqlDatabaseError};
use tracing::{debug, warn};

use crate::database::runtime::{self, BlockingSession};
use crate::database::{Connection, LastError, ResultSet, TransactionMode, literal};

const DRIVER_VERSION: &str = "MySQL Driver v0.2";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;

/// CR_UNKNOWN_ERROR
const CLIENT_UNKNOWN_ERROR: u32 = 2000;
/// CR_CONN_HOST_ERROR
const CLIENT_CANNOT_CONNECT: u32 = 2003;
/// CR_SERVER_GONE_ERROR
const CLIENT_SERVER_GONE: u32 = 2006;
/// CR_SERVER_LOST
const CLIENT_SERVER_LOST: u32 = 2013;

/// Client error number and message for an sqlx failure.
fn client_error(err: &sqlx::Error, connecting: bool) -> (u32, String) {
    match err {
        sqlx::Error::Database(db) => match db.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql) => (u32::from(mysql.number()), mysql.message().to_string()),
            None => (CLIENT_UNKNOWN_ERROR, db.message().to_string()),
        },
        sqlx::Error::Io(e) if connecting => (
            CLIENT_CANNOT_CONNECT,
            format!("Can't connect to MySQL server ({})", e),
        ),
        sqlx::Error::Io(e) => (
            CLIENT_SERVER_LOST,
            format!("Lost connection to MySQL server during query ({})", e),
        ),
        other => (CLIENT_UNKNOWN_ERROR, other.to_string()),
    }
}

/// MySQL implementation of [`Connection`].
pub struct MySqlConnection {
    session: Option<BlockingSession<SqlxMySql>>,
    error: LastError,
    insert_id: u64,
    version: String,
}

impl Default for MySqlConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlConnection {
    pub fn new() -> Self {
        Self {
            session: None,
            error: LastError::default(),
            insert_id: 0,
            version: DRIVER_VERSION.to_string(),
        }
    }

    fn not_connected(&mut self) {
        self.error.set(CLIENT_SERVER_GONE, "MySQL server has gone away");
    }

    fn record(&mut self, err: &sqlx::Error) {
        let (code, message) = client_error(err, false);
        debug!(code, "mysql error: {}", message);
        self.error.set(code, message);
    }

    fn query(&mut self, sql: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            self.not_connected();
            return false;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(conn.execute(sql)) {
            Ok(result) => {
                self.insert_id = result.last_insert_id();
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

impl Connection for MySqlConnection {
    fn open(
        &mut self,
        database: &str,
        host: Option<&str>,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> bool {
        self.close();

        let mut options = MySqlConnectOptions::new()
            .host(host.unwrap_or(DEFAULT_HOST))
            .port(if port == 0 { DEFAULT_PORT } else { port })
            .database(database)
            .timezone(None::<String>)
            .pipes_as_concat(false)
            .statement_cache_capacity(0);
        if let Some(user) = user {
            options = options.username(user);
        }
        if let Some(pass) = pass {
            options = options.password(pass);
        }

        let mut session = match BlockingSession::connect(|| SqlxMySql::connect_with(&options)) {
            Ok(session) => session,
            Err(crate::database::DatabaseError::Sqlx(e)) => {
                let (code, message) = client_error(&e, true);
                warn!(code, database, "mysql connect failed: {}", message);
                self.error.set(code, message);
                return false;
            }
            Err(e) => {
                warn!(database, "mysql connect failed: {}", e);
                self.error.set(CLIENT_UNKNOWN_ERROR, e.to_string());
                return false;
            }
        };

        let (rt, conn) = session.parts();
        if let Ok(Some(server)) =
            rt.block_on(runtime::fetch_first_column::<MySql>(conn, "SELECT VERSION()"))
                .map(|v| v.into_iter().next())
        {
            self.version = format!("{} using MySQL server v{}", DRIVER_VERSION, server);
        }

        self.session = Some(session);
        self.error.clear();
        self.insert_id = 0;
        true
    }

    fn close(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let (rt, conn) = session.into_parts();
        if let Err(e) = rt.block_on(conn.close()) {
            debug!("mysql close: {}", e);
        }
        self.version = DRIVER_VERSION.to_string();
        true
    }

    fn is_connected(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(conn.ping()) {
            Ok(()) => true,
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }

    fn execute(&mut self, sql: &str) -> bool {
        self.query(sql)
    }

    fn execute_query(&mut self, sql: &str) -> Option<Box<dyn ResultSet>> {
        // Buffered reads carry no insert id.
        self.insert_id = 0;
        let Some(session) = self.session.as_mut() else {
            self.not_connected();
            return None;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(runtime::fetch_buffered::<MySql>(conn, sql)) {
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
        literal::escape_mysql(text)
    }

    fn insert_id(&mut self) -> u64 {
        self.insert_id
    }

    fn begin_trans(&mut self) -> bool {
        self.query("SET AUTOCOMMIT = 0") && self.query("BEGIN")
    }

    fn commit_trans(&mut self) -> bool {
        self.query("COMMIT")
    }

    fn rollback_trans(&mut self) -> bool {
        self.query("ROLLBACK")
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> bool {
        self.query(mode.isolation_statement())
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
        match rt.block_on(runtime::fetch_first_column::<MySql>(conn, "SHOW TABLES")) {
            Ok(tables) => tables,
            Err(e) => {
                self.record(&e);
                Vec::new()
            }
        }
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        self.close();
    }
}
