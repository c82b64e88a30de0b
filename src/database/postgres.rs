use sqlx::Connection as _;
use sqlx::Executor;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode, Postgres};
use tracing::{debug, warn};

use crate::database::runtime::{self, BlockingSession};
use crate::database::{Connection, LastError, ResultSet, TransactionMode, TruthRule, literal};
use crate::safe_log;

const DRIVER_VERSION: &str = "PostgreSQL Driver v0.1";

/// `PQstatus` values reported through `errorno`.
const STATUS_OK: u32 = 0;
const STATUS_BAD: u32 = 1;

/// Split a libpq keyword/value connection string into pairs.
///
/// Values may be single-quoted; inside quotes a backslash escapes the next
/// character. Spaces around `=` are allowed.
pub fn parse_conninfo(text: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(format!(
                "missing \"=\" after \"{}\" in connection info string",
                key
            ));
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'\'') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '\'' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err("unterminated quoted string in connection info string".to_string());
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                if c == '\\' {
                    chars.next();
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                    continue;
                }
                value.push(c);
                chars.next();
            }
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn looks_like_conninfo(database: &str) -> bool {
    database.contains('=')
}

/// Build connect options from the `open` arguments.
///
/// `database` may be a `postgres://` URL, a keyword/value connection string
/// or a bare database name. Explicit `host`, `port`, `user` and `pass`
/// arguments override whatever the string specified.
fn connect_options(
    database: &str,
    host: Option<&str>,
    port: u16,
    user: Option<&str>,
    pass: Option<&str>,
) -> Result<PgConnectOptions, String> {
    let mut options = if database.starts_with("postgres://") || database.starts_with("postgresql://")
    {
        database
            .parse::<PgConnectOptions>()
            .map_err(|e| e.to_string())?
    } else if looks_like_conninfo(database) {
        let mut options = PgConnectOptions::new();
        for (key, value) in parse_conninfo(database)? {
            options = match key.as_str() {
                "host" | "hostaddr" => options.host(&value),
                "port" => options.port(
                    value
                        .parse()
                        .map_err(|_| format!("invalid port number: \"{}\"", value))?,
                ),
                "dbname" => options.database(&value),
                "user" => options.username(&value),
                "password" => options.password(&value),
                "sslmode" => options.ssl_mode(
                    value
                        .parse::<PgSslMode>()
                        .map_err(|_| format!("invalid sslmode value: \"{}\"", value))?,
                ),
                "application_name" => options.application_name(&value),
                "connect_timeout" | "client_encoding" => options,
                other => return Err(format!("invalid connection option \"{}\"", other)),
            };
        }
        options
    } else {
        PgConnectOptions::new().database(database)
    };

    if let Some(host) = host {
        options = options.host(host);
    }
    if port != 0 {
        options = options.port(port);
    }
    if let Some(user) = user {
        options = options.username(user);
    }
    if let Some(pass) = pass {
        options = options.password(pass);
    }
    Ok(options.statement_cache_capacity(0))
}

fn error_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => format!("ERROR:  {}", db.message()),
        other => other.to_string(),
    }
}

/// PostgreSQL implementation of [`Connection`].
pub struct PostgresConnection {
    session: Option<BlockingSession<PgConnection>>,
    error: LastError,
}

impl Default for PostgresConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresConnection {
    pub fn new() -> Self {
        Self {
            session: None,
            error: LastError::new(STATUS_BAD, ""),
        }
    }

    fn record(&mut self, err: &sqlx::Error) {
        let status = match err {
            sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => STATUS_BAD,
            _ => STATUS_OK,
        };
        self.error.set(status, error_message(err));
    }

    fn command(&mut self, sql: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            self.error.set(STATUS_BAD, "connection pointer is NULL");
            return false;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(conn.execute(sql)) {
            Ok(_) => {
                self.error.set(STATUS_OK, "");
                true
            }
            Err(e) => {
                self.record(&e);
                warn!("error issuing command: {}", self.error.message());
                false
            }
        }
    }
}

impl Connection for PostgresConnection {
    fn open(
        &mut self,
        database: &str,
        host: Option<&str>,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> bool {
        self.close();

        let options = match connect_options(database, host, port, user, pass) {
            Ok(options) => options,
            Err(message) => {
                self.error.set(STATUS_BAD, message);
                return false;
            }
        };

        let mut session = match BlockingSession::connect(|| PgConnection::connect_with(&options)) {
            Ok(session) => session,
            Err(e) => {
                safe_log!(warn, "postgres connect to '{}' failed: {}", database, e);
                let message = match e {
                    crate::database::DatabaseError::Sqlx(ref err) => error_message(err),
                    other => other.to_string(),
                };
                self.error.set(STATUS_BAD, message);
                return false;
            }
        };

        self.session = Some(session);
        self.error.set(STATUS_OK, "");
        true
    }

    fn close(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let (rt, conn) = session.into_parts();
        if let Err(e) = rt.block_on(conn.close()) {
            debug!("postgres close: {}", e);
        }
        self.error.set(STATUS_BAD, "");
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
        self.command(sql)
    }

    fn execute_query(&mut self, sql: &str) -> Option<Box<dyn ResultSet>> {
        let Some(session) = self.session.as_mut() else {
            self.error.set(STATUS_BAD, "connection pointer is NULL");
            return None;
        };
        let (rt, conn) = session.parts();
        match rt.block_on(runtime::fetch_buffered::<Postgres>(conn, sql)) {
            Ok(rs) => {
                self.error.set(STATUS_OK, "");
                rs.map(|rs| Box::new(rs.with_truth_rule(TruthRule::OneOnly)) as Box<dyn ResultSet>)
            }
            Err(e) => {
                self.record(&e);
                None
            }
        }
    }

    fn escape(&self, text: &str) -> String {
        literal::escape_postgres(text)
    }

    fn insert_id(&mut self) -> u64 {
        0
    }

    fn begin_trans(&mut self) -> bool {
        self.command("BEGIN")
    }

    fn commit_trans(&mut self) -> bool {
        self.command("END")
    }

    fn rollback_trans(&mut self) -> bool {
        self.command("ROLLBACK")
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> bool {
        self.command(mode.isolation_statement())
    }

    fn errorno(&self) -> u32 {
        self.error.code()
    }

    fn errormsg(&self) -> &str {
        self.error.message()
    }

    fn version(&self) -> &str {
        DRIVER_VERSION
    }

    fn tables(&mut self) -> Vec<String> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let (rt, conn) = session.parts();
        let sql = "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = current_schema()";
        match rt.block_on(runtime::fetch_first_column::<Postgres>(conn, sql)) {
            Ok(tables) => tables,
            Err(e) => {
                self.record(&e);
                Vec::new()
            }
        }
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        self.close();
    }
}
