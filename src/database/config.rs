use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{info, warn};

use crate::database::{
    Connection, ConnectionRef, DatabaseError, DatabaseResult, DatabaseType, TransactionMode,
    registry,
};
use crate::error::ConfigError;
use crate::logging;

/// Connection settings for one database.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Type of database to connect to
    pub db_type: DatabaseType,

    /// Registry name of the driver, when it differs from the type's default
    #[serde(default)]
    pub driver: Option<String>,

    /// Database name, SQLite file path, PostgreSQL conninfo or ODBC
    /// connection string
    pub database: String,

    /// Database host (MySQL, PostgreSQL)
    #[serde(default)]
    pub host: Option<String>,

    /// Database port (MySQL, PostgreSQL); zero or unset picks the default
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,

    /// Isolation level applied right after the connection opens
    #[serde(default)]
    pub transaction_mode: Option<TransactionMode>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            driver: None,
            database: ":memory:".to_string(),
            host: None,
            port: None,
            username: None,
            password: None,
            transaction_mode: None,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl DatabaseConfig {
    pub fn from_toml_str(text: &str) -> DatabaseResult<Self> {
        toml::from_str(text).map_err(|e| DatabaseError::Configuration(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DatabaseError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Read `DBABSTRACT_*` environment variables.
    ///
    /// `DBABSTRACT_DB_TYPE` and `DBABSTRACT_DATABASE` are required;
    /// `DBABSTRACT_DRIVER`, `DBABSTRACT_HOST`, `DBABSTRACT_PORT`,
    /// `DBABSTRACT_USER`, `DBABSTRACT_PASSWORD` and
    /// `DBABSTRACT_TRANSACTION_MODE` are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_type = optional_var("DBABSTRACT_DB_TYPE")
            .ok_or_else(|| ConfigError::MissingEnvVar("DBABSTRACT_DB_TYPE".to_string()))?
            .parse::<DatabaseType>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let database = optional_var("DBABSTRACT_DATABASE")
            .ok_or_else(|| ConfigError::MissingEnvVar("DBABSTRACT_DATABASE".to_string()))?;

        let port = optional_var("DBABSTRACT_PORT")
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| ConfigError::Invalid(format!("DBABSTRACT_PORT '{}' is not a port", p)))
            })
            .transpose()?;

        let transaction_mode = optional_var("DBABSTRACT_TRANSACTION_MODE")
            .map(|m| {
                m.parse::<TransactionMode>()
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            db_type,
            driver: optional_var("DBABSTRACT_DRIVER"),
            database,
            host: optional_var("DBABSTRACT_HOST"),
            port,
            username: optional_var("DBABSTRACT_USER"),
            password: optional_var("DBABSTRACT_PASSWORD").map(SecretString::new),
            transaction_mode,
        })
    }

    /// Registry name of the driver this configuration selects.
    pub fn module_name(&self) -> &str {
        self.driver
            .as_deref()
            .unwrap_or_else(|| self.db_type.module_name())
    }
}

fn open_configured(
    conn: &mut dyn Connection,
    config: &DatabaseConfig,
    password: Option<&str>,
) -> DatabaseResult<()> {
    let opened = conn.open(
        &config.database,
        config.host.as_deref(),
        config.port.unwrap_or(0),
        config.username.as_deref(),
        password,
    );
    if !opened {
        let err = DatabaseError::Connection(format!(
            "{} ({}): {}",
            config.db_type,
            conn.errorno(),
            logging::redact(conn.errormsg())
        ));
        warn!("{}", err);
        return Err(err);
    }

    if let Some(mode) = config.transaction_mode {
        if !conn.set_transaction_mode(mode) {
            return Err(DatabaseError::Transaction(format!(
                "cannot set isolation level {:?}: {}",
                mode,
                conn.errormsg()
            )));
        }
    }
    info!(db_type = %config.db_type, version = conn.version(), "database connection opened");
    Ok(())
}

/// Create and open a connection as described by `config`.
///
/// The handle is released again when opening or applying the configured
/// isolation level fails.
pub fn create_database_connection(config: &DatabaseConfig) -> DatabaseResult<ConnectionRef> {
    let handle = registry::try_factory(config.module_name())?;
    let password = config.password.as_ref().map(|p| p.expose_secret().as_str());
    if let Some(secret) = &config.password {
        logging::register_secret_for_redaction(secret);
    }

    let outcome = {
        let mut conn = handle.lock();
        open_configured(&mut **conn, config, password)
    };
    if let Err(err) = outcome {
        handle.release();
        return Err(err);
    }

    Ok(handle)
}
