//! CLI tool for inspecting drivers and running SQL through the database facade

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use dbabstract::{
    Connection, ConnectionRef, DatabaseConfig, DatabaseType, ResultSet, build,
    create_database_connection, init_logging, print_json, print_pretty_json, registered_drivers,
    try_factory,
};

/// Entry point for the database-tool CLI
#[derive(Parser)]
#[command(name = "database-tool")]
#[command(about = "CLI for running SQL against MySQL, PostgreSQL, SQLite and ODBC databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered driver modules
    Drivers,
    /// Print the version string of a driver
    Version {
        /// Registry name of the driver (mysql, pq, sqlite3, odbc)
        #[arg(short, long, conflicts_with = "db_type")]
        driver: Option<String>,
        /// Database type whose default driver is used
        #[arg(short = 't', long, value_enum)]
        db_type: Option<DatabaseTypeArg>,
    },
    /// Execute a statement that returns no rows
    Exec {
        /// Path to the database configuration file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// SQL statement to run
        sql: String,
    },
    /// Run a query and print each row as a JSON object
    Query {
        /// Path to the database configuration file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// SQL query to run
        sql: String,
    },
    /// List the tables visible to the connection
    Tables {
        /// Path to the database configuration file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Print build information
    BuildInfo,
}

/// Supported database types for CLI
#[derive(ValueEnum, Clone)]
enum DatabaseTypeArg {
    Sqlite,
    Mysql,
    Postgres,
    Odbc,
}

impl From<DatabaseTypeArg> for DatabaseType {
    fn from(arg: DatabaseTypeArg) -> Self {
        match arg {
            DatabaseTypeArg::Sqlite => DatabaseType::Sqlite,
            DatabaseTypeArg::Mysql => DatabaseType::MySql,
            DatabaseTypeArg::Postgres => DatabaseType::Postgres,
            DatabaseTypeArg::Odbc => DatabaseType::Odbc,
        }
    }
}

fn open(config: &Path) -> Result<ConnectionRef, Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_file(config)?;
    Ok(create_database_connection(&db_config)?)
}

/// Error left behind by the last call, if it failed.
///
/// PostgreSQL reports statement errors with status 0, so the message is
/// checked too. SQLite spells success out as "not an error".
fn last_failure(conn: &dyn Connection) -> Option<String> {
    let message = conn.errormsg();
    if conn.errorno() != 0 || !(message.is_empty() || message == "not an error") {
        Some(format!("error {}: {}", conn.errorno(), message))
    } else {
        None
    }
}

/// The current row as `{ column: text }`, NULL columns as JSON null.
fn row_object(rs: &dyn ResultSet) -> Value {
    let mut row = Map::new();
    for idx in 0..rs.column_count() {
        let name = rs.column_name(idx).unwrap_or_default().to_string();
        let value = rs
            .get_string(idx)
            .map_or(Value::Null, |text| Value::String(text.to_string()));
        row.insert(name, value);
    }
    Value::Object(row)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Drivers => {
            for name in registered_drivers() {
                println!("{}", name);
            }
        }
        Commands::Version { driver, db_type } => {
            let module = match (driver, db_type) {
                (Some(driver), _) => driver,
                (None, Some(db_type)) => DatabaseType::from(db_type).module_name().to_string(),
                (None, None) => return Err("either --driver or --db-type is required".into()),
            };
            let handle = try_factory(&module)?;
            println!("{}", handle.lock().version());
            handle.release();
        }
        Commands::Exec { config, sql } => {
            let handle = open(&config)?;
            let result = {
                let mut conn = handle.lock();
                if conn.execute(&sql) {
                    println!("OK (insert id {})", conn.insert_id());
                    Ok(())
                } else {
                    Err(last_failure(&**conn).unwrap_or_else(|| "statement failed".to_string()))
                }
            };
            handle.release();
            result?;
        }
        Commands::Query { config, sql } => {
            let handle = open(&config)?;
            let result = {
                let mut conn = handle.lock();
                match conn.execute_query(&sql) {
                    Some(mut rs) => {
                        while rs.next() {
                            print_json(&row_object(rs.as_ref()))?;
                        }
                        rs.close();
                        Ok(())
                    }
                    None => last_failure(&**conn).map_or(Ok(()), Err),
                }
            };
            handle.release();
            result?;
        }
        Commands::Tables { config } => {
            let handle = open(&config)?;
            let tables = handle.lock().tables();
            handle.release();
            print_pretty_json(&tables)?;
        }
        Commands::BuildInfo => {
            print_pretty_json(&json!({
                "version": env!("CARGO_PKG_VERSION"),
                "git_hash": build::GIT_HASH,
                "build_time_utc": build::BUILD_TIME_UTC,
                "rustc_version": build::RUSTC_VERSION,
                "drivers": registered_drivers(),
            }))?;
        }
    }

    Ok(())
}
