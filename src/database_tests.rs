// SQLite integration tests against real database files.
// MySQL and PostgreSQL tests need a live server and run with
// `--features integration_tests`.

use crate::database::{
    ConnectionRef, DatabaseConfig, DatabaseType, TransactionMode,
    create_database_connection, create_sqlite3_connection, factory, qstr, unixtime,
};
use crate::Error;
use tempfile::TempDir;

const CREATE_TESTING: &str = "CREATE TABLE testing (id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
     text VARCHAR(128), num INTEGER, fl FLOAT, \
     createdOn TIMESTAMP DEFAULT CURRENT_TIMESTAMP, updatedOn TIMESTAMP)";

/// An open SQLite connection on a fresh database file.
struct SqliteFixture {
    handle: ConnectionRef,
    _dir: TempDir,
}

impl SqliteFixture {
    fn open() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let handle = create_sqlite3_connection();
        assert!(handle
            .lock()
            .open(path.to_str().unwrap(), None, 0, None, None));
        Self { handle, _dir: dir }
    }

    /// Open with the `testing` table created and a transaction begun.
    fn in_transaction() -> Self {
        let fixture = Self::open();
        {
            let mut conn = fixture.handle.lock();
            assert!(conn.execute(CREATE_TESTING));
            assert!(conn.begin_trans());
        }
        fixture
    }
}

impl Drop for SqliteFixture {
    fn drop(&mut self) {
        let mut conn = self.handle.lock();
        conn.commit_trans();
        conn.close();
    }
}

mod sqlite_default_tests {
    use super::*;

    #[test]
    fn can_connect_to_database() {
        let fixture = SqliteFixture::open();
        assert!(fixture.handle.lock().is_connected());
    }

    #[test]
    fn can_execute_simple_query() {
        let fixture = SqliteFixture::open();
        let mut conn = fixture.handle.lock();
        assert!(conn.execute(CREATE_TESTING));
        assert!(conn.execute("DROP TABLE testing"));
    }

    #[test]
    fn cannot_execute_invalid_statement() {
        let fixture = SqliteFixture::open();
        let mut conn = fixture.handle.lock();
        assert!(!conn.execute("BYE"));
        assert_eq!(conn.errorno(), 1);
        assert!(conn.errormsg().contains("syntax error"));

        // The next successful call resets the error.
        assert!(conn.execute("SELECT 1"));
        assert_eq!(conn.errorno(), 0);
    }

    #[test]
    fn escape_characters() {
        let fixture = SqliteFixture::open();
        assert_eq!(fixture.handle.lock().escape("be'nden"), "'be''nden'");
    }

    #[test]
    fn unixtime_to_sql_is_utc() {
        let fixture = SqliteFixture::open();
        let literal = fixture.handle.lock().unixtime_to_sql(1_414_965_631);
        assert_eq!(literal, "'2014-11-02 22:00:31'");
        assert_eq!(literal.len(), 21);
    }

    #[test]
    fn error_number_and_message() {
        let fixture = SqliteFixture::open();
        let conn = fixture.handle.lock();
        assert_eq!(conn.errorno(), 0);
        assert_eq!(conn.errormsg(), "not an error");
    }

    #[test]
    fn version_string() {
        let fixture = SqliteFixture::open();
        let conn = fixture.handle.lock();
        assert!(conn.version().starts_with("Sqlite3 Driver v0.2 using 3."));
    }

    #[test]
    fn in_memory_database() {
        let handle = create_sqlite3_connection();
        let mut conn = handle.lock();
        assert!(conn.open(":memory:", None, 0, None, None));
        assert!(conn.execute("CREATE TABLE notes (body TEXT)"));
        assert_eq!(conn.tables(), vec!["notes".to_string()]);
        assert!(conn.close());
        assert!(!conn.is_connected());
        assert!(!conn.close());
    }

    #[test]
    fn empty_result_columns_follow_schema_changes() {
        let fixture = SqliteFixture::open();
        let mut conn = fixture.handle.lock();
        assert!(conn.execute("CREATE TABLE t (a TEXT)"));
        let rs = conn.execute_query("SELECT * FROM t").unwrap();
        assert_eq!(rs.column_count(), 1);
        rs.close();

        assert!(conn.execute("ALTER TABLE t ADD COLUMN b TEXT"));
        let mut rs = conn.execute_query("SELECT * FROM t").unwrap();
        assert!(!rs.next());
        assert_eq!(rs.column_count(), 2);
        assert_eq!(rs.find_column("b"), 1);
        rs.close();
    }

    #[test]
    fn foreign_keys_are_not_enforced() {
        let fixture = SqliteFixture::open();
        let mut conn = fixture.handle.lock();
        assert!(conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)"));
        assert!(conn.execute("CREATE TABLE child (pid INTEGER REFERENCES parent(id))"));
        assert!(conn.execute("INSERT INTO child VALUES (42)"));
        assert_eq!(conn.errorno(), 0);
    }

    #[test]
    fn repeated_open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.db");
        let handle = create_sqlite3_connection();
        for round in 1..=25 {
            let owner = handle.duplicate();
            {
                let mut conn = owner.lock();
                assert!(conn.open(path.to_str().unwrap(), None, 0, None, None));
                assert!(conn.execute("CREATE TABLE IF NOT EXISTS cycles (n INTEGER)"));
                assert!(conn.execute(&format!("INSERT INTO cycles VALUES ({})", round)));
                let mut rs = conn.execute_query("SELECT COUNT(*) FROM cycles").unwrap();
                assert!(rs.next());
                assert_eq!(rs.get_integer(0), round);
                assert!(rs.close());
                assert!(conn.close());
                assert!(!conn.is_connected());
            }
            assert!(!owner.release());
            assert_eq!(handle.ref_count(), 1);
        }
        assert!(handle.release());
    }

    #[test]
    fn unopenable_path_fails() {
        let handle = create_sqlite3_connection();
        let mut conn = handle.lock();
        assert!(!conn.open("/nonexistent/path/that/does/not/exist.db", None, 0, None, None));
        assert!(!conn.is_connected());
        assert_ne!(conn.errorno(), 0);
    }
}

mod sqlite_transaction_tests {
    use super::*;

    #[test]
    fn single_insert() {
        let fixture = SqliteFixture::in_transaction();
        assert!(fixture
            .handle
            .lock()
            .execute("INSERT INTO testing (text,fl) VALUES ('benden',42)"));
    }

    #[test]
    fn single_select() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        assert!(conn.execute("INSERT INTO testing (text,fl) VALUES ('benden',42)"));
        assert!(conn.commit_trans());

        let mut rs = conn.execute_query("SELECT * FROM testing;").unwrap();
        assert!(rs.next());
        assert_eq!(rs.find_column("text"), 1);
        assert_eq!(rs.get_string(1), Some("benden"));
        assert_eq!(rs.find_column("fl"), 3);
        assert_eq!(rs.find_column("r"), 6);
        assert_eq!(rs.get_integer(3), 42);
        assert_eq!(rs.get_float(3), 42.0);
        assert_eq!(rs.get_double(3), 42.0);
        assert_eq!(rs.get_long(3), 42);
        assert!(!rs.get_bool(3));
        assert_eq!(rs.get_short(3), 42);
        assert_ne!(rs.get_unix_time(4), 0);
        assert_eq!(rs.get_string(5), None);
        assert_eq!(rs.get_unix_time(5), 0);
        assert!(!rs.next());
        assert_eq!(rs.record_count(), 1);
        assert!(rs.close());
    }

    #[test]
    fn query_string() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        for mode in TransactionMode::ALL {
            assert!(conn.set_transaction_mode(mode));
        }

        let sql = format!(
            "INSERT INTO testing (text,fl) VALUES ({},{});",
            qstr(&**conn, "benden"),
            42.0f32
        );
        assert!(conn.execute(&sql));
        assert_eq!(conn.insert_id(), 1);
        assert!(conn.commit_trans());
    }

    #[test]
    fn rollback_transaction() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        assert!(conn.execute("INSERT INTO testing (text) VALUES ('benden');"));
        assert!(conn.rollback_trans());

        let mut rs = conn.execute_query("SELECT COUNT(*) FROM testing").unwrap();
        assert!(rs.next());
        assert_eq!(rs.get_integer(0), 0);
        rs.close();
    }

    #[test]
    fn query_string_types() {
        let fixture = SqliteFixture::in_transaction();
        let conn = fixture.handle.lock();
        let sql = format!(
            "INSERT INTO test (text,fl,updatedOn) VALUES ({},{},{});",
            qstr(&**conn, "benden"),
            42i64,
            unixtime(&**conn, 1_414_965_631)
        );
        assert_eq!(sql.len(), 80);
    }

    #[test]
    fn timestamp_literal_reads_back() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        let sql = format!(
            "INSERT INTO testing (text,updatedOn) VALUES ('t',{})",
            unixtime(&**conn, 1_414_965_631)
        );
        assert!(conn.execute(&sql));

        let mut rs = conn.execute_query("SELECT updatedOn FROM testing").unwrap();
        assert!(rs.next());
        assert_eq!(rs.get_string(0), Some("2014-11-02 22:00:31"));
        assert_eq!(
            rs.get_unix_time(0),
            crate::database::convert::to_unix_time(Some("20141102220031"))
        );
        rs.close();
    }

    #[test]
    fn empty_table_returns_empty_result_set() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        let mut rs = conn.execute_query("SELECT * FROM testing").unwrap();
        assert!(!rs.next());
        assert_eq!(rs.find_column("fl"), 3);
        assert_eq!(rs.column_count(), 6);
        assert_eq!(rs.record_count(), 0);
        rs.close();
    }

    #[test]
    fn statement_without_rows_has_no_result_set() {
        let fixture = SqliteFixture::in_transaction();
        let mut conn = fixture.handle.lock();
        assert!(conn
            .execute_query("UPDATE testing SET num = 1 WHERE id = 99")
            .is_none());
        assert_eq!(conn.errorno(), 0);

        assert!(conn.execute_query("SELECT nope FROM testing").is_none());
        assert_eq!(conn.errorno(), 1);
    }

    #[test]
    fn tables_lists_created_table() {
        let fixture = SqliteFixture::in_transaction();
        let tables = fixture.handle.lock().tables();
        assert!(tables.contains(&"testing".to_string()));
    }
}

mod factory_tests {
    use super::*;

    #[test]
    fn factory_creates_sqlite_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory.db");
        let handle = factory("libdba_sqlite3.so").unwrap();
        let second = handle.duplicate();
        {
            let mut conn = second.lock();
            assert!(conn.open(path.to_str().unwrap(), None, 0, None, None));
            assert!(conn.execute("CREATE TABLE t (id INTEGER)"));
        }
        assert!(!second.release());
        assert!(handle.lock().is_connected());
        assert!(handle.release());
        assert!(path.exists());
    }

    #[test]
    fn config_opens_connection() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.db");
        let config = DatabaseConfig::from_toml_str(&format!(
            "db_type = \"sqlite\"\ndatabase = \"{}\"\ntransaction_mode = \"SERIALIZABLE\"\n",
            path.display()
        ))?;

        let handle = create_database_connection(&config)?;
        {
            let mut conn = handle.lock();
            assert!(conn.is_connected());
            assert!(conn.execute("CREATE TABLE t (id INTEGER)"));
        }
        assert!(handle.release());
        Ok(())
    }

    #[test]
    fn config_errors_convert_to_crate_error() {
        let config = DatabaseConfig {
            db_type: DatabaseType::Sqlite,
            database: "/nonexistent/path/that/does/not/exist.db".to_string(),
            ..Default::default()
        };

        let result: Result<(), Error> = create_database_connection(&config)
            .map(|handle| {
                handle.release();
            })
            .map_err(Error::from);
        match result {
            Err(Error::Database(_)) => {}
            other => panic!("expected Error::Database, got {:?}", other),
        }
    }
}

// Integration tests (disabled by default, require actual database connections)
#[cfg(all(feature = "mysql", feature = "integration_tests"))]
mod mysql_tests {
    use super::*;
    use crate::database::create_mysql_connection;

    fn var(name: &str, default: &str) -> String {
        std::env::var(name).unwrap_or_else(|_| default.to_string())
    }

    fn connect() -> ConnectionRef {
        let handle = create_mysql_connection();
        let database = var("DBABSTRACT_TEST_MYSQL_DATABASE", "test");
        let host = var("DBABSTRACT_TEST_MYSQL_HOST", "127.0.0.1");
        let user = var("DBABSTRACT_TEST_MYSQL_USER", "root");
        let pass = var("DBABSTRACT_TEST_MYSQL_PASSWORD", "");
        assert!(handle.lock().open(
            &database,
            Some(host.as_str()),
            0,
            Some(user.as_str()),
            Some(pass.as_str())
        ));
        handle
    }

    #[test]
    fn bad_database_fails() {
        let handle = create_mysql_connection();
        let mut conn = handle.lock();
        assert!(!conn.open("ffdsdfsf", Some("127.0.0.1"), 3306, Some("root"), Some("")));
        assert_ne!(conn.errorno(), 0);
    }

    #[test]
    fn select_insert_and_transactions() {
        let handle = connect();
        let mut conn = handle.lock();
        assert!(conn.is_connected());
        assert!(conn.version().starts_with("MySQL Driver v0.2 using MySQL server v"));
        assert!(!conn.execute("BYE"));
        assert_eq!(conn.escape("be'nden"), "'be\\'nden'");

        assert!(conn.execute(
            "CREATE TEMPORARY TABLE testing (id INTEGER NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             text VARCHAR(128), fl FLOAT)"
        ));
        for mode in TransactionMode::ALL {
            assert!(conn.set_transaction_mode(mode));
        }
        assert!(conn.begin_trans());
        assert!(conn.execute("INSERT INTO testing (text,fl) VALUES ('benden',42)"));
        assert_eq!(conn.insert_id(), 1);
        assert!(conn.commit_trans());

        let mut rs = conn.execute_query("SELECT * FROM testing").unwrap();
        assert!(rs.next());
        assert_eq!(rs.get_string(1), Some("benden"));
        assert_eq!(rs.get_integer(2), 42);
        rs.close();
        assert_eq!(conn.insert_id(), 0);
    }
}

#[cfg(all(feature = "postgres", feature = "integration_tests"))]
mod postgres_tests {
    use super::*;
    use crate::database::create_pq_connection;

    fn connect() -> ConnectionRef {
        let conninfo = std::env::var("DBABSTRACT_TEST_PG_CONNINFO")
            .unwrap_or_else(|_| "host = 127.0.0.1 dbname = postgres".to_string());
        let handle = create_pq_connection();
        assert!(handle.lock().open(&conninfo, None, 0, None, None));
        handle
    }

    #[test]
    fn select_and_transactions() {
        let handle = connect();
        let mut conn = handle.lock();
        assert!(conn.is_connected());
        assert_eq!(conn.errorno(), 0);
        assert_eq!(conn.errormsg(), "");
        assert_eq!(conn.version(), "PostgreSQL Driver v0.1");

        assert!(!conn.execute("BYE"));
        assert!(conn.errormsg().starts_with("ERROR:  "));

        assert!(conn.execute(
            "CREATE TEMPORARY TABLE testing (id SERIAL, text VARCHAR(128), fl FLOAT, \
             createdOn TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        ));
        for mode in TransactionMode::ALL {
            assert!(conn.set_transaction_mode(mode));
        }
        assert!(conn.begin_trans());
        assert!(conn.execute("INSERT INTO testing (text,fl) VALUES ('benden',42)"));
        assert_eq!(conn.insert_id(), 0);
        assert!(conn.commit_trans());

        let mut rs = conn.execute_query("SELECT * FROM testing").unwrap();
        assert!(rs.next());
        assert_eq!(rs.find_column("text"), 1);
        assert_eq!(rs.get_integer(2), 42);
        assert!(!rs.get_bool(2));
        assert_ne!(rs.get_unix_time(3), 0);
        rs.close();
    }

    #[test]
    fn empty_result_columns_follow_schema_changes() {
        let handle = connect();
        let mut conn = handle.lock();
        assert!(conn.execute("CREATE TEMPORARY TABLE shifting (a TEXT)"));
        let rs = conn.execute_query("SELECT * FROM shifting").unwrap();
        assert_eq!(rs.column_count(), 1);
        rs.close();

        assert!(conn.execute("ALTER TABLE shifting ADD COLUMN b TEXT"));
        let rs = conn.execute_query("SELECT * FROM shifting").unwrap();
        assert_eq!(rs.column_count(), 2);
        assert_eq!(rs.find_column("b"), 1);
        rs.close();
    }
}
