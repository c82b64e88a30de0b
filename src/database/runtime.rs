//! Blocking bridge for the sqlx backed adapters.
//!
//! Each open connection owns a single-threaded tokio runtime and drives its
//! sqlx connection on it with `block_on`, so callers of the [`Connection`]
//! API never see a future.
//!
//! [`Connection`]: crate::database::Connection

use sqlx::{Column, ColumnIndex, Database, Decode, Executor, Row, Statement};
use tokio::runtime::{Builder, Runtime};

use crate::database::DatabaseResult;
use crate::database::result_set::{BufferedResultSet, TextRow};

/// A live sqlx connection together with the runtime that drives it.
pub(crate) struct BlockingSession<C> {
    runtime: Runtime,
    conn: C,
}

impl<C> BlockingSession<C> {
    /// Build a runtime and run `connect` on it.
    pub(crate) fn connect<F, Fut>(connect: F) -> DatabaseResult<Self>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<C, sqlx::Error>>,
    {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let conn = runtime.block_on(connect())?;
        Ok(Self { runtime, conn })
    }

    /// Split borrow used as `let (rt, conn) = session.parts(); rt.block_on(...)`.
    pub(crate) fn parts(&mut self) -> (&Runtime, &mut C) {
        (&self.runtime, &mut self.conn)
    }

    pub(crate) fn into_parts(self) -> (Runtime, C) {
        (self.runtime, self.conn)
    }
}

fn column_text<R>(row: &R, idx: usize) -> Result<Option<String>, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    match row.try_get_unchecked::<Option<String>, _>(idx) {
        Ok(text) => Ok(text),
        // Binary data that is not valid UTF-8.
        Err(_) => Ok(row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())),
    }
}

fn row_texts<R>(row: &R) -> Result<TextRow, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    (0..row.len()).map(|idx| column_text(row, idx)).collect()
}

/// Run `sql` and read every row into a [`BufferedResultSet`].
///
/// Column names come from the first row, or from the prepared statement
/// when there are no rows. `Ok(None)` means the statement ran but has no
/// result columns.
pub(crate) async fn fetch_buffered<DB>(
    conn: &mut DB::Connection,
    sql: &str,
) -> Result<Option<BufferedResultSet>, sqlx::Error>
where
    DB: Database,
    for<'e> &'e mut DB::Connection: Executor<'e, Database = DB>,
    usize: ColumnIndex<DB::Row>,
    for<'r> String: Decode<'r, DB>,
    for<'r> Vec<u8>: Decode<'r, DB>,
{
    let rows = (&mut *conn).fetch_all(sql).await?;

    let columns: Vec<String> = match rows.first() {
        Some(first) => first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        None => match (&mut *conn).prepare(sql).await {
            Ok(stmt) => stmt.columns().iter().map(|c| c.name().to_string()).collect(),
            Err(_) => Vec::new(),
        },
    };
    if columns.is_empty() {
        return Ok(None);
    }

    let texts = rows.iter().map(row_texts).collect::<Result<Vec<_>, _>>()?;
    Ok(Some(BufferedResultSet::new(columns, texts)))
}

/// Run `sql` and return the first column of every row as text.
pub(crate) async fn fetch_first_column<DB>(
    conn: &mut DB::Connection,
    sql: &str,
) -> Result<Vec<String>, sqlx::Error>
where
    DB: Database,
    for<'e> &'e mut DB::Connection: Executor<'e, Database = DB>,
    usize: ColumnIndex<DB::Row>,
    for<'r> String: Decode<'r, DB>,
    for<'r> Vec<u8>: Decode<'r, DB>,
{
    let rows = (&mut *conn).fetch_all(sql).await?;
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.len() > 0 {
            if let Some(text) = column_text(row, 0)? {
                values.push(text);
            }
        }
    }
    Ok(values)
}
