//! SQL literal rendering: per-backend string escaping and timestamp literals,
//! plus the [`Qstr`] and [`UnixTime`] helpers for building statement text
//! with `format!` or `write!`.

use chrono::DateTime;
use std::fmt;

use crate::database::Connection;

/// Quote `text` for SQL dialects that only need embedded quotes doubled
/// (SQLite, ODBC).
pub fn escape_doubled_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Quote `text` the way the MySQL client library escapes strings:
/// backslash escapes for quotes, backslashes and control characters.
pub fn escape_mysql(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2 + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{1a}' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Quote `text` as a PostgreSQL literal. Quotes and backslashes are
/// doubled; when a backslash is present the literal is written in the
/// ` E'...'` escape-string form so it means the same under any setting of
/// `standard_conforming_strings`.
pub fn escape_postgres(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2 + 4);
    if text.contains('\\') {
        out.push_str(" E");
    }
    out.push('\'');
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// `'YYYY-MM-DD HH:MM:SS'` for `time`, rendered in UTC.
///
/// Out-of-range values render as the epoch.
pub fn unixtime_to_sql(time: i64) -> String {
    let utc = DateTime::from_timestamp(time, 0).unwrap_or_default();
    format!("'{}'", utc.format("%Y-%m-%d %H:%M:%S"))
}

/// Displays a string escaped by the connection it is bound to.
pub struct Qstr<'a> {
    conn: &'a dyn Connection,
    text: &'a str,
}

/// Bind `text` to `conn` for escaping while formatting.
///
/// ```ignore
/// let sql = format!("INSERT INTO notes (body) VALUES ({})", qstr(&*conn, body));
/// ```
pub fn qstr<'a>(conn: &'a dyn Connection, text: &'a str) -> Qstr<'a> {
    Qstr { conn, text }
}

impl fmt::Display for Qstr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.conn.escape(self.text))
    }
}

/// Displays an epoch time as the bound connection's timestamp literal.
pub struct UnixTime<'a> {
    conn: &'a dyn Connection,
    time: i64,
}

pub fn unixtime(conn: &dyn Connection, time: i64) -> UnixTime<'_> {
    UnixTime { conn, time }
}

impl fmt::Display for UnixTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.conn.unixtime_to_sql(self.time))
    }
}
