use std::vec::IntoIter;

use crate::database::{ResultSet, convert};

/// How a backend spells boolean true in text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruthRule {
    /// `1` or `t` as the first character.
    #[default]
    OneOrT,
    /// Only `1` as the first character.
    OneOnly,
}

impl TruthRule {
    pub fn is_true(&self, value: Option<&str>) -> bool {
        match self {
            TruthRule::OneOrT => convert::to_bool(value),
            TruthRule::OneOnly => value.is_some_and(|v| v.starts_with('1')),
        }
    }
}

/// Row of column texts, `None` for SQL NULL.
pub type TextRow = Vec<Option<String>>;

/// A result set whose rows were fully fetched when the query ran.
///
/// Every adapter reads its backend's rows into one of these, so the cursor
/// semantics and getters behave identically whichever driver produced them.
#[derive(Debug)]
pub struct BufferedResultSet {
    columns: Vec<String>,
    rows: IntoIter<TextRow>,
    current: Option<TextRow>,
    total: u64,
    exhausted: bool,
    truth: TruthRule,
}

impl BufferedResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<TextRow>) -> Self {
        Self {
            columns,
            total: rows.len() as u64,
            rows: rows.into_iter(),
            current: None,
            exhausted: false,
            truth: TruthRule::default(),
        }
    }

    pub fn with_truth_rule(mut self, truth: TruthRule) -> Self {
        self.truth = truth;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl ResultSet for BufferedResultSet {
    fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        self.current = self.rows.next();
        if self.current.is_none() {
            self.exhausted = true;
        }
        !self.exhausted
    }

    fn close(mut self: Box<Self>) -> bool {
        while self.next() {}
        true
    }

    fn find_column(&self, name: &str) -> usize {
        self.columns
            .iter()
            .position(|c| c == name)
            .unwrap_or(self.columns.len())
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(String::as_str)
    }

    fn record_count(&self) -> u64 {
        self.total
    }

    fn get_string(&self, idx: usize) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|row| row.get(idx))
            .and_then(|value| value.as_deref())
    }

    fn get_bool(&self, idx: usize) -> bool {
        self.truth.is_true(self.get_string(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn sample() -> BufferedResultSet {
        BufferedResultSet::new(
            vec!["id".into(), "text".into(), "fl".into(), "flag".into()],
            vec![
                vec![text("1"), text("benden"), text("42"), text("t")],
                vec![text("2"), None, text("4.5"), text("0")],
            ],
        )
    }

    #[test]
    fn accessors_are_empty_before_first_row() {
        let rs = sample();
        assert_eq!(rs.get_string(0), None);
        assert_eq!(rs.get_integer(0), 0);
    }

    #[test]
    fn walks_rows_then_stays_exhausted() {
        let mut rs = sample();
        assert!(rs.next());
        assert_eq!(rs.get_string(1), Some("benden"));
        assert_eq!(rs.get_integer(2), 42);
        assert_eq!(rs.get_float(2), 42.0);
        assert_eq!(rs.get_short(2), 42);
        assert!(rs.get_bool(3));
        assert!(!rs.get_bool(2));

        assert!(rs.next());
        assert_eq!(rs.get_string(1), None);
        assert_eq!(rs.get_integer(1), 0);
        assert_eq!(rs.get_double(2), 4.5);
        assert_eq!(rs.get_long(2), 4);

        assert!(!rs.next());
        assert!(!rs.next());
        assert_eq!(rs.get_string(0), None);
        assert_eq!(rs.record_count(), 2);
    }

    #[test]
    fn unknown_column_maps_to_field_count() {
        let rs = sample();
        assert_eq!(rs.find_column("text"), 1);
        assert_eq!(rs.find_column("Text"), 4);
        assert_eq!(rs.find_column("r"), rs.column_count());
    }

    #[test]
    fn out_of_range_index_reads_as_null() {
        let mut rs = sample();
        assert!(rs.next());
        assert_eq!(rs.get_string(17), None);
        assert_eq!(rs.get_unix_time(17), 0);
    }

    #[test]
    fn one_only_truth_rule_rejects_t() {
        let mut rs = sample().with_truth_rule(TruthRule::OneOnly);
        assert!(rs.next());
        assert!(!rs.get_bool(3));
        assert!(rs.get_bool(0));
    }

    #[test]
    fn close_drains_remaining_rows() {
        let mut rs = Box::new(sample());
        assert!(rs.next());
        assert!(rs.close());
    }

    #[test]
    fn empty_result_has_columns_but_no_rows() {
        let mut rs = BufferedResultSet::new(vec!["id".into()], Vec::new());
        assert!(!rs.next());
        assert_eq!(rs.record_count(), 0);
        assert_eq!(rs.find_column("id"), 0);
    }
}
