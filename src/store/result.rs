use crate::core::{Row, Value};

/// Rows and/or affected count returned for one executed statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Drop the row set, keeping only the affected count.
    pub(crate) fn without_rows(self) -> Self {
        Self::affected(self.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_column_name() {
        let result = QueryResult::new(
            vec!["name".into(), "group_id".into()],
            vec![vec![Value::from("s1"), Value::from("G1")]],
        );
        assert_eq!(result.get(0, "GROUP_ID"), Some(&Value::from("G1")));
        assert_eq!(result.get(1, "name"), None);
        assert_eq!(result.get(0, "missing"), None);
        assert_eq!(result.rows_affected, 1);
        assert!(result.without_rows().rows.is_empty());
    }
}
