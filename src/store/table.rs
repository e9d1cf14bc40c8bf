use crate::core::{Column, ForeignKey, Row, Schema, StoreError, StoreResult, Value};

/// One table of a [`Database`](super::engine::Database).
///
/// Rows live in a persistent vector so a whole database can be cloned as a
/// snapshot and mutated without touching the published copy.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: im::Vector<Row>,
    indexes: im::OrdMap<String, Vec<String>>,
    foreign_keys: im::Vector<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: im::Vector::new(),
            indexes: im::OrdMap::new(),
            foreign_keys: im::Vector::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter()
    }

    pub fn index_columns(&self, index: &str) -> Option<&[String]> {
        self.indexes.get(index).map(|cols| cols.as_slice())
    }

    pub fn column_index(&self, name: &str) -> StoreResult<usize> {
        self.schema
            .find_column_index(name)
            .ok_or_else(|| StoreError::ColumnNotFound(name.to_string(), self.name.clone()))
    }

    /// Validates types, NOT NULL and key uniqueness, then appends.
    pub fn insert(&mut self, row: Row) -> StoreResult<()> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row)?;
        self.rows.push_back(row);
        Ok(())
    }

    /// Removes every row for which `predicate` holds and returns them.
    pub fn delete_where<F>(&mut self, mut predicate: F) -> StoreResult<Vec<Row>>
    where
        F: FnMut(&Row) -> StoreResult<bool>,
    {
        let mut kept = im::Vector::new();
        let mut deleted = Vec::new();

        for row in self.rows.iter() {
            if predicate(row)? {
                deleted.push(row.clone());
            } else {
                kept.push_back(row.clone());
            }
        }

        self.rows = kept;
        Ok(deleted)
    }

    pub fn create_index(&mut self, index: &str, columns: &[String]) -> StoreResult<bool> {
        if self.indexes.contains_key(index) {
            return Ok(false);
        }
        for column in columns {
            self.column_index(column)?;
        }
        self.indexes.insert(index.to_string(), columns.to_vec());
        Ok(true)
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> StoreResult<()> {
        if self.foreign_keys.iter().any(|existing| existing.name == fk.name) {
            return Err(StoreError::DuplicateKey(format!(
                "Foreign key '{}' already exists on '{}'",
                fk.name, self.name
            )));
        }
        self.column_index(&fk.column)?;
        self.foreign_keys.push_back(fk);
        Ok(())
    }

    pub fn drop_foreign_key(&mut self, name: &str) -> StoreResult<()> {
        let position = self
            .foreign_keys
            .iter()
            .position(|fk| fk.name == name)
            .ok_or_else(|| {
                StoreError::Execution(format!(
                    "Foreign key '{}' does not exist on '{}'",
                    name, self.name
                ))
            })?;
        self.foreign_keys.remove(position);
        Ok(())
    }

    /// True if some row holds `value` in column `idx`.
    pub fn contains_value(&self, idx: usize, value: &Value) -> bool {
        self.rows.iter().any(|row| row.get(idx) == Some(value))
    }

    fn validate_row(&self, row: &Row) -> StoreResult<()> {
        if row.len() != self.schema.column_count() {
            return Err(StoreError::Execution(format!(
                "Table '{}' has {} columns, row has {}",
                self.name,
                self.schema.column_count(),
                row.len()
            )));
        }

        for (column, value) in self.schema.columns().iter().zip(row) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn check_uniqueness(&self, row: &Row) -> StoreResult<()> {
        let keyed = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, col)| col.primary_key || col.unique);

        for (idx, column) in keyed {
            let value = &row[idx];
            if value.is_null() {
                continue;
            }
            if self.contains_value(idx, value) {
                return Err(duplicate(&self.name, column, value));
            }
        }
        Ok(())
    }
}

fn duplicate(table: &str, column: &Column, value: &Value) -> StoreError {
    let key: &str = if column.primary_key { "PRIMARY" } else { &column.name };
    StoreError::DuplicateKey(format!(
        "Duplicate entry '{}' for key '{}.{}'",
        value, table, key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn mapping_table() -> Table {
        Table::new(
            "shard_mapping",
            Schema::new(vec![
                Column::new("table_name", DataType::Text).primary_key(),
                Column::new("column_name", DataType::Text).not_null(),
            ]),
        )
    }

    #[test]
    fn test_primary_key_rejects_duplicates() {
        let mut table = mapping_table();
        table
            .insert(vec![Value::from("db1.t1"), Value::from("userID")])
            .unwrap();

        let err = table
            .insert(vec![Value::from("db1.t1"), Value::from("other")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_not_null_and_type_checks() {
        let mut table = mapping_table();
        assert!(matches!(
            table.insert(vec![Value::from("t"), Value::Null]),
            Err(StoreError::ConstraintViolation(_))
        ));
        assert!(matches!(
            table.insert(vec![Value::from("t"), Value::Integer(3)]),
            Err(StoreError::TypeMismatch(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_delete_where() {
        let mut table = mapping_table();
        for name in ["a", "b", "c"] {
            table.insert(vec![Value::from(name), Value::from("k")]).unwrap();
        }

        let deleted = table
            .delete_where(|row| Ok(row[0] != Value::from("b")))
            .unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(table.rows().cloned().collect::<Vec<_>>(), vec![vec![
            Value::from("b"),
            Value::from("k")
        ]]);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut table = mapping_table();
        table.insert(vec![Value::from("a"), Value::from("k")]).unwrap();
        let snapshot = table.clone();

        table.delete_where(|_| Ok(true)).unwrap();
        assert!(table.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
