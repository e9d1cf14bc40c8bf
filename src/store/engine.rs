use crate::core::{ForeignKey, Row, StoreError, StoreResult, Value};
use crate::parser::ast;

use super::executors::{
    ConstraintExecutor, DdlExecutor, DeleteExecutor, InsertExecutor, QueryExecutor,
};
use super::{QueryResult, Table};

/// Every table of one store. Cloning is cheap and yields an isolated snapshot.
#[derive(Debug, Clone, Default)]
pub struct Database {
    tables: im::HashMap<String, Table>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_table(&mut self, table: Table) -> StoreResult<()> {
        if self.contains(table.name()) {
            return Err(StoreError::TableExists(table.name().to_string()));
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> StoreResult<()> {
        self.table(name)?;

        if let Some((child, fk)) = self.referencing(name).find(|(child, _)| *child != name) {
            return Err(StoreError::ConstraintViolation(format!(
                "Cannot drop table '{}' referenced by foreign key '{}' on '{}'",
                name, fk.name, child
            )));
        }

        self.tables.remove(name);
        Ok(())
    }

    /// Foreign keys of other tables (and of `name` itself) that point at `name`.
    fn referencing<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (&'a str, &'a ForeignKey)> {
        self.tables.values().flat_map(move |table| {
            table
                .foreign_keys()
                .filter(move |fk| fk.ref_table == name)
                .map(move |fk| (table.name(), fk))
        })
    }

    /// Every foreign key of `table` must find its value in the parent table.
    pub fn check_references(&self, table: &Table, row: &Row) -> StoreResult<()> {
        for fk in table.foreign_keys() {
            let value = &row[table.column_index(&fk.column)?];
            if value.is_null() {
                continue;
            }

            let parent = self.table(&fk.ref_table)?;
            let parent_idx = parent.column_index(&fk.ref_column)?;
            if !parent.contains_value(parent_idx, value) {
                return Err(fk_violation(table.name(), fk, value));
            }
        }
        Ok(())
    }

    /// After deleting `deleted` from `name`, no child row may be left dangling.
    pub fn check_not_referenced(&self, name: &str, deleted: &[Row]) -> StoreResult<()> {
        if deleted.is_empty() {
            return Ok(());
        }
        let parent = self.table(name)?;

        for (child_name, fk) in self.referencing(name) {
            let child = self.table(child_name)?;
            let child_idx = child.column_index(&fk.column)?;
            let parent_idx = parent.column_index(&fk.ref_column)?;

            for row in deleted {
                let value = &row[parent_idx];
                if value.is_null() || parent.contains_value(parent_idx, value) {
                    continue;
                }
                if child.contains_value(child_idx, value) {
                    return Err(StoreError::ConstraintViolation(format!(
                        "Cannot delete or update a parent row: foreign key '{}' on '{}' references '{}'",
                        fk.name, child_name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

fn fk_violation(table: &str, fk: &ForeignKey, value: &Value) -> StoreError {
    StoreError::ConstraintViolation(format!(
        "Cannot add or update a child row: foreign key '{}' ({}.{} = '{}') has no match in {}({})",
        fk.name, table, fk.column, value, fk.ref_table, fk.ref_column
    ))
}

/// Positional parameters bound to the statement being run.
pub struct ExecutionContext<'a> {
    pub params: &'a [Value],
}

pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &ast::Statement) -> bool;

    fn execute(
        &self,
        stmt: &ast::Statement,
        db: &mut Database,
        ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult>;
}

pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        tracing::trace!(executor = executor.name(), "registered executor");
        self.executors.push(executor);
    }

    pub fn with_default_executors() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(DdlExecutor));
        pipeline.register(Box::new(ConstraintExecutor));
        pipeline.register(Box::new(InsertExecutor));
        pipeline.register(Box::new(QueryExecutor));
        pipeline.register(Box::new(DeleteExecutor));
        pipeline
    }

    pub fn execute(
        &self,
        stmt: &ast::Statement,
        db: &mut Database,
        ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        for executor in &self.executors {
            if executor.can_handle(stmt) {
                return executor.execute(stmt, db, ctx);
            }
        }

        Err(StoreError::Unsupported(
            "No executor found for statement".into(),
        ))
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::with_default_executors()
    }
}
