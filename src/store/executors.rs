use std::cmp::Ordering;

use crate::core::{Column, ForeignKey, Row, Schema, StoreError, StoreResult, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{self, SelectItem, Statement};

use super::engine::{Database, ExecutionContext, Executor};
use super::{QueryResult, Table};

/// CREATE TABLE, DROP TABLE, CREATE INDEX
pub struct DdlExecutor;

impl Executor for DdlExecutor {
    fn name(&self) -> &'static str {
        "DDL"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(
            stmt,
            Statement::CreateTable(_) | Statement::DropTable(_) | Statement::CreateIndex(_)
        )
    }

    fn execute(
        &self,
        stmt: &Statement,
        db: &mut Database,
        _ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        match stmt {
            Statement::CreateTable(create) => {
                if create.if_not_exists && db.contains(&create.table_name) {
                    return Ok(QueryResult::empty());
                }

                let columns = create
                    .columns
                    .iter()
                    .map(|def| {
                        let mut column = Column::new(def.name.clone(), def.data_type);
                        column.nullable = def.nullable;
                        column.primary_key = def.primary_key;
                        column.unique = def.unique;
                        column
                    })
                    .collect::<Vec<_>>();

                if columns.iter().filter(|c| c.primary_key).count() > 1 {
                    return Err(StoreError::Execution(format!(
                        "Multiple primary keys defined for '{}'",
                        create.table_name
                    )));
                }

                db.create_table(Table::new(create.table_name.clone(), Schema::new(columns)))?;
                Ok(QueryResult::empty())
            }
            Statement::DropTable(drop) => {
                if drop.if_exists && !db.contains(&drop.table_name) {
                    return Ok(QueryResult::empty());
                }
                db.drop_table(&drop.table_name)?;
                Ok(QueryResult::empty())
            }
            Statement::CreateIndex(index) => {
                let table = db.table_mut(&index.table_name)?;
                let created = table.create_index(&index.index_name, &index.columns)?;
                if !created && !index.if_not_exists {
                    return Err(StoreError::Execution(format!(
                        "Duplicate key name '{}'",
                        index.index_name
                    )));
                }
                Ok(QueryResult::empty())
            }
            _ => unreachable!("DdlExecutor called with non-DDL statement"),
        }
    }
}

/// ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY / DROP FOREIGN KEY
pub struct ConstraintExecutor;

impl Executor for ConstraintExecutor {
    fn name(&self) -> &'static str {
        "CONSTRAINT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(
            stmt,
            Statement::AddForeignKey(_) | Statement::DropForeignKey(_)
        )
    }

    fn execute(
        &self,
        stmt: &Statement,
        db: &mut Database,
        _ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        match stmt {
            Statement::AddForeignKey(add) => {
                let parent = db.table(&add.ref_table)?;
                parent.column_index(&add.ref_column)?;

                let fk = ForeignKey {
                    name: add.constraint_name.clone(),
                    column: add.column.clone(),
                    ref_table: add.ref_table.clone(),
                    ref_column: add.ref_column.clone(),
                };

                let mut child = db.table(&add.table_name)?.clone();
                child.add_foreign_key(fk)?;
                // existing rows must already satisfy the new constraint
                for row in child.rows() {
                    db.check_references(&child, row)?;
                }

                *db.table_mut(&add.table_name)? = child;
                Ok(QueryResult::empty())
            }
            Statement::DropForeignKey(drop) => {
                db.table_mut(&drop.table_name)?
                    .drop_foreign_key(&drop.constraint_name)?;
                Ok(QueryResult::empty())
            }
            _ => unreachable!("ConstraintExecutor called with non-constraint statement"),
        }
    }
}

pub struct InsertExecutor;

impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    fn execute(
        &self,
        stmt: &Statement,
        db: &mut Database,
        ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        let Statement::Insert(insert) = stmt else {
            unreachable!();
        };

        let mut table = db.table(&insert.table_name)?.clone();
        let schema = table.schema().clone();
        let eval = EvaluationContext::new(&insert.table_name, &schema, ctx.params);

        // target position in the row for each VALUES entry
        let targets: Vec<usize> = match &insert.columns {
            Some(columns) => columns
                .iter()
                .map(|name| table.column_index(name))
                .collect::<StoreResult<_>>()?,
            None => (0..schema.column_count()).collect(),
        };

        for values in &insert.values {
            if values.len() != targets.len() {
                return Err(StoreError::Execution(format!(
                    "Column count doesn't match value count: expected {}, got {}",
                    targets.len(),
                    values.len()
                )));
            }

            let mut row: Row = vec![Value::Null; schema.column_count()];
            for (expr, idx) in values.iter().zip(&targets) {
                row[*idx] = eval.evaluate_constant(expr)?;
            }

            db.check_references(&table, &row)?;
            table.insert(row)?;
        }

        let inserted = insert.values.len() as u64;
        *db.table_mut(&insert.table_name)? = table;
        Ok(QueryResult::affected(inserted))
    }
}

pub struct QueryExecutor;

impl Executor for QueryExecutor {
    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Query(_))
    }

    fn execute(
        &self,
        stmt: &Statement,
        db: &mut Database,
        ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        let Statement::Query(query) = stmt else {
            unreachable!();
        };

        let table = db.table(&query.from)?;
        let eval = EvaluationContext::new(&query.from, table.schema(), ctx.params);

        let mut matched = Vec::new();
        for row in table.rows() {
            if eval.matches(query.selection.as_ref(), row)? {
                matched.push(row);
            }
        }

        if !query.order_by.is_empty() {
            matched = sort_rows(matched, &query.order_by, &eval)?;
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        let columns = projection_labels(&query.projection, table.schema());
        let rows = matched
            .into_iter()
            .map(|row| project(&query.projection, row, &eval))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(QueryResult::new(columns, rows))
    }
}

fn sort_rows<'r>(
    rows: Vec<&'r Row>,
    order_by: &[ast::OrderByExpr],
    eval: &EvaluationContext<'_>,
) -> StoreResult<Vec<&'r Row>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let keys = order_by
                .iter()
                .map(|order| eval.evaluate(&order.expr, row))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok((keys, row))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    // first comparison error wins
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        for ((left, right), order) in a.iter().zip(b).zip(order_by) {
            match left.compare(right) {
                Ok(Ordering::Equal) => continue,
                Ok(ord) if order.descending => return ord.reverse(),
                Ok(ord) => return ord,
                Err(e) => {
                    failure.get_or_insert(e);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(keyed.into_iter().map(|(_, row)| row).collect()),
    }
}

fn projection_labels(projection: &[SelectItem], schema: &Schema) -> Vec<String> {
    projection
        .iter()
        .flat_map(|item| match item {
            SelectItem::Wildcard => schema.column_names(),
            SelectItem::Expr { expr, alias } => {
                vec![alias.clone().unwrap_or_else(|| expr.label())]
            }
        })
        .collect()
}

fn project(projection: &[SelectItem], row: &Row, eval: &EvaluationContext<'_>) -> StoreResult<Row> {
    let mut out = Vec::with_capacity(row.len());
    for item in projection {
        match item {
            SelectItem::Wildcard => out.extend(row.iter().cloned()),
            SelectItem::Expr { expr, .. } => out.push(eval.evaluate(expr, row)?),
        }
    }
    Ok(out)
}

pub struct DeleteExecutor;

impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    fn execute(
        &self,
        stmt: &Statement,
        db: &mut Database,
        ctx: &ExecutionContext<'_>,
    ) -> StoreResult<QueryResult> {
        let Statement::Delete(delete) = stmt else {
            unreachable!();
        };

        let mut table = db.table(&delete.table_name)?.clone();
        let schema = table.schema().clone();
        let eval = EvaluationContext::new(&delete.table_name, &schema, ctx.params);

        let deleted = table.delete_where(|row| eval.matches(delete.selection.as_ref(), row))?;
        let count = deleted.len() as u64;

        *db.table_mut(&delete.table_name)? = table;
        db.check_not_referenced(&delete.table_name, &deleted)?;

        Ok(QueryResult::affected(count))
    }
}
