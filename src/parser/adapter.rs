use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::core::{DataType, StoreError, StoreResult};
use crate::parser::ast::*;
use crate::plugins::ExpressionConverter;

lazy_static! {
    // MySQL foreign-key maintenance forms. sqlparser's ALTER TABLE support for
    // these differs per dialect, so they are recognised up front.
    static ref ADD_FOREIGN_KEY: Regex = Regex::new(
        r"(?i)^\s*ALTER\s+TABLE\s+([A-Za-z_][\w.]*)\s+ADD\s+CONSTRAINT\s+([A-Za-z_]\w*)\s+FOREIGN\s+KEY\s*\(\s*([A-Za-z_]\w*)\s*\)\s*REFERENCES\s+([A-Za-z_][\w.]*)\s*\(\s*([A-Za-z_]\w*)\s*\)\s*;?\s*$"
    )
    .expect("foreign key pattern compiles");
    static ref DROP_FOREIGN_KEY: Regex = Regex::new(
        r"(?i)^\s*ALTER\s+TABLE\s+([A-Za-z_][\w.]*)\s+DROP\s+FOREIGN\s+KEY\s+([A-Za-z_]\w*)\s*;?\s*$"
    )
    .expect("drop foreign key pattern compiles");
}

pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
    expr_converter: ExpressionConverter,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter: ExpressionConverter::new(),
        }
    }

    /// Parse exactly one statement. Multi-statement text is rejected.
    pub fn parse(&self, sql: &str) -> StoreResult<Statement> {
        if let Some(caps) = ADD_FOREIGN_KEY.captures(sql) {
            return Ok(Statement::AddForeignKey(AddForeignKeyStmt {
                table_name: caps[1].to_string(),
                constraint_name: caps[2].to_string(),
                column: caps[3].to_string(),
                ref_table: caps[4].to_string(),
                ref_column: caps[5].to_string(),
            }));
        }
        if let Some(caps) = DROP_FOREIGN_KEY.captures(sql) {
            return Ok(Statement::DropForeignKey(DropForeignKeyStmt {
                table_name: caps[1].to_string(),
                constraint_name: caps[2].to_string(),
            }));
        }

        let mut external_stmts = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        if external_stmts.len() != 1 {
            return Err(StoreError::Parse(format!(
                "Expected exactly one statement, got {}",
                external_stmts.len()
            )));
        }

        self.convert_statement(external_stmts.remove(0))
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> StoreResult<Statement> {
        match stmt {
            sql_ast::Statement::CreateTable(create) => {
                Ok(Statement::CreateTable(self.convert_create_table(create)?))
            }
            sql_ast::Statement::CreateIndex(ci) => {
                Ok(Statement::CreateIndex(self.convert_create_index(&ci)?))
            }
            sql_ast::Statement::Drop {
                object_type,
                names,
                if_exists,
                ..
            } => {
                if let sql_ast::ObjectType::Table = object_type {
                    Ok(Statement::DropTable(self.convert_drop_table(names, if_exists)?))
                } else {
                    Err(StoreError::Unsupported(format!(
                        "Only DROP TABLE supported, got: {}",
                        object_type
                    )))
                }
            }
            sql_ast::Statement::Insert(insert) => Ok(Statement::Insert(self.convert_insert(insert)?)),
            sql_ast::Statement::Query(query) => Ok(Statement::Query(self.convert_query(*query)?)),
            sql_ast::Statement::Delete(delete) => Ok(Statement::Delete(self.convert_delete(delete)?)),
            other => Err(StoreError::Unsupported(format!(
                "Statement type not supported: {}",
                other
            ))),
        }
    }

    fn convert_create_table(&self, create: sql_ast::CreateTable) -> StoreResult<CreateTableStmt> {
        if !create.constraints.is_empty() {
            return Err(StoreError::Unsupported(
                "Table-level constraints are not supported; declare keys on the column and indexes with CREATE INDEX".into(),
            ));
        }

        let table_name = object_name(&create.name);
        let columns = create
            .columns
            .into_iter()
            .map(|col| self.convert_column_def(col))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(CreateTableStmt {
            table_name,
            columns,
            if_not_exists: create.if_not_exists,
        })
    }

    fn convert_column_def(&self, col: sql_ast::ColumnDef) -> StoreResult<ColumnDef> {
        let data_type = self.convert_data_type(&col.data_type)?;
        let mut def = ColumnDef {
            name: col.name.value,
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
        };

        for opt in &col.options {
            match &opt.option {
                sql_ast::ColumnOption::NotNull => def.nullable = false,
                sql_ast::ColumnOption::Null => def.nullable = true,
                other => {
                    let text = other.to_string().to_ascii_uppercase();
                    if text.starts_with("PRIMARY KEY") {
                        def.primary_key = true;
                        def.nullable = false;
                    } else if text.starts_with("UNIQUE") {
                        def.unique = true;
                    } else {
                        return Err(StoreError::Unsupported(format!(
                            "Unsupported column option on '{}': {}",
                            def.name, other
                        )));
                    }
                }
            }
        }

        Ok(def)
    }

    fn convert_data_type(&self, dt: &sql_ast::DataType) -> StoreResult<DataType> {
        match dt {
            sql_ast::DataType::Int(_)
            | sql_ast::DataType::Integer(_)
            | sql_ast::DataType::BigInt(_) => Ok(DataType::Integer),

            sql_ast::DataType::Text
            | sql_ast::DataType::Varchar(_)
            | sql_ast::DataType::Char(_)
            | sql_ast::DataType::String(_) => Ok(DataType::Text),

            sql_ast::DataType::Boolean | sql_ast::DataType::Bool => Ok(DataType::Boolean),

            _ => Err(StoreError::TypeMismatch(format!(
                "Unsupported data type: {}",
                dt
            ))),
        }
    }

    fn convert_drop_table(
        &self,
        names: Vec<sql_ast::ObjectName>,
        if_exists: bool,
    ) -> StoreResult<DropTableStmt> {
        if names.len() != 1 {
            return Err(StoreError::Unsupported(
                "Only single table DROP supported".into(),
            ));
        }

        Ok(DropTableStmt {
            table_name: object_name(&names[0]),
            if_exists,
        })
    }

    fn convert_create_index(&self, ci: &sql_ast::CreateIndex) -> StoreResult<CreateIndexStmt> {
        let index_name = match &ci.name {
            Some(n) => object_name(n),
            None => return Err(StoreError::Parse("Index name is required".into())),
        };

        let columns = ci
            .columns
            .iter()
            .map(|col| match &col.column.expr {
                sql_ast::Expr::Identifier(ident) => Ok(ident.value.clone()),
                _ => Err(StoreError::Unsupported(
                    "Index column must be an identifier".into(),
                )),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(StoreError::Parse("Index needs at least one column".into()));
        }

        Ok(CreateIndexStmt {
            index_name,
            table_name: object_name(&ci.table_name),
            columns,
            if_not_exists: ci.if_not_exists,
        })
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> StoreResult<InsertStmt> {
        let table_name = insert.table.to_string();

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let Some(source) = insert.source else {
            return Err(StoreError::Unsupported("INSERT requires a VALUES clause".into()));
        };

        let sql_ast::SetExpr::Values(vals) = *source.body else {
            return Err(StoreError::Unsupported("Only VALUES clause supported".into()));
        };

        let values = vals
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|expr| self.expr_converter.convert(expr))
                    .collect::<StoreResult<Vec<_>>>()
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(InsertStmt {
            table_name,
            columns,
            values,
        })
    }

    fn convert_query(&self, query: sql_ast::Query) -> StoreResult<QueryStmt> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(StoreError::Unsupported("Only SELECT queries supported".into()));
        };
        let select = *select;

        if select.from.len() != 1 {
            return Err(StoreError::Unsupported(
                "SELECT must read exactly one table".into(),
            ));
        }
        let Some(table) = select.from.into_iter().next() else {
            return Err(StoreError::Unsupported("SELECT requires FROM".into()));
        };
        if !table.joins.is_empty() {
            return Err(StoreError::Unsupported("Joins are not supported".into()));
        }
        let from = table_factor_name(&table.relation)?;

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<StoreResult<Vec<_>>>()?;

        let selection = select
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        let order_by = self.convert_order_by(query.order_by)?;
        let limit = self.convert_limit_clause(&query.limit_clause)?;

        Ok(QueryStmt {
            projection,
            from,
            selection,
            order_by,
            limit,
        })
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> StoreResult<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: Some(alias.value),
            }),
            _ => Err(StoreError::Unsupported("Unsupported select item".into())),
        }
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> StoreResult<Vec<OrderByExpr>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    Ok(OrderByExpr {
                        expr: self.expr_converter.convert(order.expr)?,
                        descending: order.options.asc.map(|asc| !asc).unwrap_or(false),
                    })
                })
                .collect(),
            sql_ast::OrderByKind::All(_) => {
                Err(StoreError::Unsupported("ORDER BY ALL not supported".into()))
            }
        }
    }

    fn convert_limit_clause(
        &self,
        limit_clause: &Option<sql_ast::LimitClause>,
    ) -> StoreResult<Option<usize>> {
        let Some(clause) = limit_clause else {
            return Ok(None);
        };

        match clause {
            sql_ast::LimitClause::LimitOffset { limit, .. } => match limit {
                Some(sql_ast::Expr::Value(value_with_span)) => {
                    self.extract_limit_number(&value_with_span.value)
                }
                Some(_) => Err(StoreError::Unsupported("Only numeric LIMIT supported".into())),
                None => Ok(None),
            },
            sql_ast::LimitClause::OffsetCommaLimit { limit, .. } => match limit {
                sql_ast::Expr::Value(value_with_span) => {
                    self.extract_limit_number(&value_with_span.value)
                }
                _ => Err(StoreError::Unsupported("Only numeric LIMIT supported".into())),
            },
        }
    }

    fn extract_limit_number(&self, value: &sql_ast::Value) -> StoreResult<Option<usize>> {
        match value {
            sql_ast::Value::Number(n, _) => n
                .parse::<usize>()
                .map(Some)
                .map_err(|_| StoreError::Parse(format!("Invalid LIMIT value: {}", n))),
            _ => Err(StoreError::Unsupported(format!(
                "Only numeric LIMIT supported, got: {}",
                value
            ))),
        }
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> StoreResult<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let Some(table) = tables.first() else {
            return Err(StoreError::Parse("DELETE requires a table".into()));
        };
        let table_name = table_factor_name(&table.relation)?;

        let selection = delete
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(DeleteStmt {
            table_name,
            selection,
        })
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Qualified names keep their qualifier: `db1.t1` stays `db1.t1`.
fn object_name(name: &sql_ast::ObjectName) -> String {
    name.to_string()
}

fn table_factor_name(factor: &sql_ast::TableFactor) -> StoreResult<String> {
    match factor {
        sql_ast::TableFactor::Table { name, .. } => Ok(object_name(name)),
        _ => Err(StoreError::Unsupported(
            "Complex table references not supported".into(),
        )),
    }
}
