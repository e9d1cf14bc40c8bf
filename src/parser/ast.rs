use crate::core::{DataType, Value};

/// Root statement type understood by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    DropTable(DropTableStmt),
    CreateIndex(CreateIndexStmt),
    Insert(InsertStmt),
    Query(QueryStmt),
    Delete(DeleteStmt),
    AddForeignKey(AddForeignKeyStmt),
    DropForeignKey(DropForeignKeyStmt),
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

/// DROP TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    pub table_name: String,
    pub if_exists: bool,
}

/// CREATE INDEX statement. Indexes are recorded, not materialised.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub if_not_exists: bool,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table_name: String,
    pub columns: Option<Vec<String>>, // None = all columns
    pub values: Vec<Vec<Expr>>,
}

/// SELECT over a single table
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStmt {
    pub projection: Vec<SelectItem>,
    pub from: String,
    pub selection: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub descending: bool,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table_name: String,
    pub selection: Option<Expr>,
}

/// `ALTER TABLE t ADD CONSTRAINT name FOREIGN KEY (column) REFERENCES ref_table (ref_column)`
#[derive(Debug, Clone, PartialEq)]
pub struct AddForeignKeyStmt {
    pub table_name: String,
    pub constraint_name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// `ALTER TABLE t DROP FOREIGN KEY name`
#[derive(Debug, Clone, PartialEq)]
pub struct DropForeignKeyStmt {
    pub table_name: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    /// Zero-based index into the bound parameters (`$1` is `Param(0)`)
    Param(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl Expr {
    /// Label used as the result column name of a projected expression
    pub fn label(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Literal(value) => value.to_string(),
            Expr::Param(idx) => format!("${}", idx + 1),
            _ => "?column?".to_string(),
        }
    }
}
