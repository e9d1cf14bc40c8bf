pub mod between;
pub mod comparison;
pub mod nested;
pub mod unary;

use crate::core::{StoreError, StoreResult, Value};
use crate::parser::ast::{BinaryOp, Expr};
use sqlparser::ast as sql_ast;

/// Converts one family of SQL expressions into our AST
pub trait ExpressionPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool;

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> StoreResult<Expr>;
}

pub struct ExpressionPluginRegistry {
    plugins: Vec<Box<dyn ExpressionPlugin>>,
}

impl ExpressionPluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ExpressionPlugin>) {
        tracing::trace!(plugin = plugin.name(), "registered expression plugin");
        self.plugins.push(plugin);
    }

    pub fn with_default_plugins() -> Self {
        let mut registry = Self::new();

        // Nested first so parentheses unwrap before anything else looks
        registry.register(Box::new(nested::NestedPlugin));
        registry.register(Box::new(between::BetweenPlugin));
        registry.register(Box::new(comparison::ComparisonPlugin));
        registry.register(Box::new(unary::UnaryPlugin));

        registry
    }

    pub fn find_plugin(&self, expr: &sql_ast::Expr) -> Option<&dyn ExpressionPlugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.can_handle(expr))
            .map(|boxed| &**boxed)
    }
}

impl Default for ExpressionPluginRegistry {
    fn default() -> Self {
        Self::with_default_plugins()
    }
}

pub struct ExpressionConverter {
    registry: ExpressionPluginRegistry,
}

impl ExpressionConverter {
    pub fn new() -> Self {
        Self {
            registry: ExpressionPluginRegistry::with_default_plugins(),
        }
    }

    pub fn convert(&self, expr: sql_ast::Expr) -> StoreResult<Expr> {
        match &expr {
            sql_ast::Expr::Identifier(ident) => {
                return Ok(Expr::Column(ident.value.clone()));
            }
            sql_ast::Expr::CompoundIdentifier(idents) => {
                // `t.col` resolves against the single FROM table
                let column = idents
                    .last()
                    .map(|i| i.value.clone())
                    .ok_or_else(|| StoreError::Parse("Empty identifier".into()))?;
                return Ok(Expr::Column(column));
            }
            sql_ast::Expr::Value(val) => {
                if let sql_ast::Value::Placeholder(placeholder) = &val.value {
                    return Ok(Expr::Param(parse_placeholder(placeholder)?));
                }
                return Ok(Expr::Literal(self.convert_value(&val.value)?));
            }
            _ => {}
        }

        if let Some(plugin) = self.registry.find_plugin(&expr) {
            return plugin.convert(expr, self);
        }

        Err(StoreError::Unsupported(format!(
            "No plugin found for expression: {}",
            expr
        )))
    }

    pub fn convert_value(&self, val: &sql_ast::Value) -> StoreResult<Value> {
        match val {
            sql_ast::Value::Number(n, _) => n.parse::<i64>().map(Value::Integer).map_err(|_| {
                StoreError::TypeMismatch(format!("Only integer numbers are supported: {}", n))
            }),
            sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
            sql_ast::Value::Null => Ok(Value::Null),
            _ => Err(StoreError::Unsupported(format!(
                "Unsupported value: {}",
                val
            ))),
        }
    }

    pub fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> StoreResult<BinaryOp> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::Eq => Ok(BinaryOp::Eq),
            SqlOp::NotEq => Ok(BinaryOp::NotEq),
            SqlOp::Lt => Ok(BinaryOp::Lt),
            SqlOp::LtEq => Ok(BinaryOp::LtEq),
            SqlOp::Gt => Ok(BinaryOp::Gt),
            SqlOp::GtEq => Ok(BinaryOp::GtEq),
            SqlOp::And => Ok(BinaryOp::And),
            SqlOp::Or => Ok(BinaryOp::Or),
            _ => Err(StoreError::Unsupported(format!(
                "Unsupported binary operator: {}",
                op
            ))),
        }
    }
}

impl Default for ExpressionConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// `$1` -> 0, `$2` -> 1, ...
fn parse_placeholder(placeholder: &str) -> StoreResult<usize> {
    placeholder
        .strip_prefix('$')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .map(|n| n - 1)
        .ok_or_else(|| {
            StoreError::Parse(format!(
                "Unsupported placeholder '{}', expected $1, $2, ...",
                placeholder
            ))
        })
}
