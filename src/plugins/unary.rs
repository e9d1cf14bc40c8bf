use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::{StoreError, StoreResult, Value};
use crate::parser::ast::Expr;
use sqlparser::ast as sql_ast;

/// `NOT expr` and `-expr`
pub struct UnaryPlugin;

impl ExpressionPlugin for UnaryPlugin {
    fn name(&self) -> &'static str {
        "UNARY"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(
            expr,
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Not | sql_ast::UnaryOperator::Minus,
                ..
            }
        )
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> StoreResult<Expr> {
        let sql_ast::Expr::UnaryOp { op, expr } = expr else {
            unreachable!("UnaryPlugin called with non-unary expression");
        };

        let inner = converter.convert(*expr)?;
        match op {
            sql_ast::UnaryOperator::Not => Ok(Expr::Not(Box::new(inner))),
            sql_ast::UnaryOperator::Minus => match inner {
                // fold negative literals so `-5` stays a constant
                Expr::Literal(Value::Integer(i)) => i
                    .checked_neg()
                    .map(|n| Expr::Literal(Value::Integer(n)))
                    .ok_or_else(|| StoreError::TypeMismatch(format!("Integer overflow: -{}", i))),
                other => Ok(Expr::Negate(Box::new(other))),
            },
            _ => unreachable!("UnaryPlugin only handles NOT and unary minus"),
        }
    }
}
