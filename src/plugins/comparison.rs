use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::StoreResult;
use crate::parser::ast::Expr;
use sqlparser::ast as sql_ast;

/// Comparisons plus AND/OR; both evaluate to booleans.
pub struct ComparisonPlugin;

impl ExpressionPlugin for ComparisonPlugin {
    fn name(&self) -> &'static str {
        "COMPARISON"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        if let sql_ast::Expr::BinaryOp { op, .. } = expr {
            matches!(
                op,
                sql_ast::BinaryOperator::Eq
                    | sql_ast::BinaryOperator::NotEq
                    | sql_ast::BinaryOperator::Lt
                    | sql_ast::BinaryOperator::LtEq
                    | sql_ast::BinaryOperator::Gt
                    | sql_ast::BinaryOperator::GtEq
                    | sql_ast::BinaryOperator::And
                    | sql_ast::BinaryOperator::Or
            )
        } else {
            false
        }
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> StoreResult<Expr> {
        match expr {
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(converter.convert(*left)?),
                op: converter.convert_binary_op(&op)?,
                right: Box::new(converter.convert(*right)?),
            }),
            _ => unreachable!("ComparisonPlugin called with non-comparison expression"),
        }
    }
}
