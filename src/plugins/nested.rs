use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::StoreResult;
use crate::parser::ast::Expr;
use sqlparser::ast as sql_ast;

pub struct NestedPlugin;

impl ExpressionPlugin for NestedPlugin {
    fn name(&self) -> &'static str {
        "NESTED"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Nested(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> StoreResult<Expr> {
        match expr {
            sql_ast::Expr::Nested(inner) => converter.convert(*inner),
            _ => unreachable!("NestedPlugin called with non-nested expression"),
        }
    }
}
