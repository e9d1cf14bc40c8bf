use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::StoreResult;
use crate::parser::ast::Expr;
use sqlparser::ast as sql_ast;

/// `x [NOT] BETWEEN low AND high`, inclusive on both ends.
///
/// Range lookups and the pruner's `NOT BETWEEN $1 AND $2` delete both come
/// through here, so the bounds are usually bound parameters.
pub struct BetweenPlugin;

impl ExpressionPlugin for BetweenPlugin {
    fn name(&self) -> &'static str {
        "BETWEEN"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Between { .. })
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> StoreResult<Expr> {
        let sql_ast::Expr::Between {
            expr: subject,
            negated,
            low,
            high,
        } = expr
        else {
            unreachable!("BetweenPlugin only handles BETWEEN");
        };

        Ok(Expr::Between {
            expr: Box::new(converter.convert(*subject)?),
            low: Box::new(converter.convert(*low)?),
            high: Box::new(converter.convert(*high)?),
            negated,
        })
    }
}
