use std::cmp::Ordering;

use crate::core::{Row, Schema, StoreError, StoreResult, Value};
use crate::parser::ast::{BinaryOp, Expr};

/// Evaluates expressions against one row of one table.
///
/// Comparisons follow SQL three-valued logic: anything compared with NULL is
/// NULL, and a NULL predicate does not select the row.
pub struct EvaluationContext<'a> {
    table: &'a str,
    schema: &'a Schema,
    params: &'a [Value],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(table: &'a str, schema: &'a Schema, params: &'a [Value]) -> Self {
        Self {
            table,
            schema,
            params,
        }
    }

    /// Evaluate an expression that may not reference columns (INSERT values).
    pub fn evaluate_constant(&self, expr: &Expr) -> StoreResult<Value> {
        self.evaluate(expr, &Vec::new())
    }

    pub fn evaluate(&self, expr: &Expr, row: &Row) -> StoreResult<Value> {
        match expr {
            Expr::Column(name) => {
                let idx = self.schema.find_column_index(name).ok_or_else(|| {
                    StoreError::ColumnNotFound(name.clone(), self.table.to_string())
                })?;
                row.get(idx).cloned().ok_or_else(|| {
                    StoreError::Execution(format!(
                        "Column '{}' is not available in this context",
                        name
                    ))
                })
            }
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Param(idx) => self.params.get(*idx).cloned().ok_or_else(|| {
                StoreError::Execution(format!(
                    "Parameter ${} is not bound ({} given)",
                    idx + 1,
                    self.params.len()
                ))
            }),
            Expr::BinaryOp { left, op, right } => {
                let left = self.evaluate(left, row)?;
                let right = self.evaluate(right, row)?;
                match op {
                    BinaryOp::And => logical_and(&left, &right),
                    BinaryOp::Or => logical_or(&left, &right),
                    _ => compare(&left, *op, &right),
                }
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.evaluate(expr, row)?;
                let low = self.evaluate(low, row)?;
                let high = self.evaluate(high, row)?;
                if value.is_null() || low.is_null() || high.is_null() {
                    return Ok(Value::Null);
                }
                let inside = value.compare(&low)? != Ordering::Less
                    && value.compare(&high)? != Ordering::Greater;
                Ok(Value::Boolean(inside != *negated))
            }
            Expr::Not(inner) => match self.evaluate(inner, row)? {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                other => Err(StoreError::TypeMismatch(format!(
                    "NOT expects a boolean, got {}",
                    other.type_name()
                ))),
            },
            Expr::Negate(inner) => match self.evaluate(inner, row)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| StoreError::TypeMismatch(format!("Integer overflow: -{}", i))),
                other => Err(StoreError::TypeMismatch(format!(
                    "Cannot negate {}",
                    other.type_name()
                ))),
            },
        }
    }

    /// True only when the predicate evaluates to TRUE.
    pub fn matches(&self, predicate: Option<&Expr>, row: &Row) -> StoreResult<bool> {
        match predicate {
            None => Ok(true),
            Some(expr) => match self.evaluate(expr, row)? {
                Value::Boolean(b) => Ok(b),
                Value::Null => Ok(false),
                other => Err(StoreError::TypeMismatch(format!(
                    "WHERE clause must be boolean, got {}",
                    other.type_name()
                ))),
            },
        }
    }
}

fn compare(left: &Value, op: BinaryOp, right: &Value) -> StoreResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let ord = left.compare(right)?;
    let result = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::NotEq => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::LtEq => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::GtEq => ord != Ordering::Less,
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled by caller"),
    };
    Ok(Value::Boolean(result))
}

fn as_truth(value: &Value) -> StoreResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(StoreError::TypeMismatch(format!(
            "Logical operator expects a boolean, got {}",
            other.type_name()
        ))),
    }
}

fn logical_and(left: &Value, right: &Value) -> StoreResult<Value> {
    Ok(match (as_truth(left)?, as_truth(right)?) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    })
}

fn logical_or(left: &Value, right: &Value) -> StoreResult<Value> {
    Ok(match (as_truth(left)?, as_truth(right)?) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("k", DataType::Integer),
            Column::new("name", DataType::Text),
        ])
    }

    fn between(negated: bool) -> Expr {
        Expr::Between {
            expr: Box::new(Expr::Column("k".into())),
            low: Box::new(Expr::Param(0)),
            high: Box::new(Expr::Param(1)),
            negated,
        }
    }

    #[test]
    fn test_between_is_inclusive() {
        let schema = schema();
        let params = [Value::Integer(10), Value::Integer(20)];
        let ctx = EvaluationContext::new("t", &schema, &params);

        for (k, expected) in [(9, false), (10, true), (20, true), (21, false)] {
            let row = vec![Value::Integer(k), Value::Null];
            assert_eq!(ctx.matches(Some(&between(false)), &row).unwrap(), expected);
            assert_eq!(ctx.matches(Some(&between(true)), &row).unwrap(), !expected);
        }
    }

    #[test]
    fn test_null_never_matches() {
        let schema = schema();
        let params = [Value::Integer(10), Value::Integer(20)];
        let ctx = EvaluationContext::new("t", &schema, &params);
        let row = vec![Value::Null, Value::Null];

        assert!(!ctx.matches(Some(&between(false)), &row).unwrap());
        assert!(!ctx.matches(Some(&between(true)), &row).unwrap());
    }

    #[test]
    fn test_three_valued_logic() {
        let null = Value::Null;
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);

        assert_eq!(logical_and(&null, &f).unwrap(), f);
        assert_eq!(logical_and(&null, &t).unwrap(), null);
        assert_eq!(logical_or(&null, &t).unwrap(), t);
        assert_eq!(logical_or(&null, &f).unwrap(), null);
    }

    #[test]
    fn test_missing_param_and_column() {
        let schema = schema();
        let ctx = EvaluationContext::new("t", &schema, &[]);
        let row = vec![Value::Integer(1), Value::Null];

        assert!(matches!(
            ctx.evaluate(&Expr::Param(0), &row),
            Err(StoreError::Execution(_))
        ));
        assert_eq!(
            ctx.evaluate(&Expr::Column("nope".into()), &row).unwrap_err(),
            StoreError::ColumnNotFound("nope".into(), "t".into())
        );
    }

    #[test]
    fn test_comparison_type_mismatch() {
        let schema = schema();
        let ctx = EvaluationContext::new("t", &schema, &[]);
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Column("name".into())),
            op: BinaryOp::Eq,
            right: Box::new(Expr::Literal(Value::Integer(1))),
        };
        let row = vec![Value::Integer(1), Value::Text("a".into())];
        assert!(matches!(
            ctx.evaluate(&expr, &row),
            Err(StoreError::TypeMismatch(_))
        ));
    }
}
