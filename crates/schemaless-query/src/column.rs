use std::collections::BTreeMap;

use crate::error::QueryError;
use crate::operator::Op;
use crate::value::Value;

/// A named handle to a document field. Combine with a value via a comparison
/// method to produce a [`ColumnExpression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lt(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Lt, val.into())
    }

    pub fn le(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Le, val.into())
    }

    pub fn eq(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Eq, val.into())
    }

    pub fn eq_value(&self, val: Value) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Eq, val)
    }

    pub fn ne(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Ne, val.into())
    }

    pub fn gt(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Gt, val.into())
    }

    pub fn ge(&self, val: impl Into<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::Ge, val.into())
    }

    pub fn in_(&self, vals: Vec<Value>) -> ColumnExpression {
        ColumnExpression::new(self.name.clone(), Op::In, Value::List(vals))
    }
}

/// Ad-hoc namespace for building columns on the fly, e.g. `c.get("user_id")`.
/// Mirrors the original's `ColumnBuilder` attribute-forwarding trick without
/// the dynamic-attribute magic: there is nothing to cache here, a `Column` is
/// just a name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnBuilder;

impl ColumnBuilder {
    pub fn get(&self, name: impl Into<String>) -> Column {
        Column::new(name)
    }
}

pub const C: ColumnBuilder = ColumnBuilder;

/// A column compared against a value via one of the seven operators.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpression {
    pub name: String,
    pub op: Op,
    pub rhs: Value,
}

impl ColumnExpression {
    pub fn new(name: String, op: Op, rhs: Value) -> Self {
        ColumnExpression { name, op, rhs }
    }

    /// Emit a parameterised SQL fragment (`?` placeholders) and the
    /// corresponding parameter list.
    pub fn build(&self) -> Result<(String, Vec<Value>), QueryError> {
        match self.op {
            Op::Lt => Ok((format!("{} < ?", self.name), vec![self.rhs.clone()])),
            Op::Le => Ok((format!("{} <= ?", self.name), vec![self.rhs.clone()])),
            Op::Eq => {
                if self.rhs.is_null() {
                    Ok((format!("{} IS NULL", self.name), vec![]))
                } else {
                    Ok((format!("{} = ?", self.name), vec![self.rhs.clone()]))
                }
            }
            Op::Ne => {
                if self.rhs.is_null() {
                    Ok((format!("{} IS NOT NULL", self.name), vec![]))
                } else {
                    Ok((format!("{} != ?", self.name), vec![self.rhs.clone()]))
                }
            }
            Op::Gt => Ok((format!("{} > ?", self.name), vec![self.rhs.clone()])),
            Op::Ge => Ok((format!("{} >= ?", self.name), vec![self.rhs.clone()])),
            Op::In => {
                let Value::List(vals) = &self.rhs else {
                    return Err(QueryError::InternalError(
                        "IN predicate built with a non-list rhs".to_string(),
                    ));
                };
                if vals.is_empty() {
                    return Err(QueryError::EmptyInClause);
                }
                let placeholders = vals.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                Ok((format!("{} IN ({placeholders})", self.name), vals.clone()))
            }
        }
    }

    /// Evaluate the predicate client-side against a decoded document. A
    /// missing field compares false for every operator except `Ne`, where
    /// "the field isn't even there" counts as "not equal".
    pub fn check(&self, doc: &BTreeMap<String, Value>) -> bool {
        let Some(val) = doc.get(&self.name) else {
            return self.op == Op::Ne;
        };
        match self.op {
            Op::Lt => val.partial_cmp(&self.rhs) == Some(std::cmp::Ordering::Less),
            Op::Le => matches!(
                val.partial_cmp(&self.rhs),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            Op::Eq => val == &self.rhs,
            Op::Ne => val != &self.rhs,
            Op::Gt => val.partial_cmp(&self.rhs) == Some(std::cmp::Ordering::Greater),
            Op::Ge => matches!(
                val.partial_cmp(&self.rhs),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            Op::In => match &self.rhs {
                Value::List(vals) => vals.contains(val),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_against_null_builds_is_null() {
        let expr = Column::new("m").eq(Value::Null);
        let (sql, params) = expr.build().unwrap();
        assert_eq!(sql, "m IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn ne_against_null_builds_is_not_null() {
        let expr = Column::new("m").ne(Value::Null);
        let (sql, params) = expr.build().unwrap();
        assert_eq!(sql, "m IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn empty_in_clause_is_rejected() {
        let expr = Column::new("user_id").in_(vec![]);
        assert!(matches!(expr.build(), Err(QueryError::EmptyInClause)));
    }

    #[test]
    fn in_clause_builds_placeholders() {
        let expr = Column::new("user_id").in_(vec![Value::from("a"), Value::from("b")]);
        let (sql, params) = expr.build().unwrap();
        assert_eq!(sql, "user_id IN (?, ?)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn check_missing_field_is_false_except_for_ne() {
        let doc = BTreeMap::new();
        assert!(!Column::new("bar").eq(1i64).check(&doc));
        assert!(Column::new("bar").ne(1i64).check(&doc));
    }

    #[test]
    fn check_compares_present_field() {
        let mut doc = BTreeMap::new();
        doc.insert("bar".to_string(), Value::Int(5));
        assert!(Column::new("bar").gt(1i64).check(&doc));
        assert!(!Column::new("bar").lt(1i64).check(&doc));
        assert!(Column::new("bar").in_(vec![Value::Int(5), Value::Int(6)]).check(&doc));
    }
}
