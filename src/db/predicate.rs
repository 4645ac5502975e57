use rusqlite::types::Value;

use crate::db::column::Column;
use crate::db::open::anchored_regex;
use crate::error::Result;

/// A filter over job records, rendered to a parameterised SQL `WHERE` clause
#[derive(Clone, Debug)]
pub enum Predicate {
    All,
    Eq(Column, Value),
    Ne(Column, Value),
    NotIn(Column, Vec<Value>),
    /// Column value matches the pattern, anchored at the start of the value
    Regex(Column, String),
    /// Inclusive numeric range, either bound may be open
    Range {
        column: Column,
        min: Option<i64>,
        max: Option<i64>,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Predicate::Eq(column, value.into())
    }

    pub fn ne(column: Column, value: impl Into<Value>) -> Self {
        Predicate::Ne(column, value.into())
    }

    pub fn not_in<V: Into<Value>>(column: Column, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::NotIn(column, values.into_iter().map(Into::into).collect())
    }

    /// Checked up front so a bad pattern is reported as such, not as a store failure
    pub fn regex(column: Column, pattern: &str) -> Result<Self> {
        anchored_regex(pattern)?;
        Ok(Predicate::Regex(column, pattern.to_string()))
    }

    pub fn range(column: Column, min: Option<i64>, max: Option<i64>) -> Self {
        Predicate::Range { column, min, max }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::All => other,
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Render as SQL, appending bound values to `params` in placeholder order
    pub fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::All => "1".to_string(),
            Predicate::Eq(column, value) => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            Predicate::Ne(column, value) => {
                params.push(value.clone());
                format!("{column} != ?")
            }
            Predicate::NotIn(column, values) => {
                if values.is_empty() {
                    return "1".to_string();
                }
                params.extend(values.iter().cloned());
                let marks = vec!["?"; values.len()].join(", ");
                format!("{column} NOT IN ({marks})")
            }
            Predicate::Regex(column, pattern) => {
                params.push(Value::Text(pattern.clone()));
                format!("{column} REGEXP ?")
            }
            Predicate::Range { column, min, max } => {
                let mut sql = format!("({column} GLOB '[0-9]*'");
                if let Some(min) = min {
                    params.push(Value::Integer(*min));
                    sql.push_str(&format!(" AND CAST({column} AS INTEGER) >= ?"));
                }
                if let Some(max) = max {
                    params.push(Value::Integer(*max));
                    sql.push_str(&format!(" AND CAST({column} AS INTEGER) <= ?"));
                }
                sql.push(')');
                sql
            }
            Predicate::And(parts) => {
                if parts.is_empty() {
                    return "1".to_string();
                }
                let clauses: Vec<String> = parts.iter().map(|part| part.to_sql(params)).collect();
                format!("({})", clauses.join(" AND "))
            }
        }
    }
}
