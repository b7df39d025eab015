//! WHERE clauses for generated statements.
//!
//! A [`Filter`] combines optional raw SQL text, used verbatim, with
//! parameterized conditions built by [`Filter::with_condition`].
//!
//! Raw text is not escaped or parameterized in any way. Never build it from
//! untrusted input; use the condition builder instead.

use crate::sqlite::Value;
use crate::statement::Placeholder;

/// Query operators for building parameterized conditions
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// Row filter for UPDATE, DELETE and SELECT. The default matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    raw: Option<String>,
    conditions: Vec<(String, QueryOperator)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller-supplied boolean expression. Blank text matches every row.
    pub fn raw(expr: impl Into<String>) -> Self {
        let expr = expr.into();
        let raw = (!expr.trim().is_empty()).then_some(expr);
        Self {
            raw,
            conditions: Vec::new(),
        }
    }

    /// Adds a condition, ANDed with everything already in the filter.
    pub fn with_condition(mut self, column: &str, op: QueryOperator) -> Self {
        self.conditions.push((column.to_string(), op));
        self
    }

    pub fn is_all(&self) -> bool {
        self.raw.is_none() && self.conditions.is_empty()
    }

    /// Renders the expression after `WHERE`, numbering placeholders from
    /// `first_arg + 1`. Returns `None` when the filter matches every row.
    pub fn render(&self, placeholder: Placeholder, first_arg: usize) -> Option<(String, Vec<Value>)> {
        if self.is_all() {
            return None;
        }

        let mut parts = Vec::with_capacity(self.conditions.len() + 1);
        if let Some(raw) = &self.raw {
            if self.conditions.is_empty() {
                parts.push(raw.clone());
            } else {
                parts.push(format!("({raw})"));
            }
        }

        let mut args = Vec::new();
        for (column, op) in &self.conditions {
            parts.push(render_condition(column, op, placeholder, first_arg, &mut args));
        }
        Some((parts.join(" AND "), args))
    }
}

impl From<&str> for Filter {
    fn from(expr: &str) -> Self {
        Filter::raw(expr)
    }
}

impl From<String> for Filter {
    fn from(expr: String) -> Self {
        Filter::raw(expr)
    }
}

impl From<&String> for Filter {
    fn from(expr: &String) -> Self {
        Filter::raw(expr.as_str())
    }
}

fn render_condition(
    column: &str,
    op: &QueryOperator,
    placeholder: Placeholder,
    first_arg: usize,
    args: &mut Vec<Value>,
) -> String {
    let mut bind = |value: &Value| {
        args.push(value.clone());
        placeholder.render(first_arg + args.len())
    };

    match op {
        QueryOperator::Equal(value) if value.is_null() => format!("{column} IS NULL"),
        QueryOperator::NotEqual(value) if value.is_null() => format!("{column} IS NOT NULL"),
        QueryOperator::Equal(value) => format!("{column} = {}", bind(value)),
        QueryOperator::NotEqual(value) => format!("{column} != {}", bind(value)),
        QueryOperator::GreaterThan(value) => format!("{column} > {}", bind(value)),
        QueryOperator::GreaterThanOrEqual(value) => format!("{column} >= {}", bind(value)),
        QueryOperator::LessThan(value) => format!("{column} < {}", bind(value)),
        QueryOperator::LessThanOrEqual(value) => format!("{column} <= {}", bind(value)),
        QueryOperator::Like(pattern) => {
            format!("{column} LIKE {}", bind(&Value::Text(pattern.clone())))
        }
        QueryOperator::In(values) if values.is_empty() => "FALSE".to_string(),
        QueryOperator::In(values) => {
            let list: Vec<String> = values.iter().map(&mut bind).collect();
            format!("{column} IN ({})", list.join(", "))
        }
    }
}
