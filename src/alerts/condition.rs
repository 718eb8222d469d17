//! Condition parsing and evaluation.
//!
//! A condition is a single comparison of one message field against a
//! literal: `temperature<33`, `status==ok`. The string decomposes into
//! `<field><operator><value>` at construction, and evaluation is a closed
//! match over the six recognized operators — condition text is never
//! executed as code.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::error::AlertError;

/// The six recognized comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl ComparisonOp {
    /// Two-character operators first so `<=` is not read as `<`.
    const TABLE: &'static [(&'static str, ComparisonOp)] = &[
        ("<=", ComparisonOp::Le),
        (">=", ComparisonOp::Ge),
        ("==", ComparisonOp::Eq),
        ("!=", ComparisonOp::Ne),
        ("<", ComparisonOp::Lt),
        (">", ComparisonOp::Gt),
    ];

    fn strip(expr: &str) -> Option<(ComparisonOp, &str)> {
        Self::TABLE
            .iter()
            .find_map(|(sym, op)| expr.strip_prefix(sym).map(|rest| (*op, rest)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            ComparisonOp::Lt => ord == Ordering::Less,
            ComparisonOp::Le => ord != Ordering::Greater,
            ComparisonOp::Gt => ord == Ordering::Greater,
            ComparisonOp::Ge => ord != Ordering::Less,
            ComparisonOp::Eq => ord == Ordering::Equal,
            ComparisonOp::Ne => ord != Ordering::Equal,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed condition: one message field compared against one literal.
///
/// The three parts are set atomically from a single condition string;
/// a string that does not decompose is rejected outright.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: String,
    op: ComparisonOp,
    value: String,
}

impl Condition {
    /// Parse a `<field><operator><value>` condition string.
    ///
    /// The field is the leading run of `[A-Za-z0-9_]` characters; it must
    /// be non-empty and must be followed by a recognized operator and a
    /// non-empty literal. Whitespace around the operator and value is
    /// ignored, so `temperature < 33` and `temperature<33` parse the
    /// same — older rule files write the spaced form.
    pub fn parse(condition: &str) -> Result<Self, AlertError> {
        let invalid = |reason: &str| AlertError::InvalidCondition {
            condition: condition.to_string(),
            reason: reason.to_string(),
        };

        let boundary = condition
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .ok_or_else(|| invalid("expected '<field><operator><value>'"))?;
        if boundary == 0 {
            return Err(invalid("condition must start with a field name"));
        }

        let (field, expr) = condition.split_at(boundary);
        let (op, value) = ComparisonOp::strip(expr.trim_start())
            .ok_or_else(|| invalid("operator must be one of <, <=, >, >=, ==, !="))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(invalid("comparison value is empty"));
        }

        Ok(Self {
            field: field.to_string(),
            op,
            value: value.to_string(),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> ComparisonOp {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether an observed field value satisfies this condition.
    ///
    /// Compared numerically when both sides parse as numbers, otherwise
    /// as text.
    pub fn is_met(&self, observed: &Value) -> bool {
        let observed = value_text(observed);
        let ord = match (observed.parse::<f64>(), self.value.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b),
            _ => Some(observed.as_str().cmp(self.value.as_str())),
        };
        ord.is_some_and(|ord| self.op.holds(ord))
    }
}

impl fmt::Display for Condition {
    /// Renders the normalized `<field><operator><value>` form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.op, self.value)
    }
}

/// Render a JSON value the way it would appear in a condition literal.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
