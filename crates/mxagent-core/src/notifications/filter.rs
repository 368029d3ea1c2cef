//! Notification filter expressions
//!
//! A filter is a conjunction of terms separated by `&`:
//!
//! ```text
//! category=jmx.attribute.change & severity>=warning & message~heap
//! ```
//!
//! String fields (`resource`, `category`, `message`) support `=` and `!=`
//! with an optional trailing `*` wildcard, and `~` for substring match.
//! `severity` supports `=`, `!=`, `>=` and `<=`. An empty expression
//! matches everything.

use std::fmt;
use std::str::FromStr;

use super::{Notification, Severity};
use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Resource,
    Category,
    Severity,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Contains,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Contains => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Text(String),
    Severity(Severity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    field: Field,
    op: Op,
    operand: Operand,
}

impl Term {
    fn matches(&self, notification: &Notification) -> bool {
        match (&self.operand, self.field) {
            (Operand::Severity(expected), _) => {
                let actual = notification.severity;
                match self.op {
                    Op::Eq => actual == *expected,
                    Op::Ne => actual != *expected,
                    Op::Ge => actual >= *expected,
                    Op::Le => actual <= *expected,
                    Op::Contains => false,
                }
            }
            (Operand::Text(pattern), field) => {
                let actual = match field {
                    Field::Resource => notification.source.as_str(),
                    Field::Category => notification.category.as_str(),
                    Field::Message => notification.message.as_str(),
                    Field::Severity => notification.severity.as_str(),
                };
                match self.op {
                    Op::Eq => glob_match(pattern, actual),
                    Op::Ne => !glob_match(pattern, actual),
                    Op::Contains => actual.contains(pattern.as_str()),
                    Op::Ge | Op::Le => false,
                }
            }
        }
    }
}

fn glob_match(pattern: &str, actual: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => actual.starts_with(prefix),
        None => pattern == actual,
    }
}

/// Parsed filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    source: String,
    terms: Vec<Term>,
}

impl NotificationFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        let mut terms = Vec::new();
        for raw in expression.split('&') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            terms.push(parse_term(raw)?);
        }
        Ok(Self {
            source: expression.trim().to_string(),
            terms,
        })
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        self.terms.iter().all(|term| term.matches(notification))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for NotificationFilter {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_term(raw: &str) -> Result<Term> {
    let invalid = |why: &str| AgentError::InvalidValue(format!("filter term '{}': {}", raw, why));

    let (at, op) = find_operator(raw).ok_or_else(|| invalid("no operator"))?;
    let field_name = raw[..at].trim();
    let value = raw[at + op.symbol().len()..].trim();
    if value.is_empty() {
        return Err(invalid("missing value"));
    }

    let field = match field_name.to_ascii_lowercase().as_str() {
        "resource" | "source" => Field::Resource,
        "category" | "type" => Field::Category,
        "severity" => Field::Severity,
        "message" => Field::Message,
        other => return Err(invalid(&format!("unknown field '{}'", other))),
    };

    let operand = match (field, op) {
        (Field::Severity, Op::Contains) => return Err(invalid("'~' needs a text field")),
        (Field::Severity, _) => Operand::Severity(value.parse()?),
        (_, Op::Ge | Op::Le) => return Err(invalid("ordering needs the severity field")),
        _ => Operand::Text(value.to_string()),
    };

    Ok(Term { field, op, operand })
}

/// Leftmost operator, preferring two-character operators at the same position.
fn find_operator(raw: &str) -> Option<(usize, Op)> {
    let bytes = raw.as_bytes();
    for i in 0..bytes.len() {
        let next = bytes.get(i + 1).copied();
        let op = match (bytes[i], next) {
            (b'!', Some(b'=')) => Some(Op::Ne),
            (b'>', Some(b'=')) => Some(Op::Ge),
            (b'<', Some(b'=')) => Some(Op::Le),
            (b'=', _) => Some(Op::Eq),
            (b'~', _) => Some(Op::Contains),
            _ => None,
        };
        if let Some(op) = op {
            return Some((i, op));
        }
    }
    None
}
