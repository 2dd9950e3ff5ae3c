//! Canonical filter expression tree.
//!
//! A [`Filter`] is only ever produced by the sanitizer, so holding one is
//! proof that every key and operator in it passed policy checks. The
//! compiler consumes it without re-validating.

use std::fmt;

/// A sanitized leaf value: the JSON scalar/array subset that survives
/// primitive sanitization. Objects never appear in value position.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(_) => write!(f, "bool"),
            Value::Number(_) => write!(f, "number"),
            Value::String(_) => write!(f, "string"),
            Value::Array(_) => write!(f, "array"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// The closed set of DSL field operators.
///
/// Clients write the spellings accepted by [`FieldOp::parse`]; the target
/// database's native operator syntax is never accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    Nin,
    Between,
    Exists,
    IsNull,
    IsNotNull,
    GtDate,
    LtDate,
}

impl FieldOp {
    /// Resolve a client-supplied operator name (case-insensitive).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Some(match lower.as_str() {
            "=" | "eq" => FieldOp::Eq,
            "!=" | "ne" | "<>" => FieldOp::Ne,
            ">" | "gt" => FieldOp::Gt,
            ">=" | "gte" => FieldOp::Gte,
            "<" | "lt" => FieldOp::Lt,
            "<=" | "lte" => FieldOp::Lte,
            "like" => FieldOp::Like,
            "not like" => FieldOp::NotLike,
            "in" => FieldOp::In,
            "nin" | "not in" => FieldOp::Nin,
            "between" => FieldOp::Between,
            "exists" => FieldOp::Exists,
            "is null" => FieldOp::IsNull,
            "is not null" => FieldOp::IsNotNull,
            ">date" => FieldOp::GtDate,
            "<date" => FieldOp::LtDate,
            _ => return None,
        })
    }
}

impl fmt::Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOp::Eq => write!(f, "eq"),
            FieldOp::Ne => write!(f, "ne"),
            FieldOp::Gt => write!(f, "gt"),
            FieldOp::Gte => write!(f, "gte"),
            FieldOp::Lt => write!(f, "lt"),
            FieldOp::Lte => write!(f, "lte"),
            FieldOp::Like => write!(f, "like"),
            FieldOp::NotLike => write!(f, "not like"),
            FieldOp::In => write!(f, "in"),
            FieldOp::Nin => write!(f, "nin"),
            FieldOp::Between => write!(f, "between"),
            FieldOp::Exists => write!(f, "exists"),
            FieldOp::IsNull => write!(f, "is null"),
            FieldOp::IsNotNull => write!(f, "is not null"),
            FieldOp::GtDate => write!(f, ">date"),
            FieldOp::LtDate => write!(f, "<date"),
        }
    }
}

/// Condition attached to a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldCond {
    /// Implicit equality: `{"status": "active"}`. The value is kept as-is;
    /// the compiler wraps it in an explicit equality operator so it can be
    /// merged with other operators on the same field.
    Value(Value),
    /// Operator map: `{"age": {"gte": 18, "lt": 65}}`. Order preserved.
    Ops(Vec<(FieldOp, Value)>),
}

/// One entry of an object-level filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Field { name: String, cond: FieldCond },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Filter),
}

/// A canonical, policy-compliant filter: an ordered conjunction of clauses,
/// one per surviving key of the client's filter object.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct Filter(pub Vec<Clause>);

impl Filter {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Filter(clauses)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Implicit-equality clause: `field == value`.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Clause {
        Clause::Field {
            name: name.into(),
            cond: FieldCond::Value(value.into()),
        }
    }

    /// Operator-map clause for a field.
    pub fn field_ops(name: impl Into<String>, ops: Vec<(FieldOp, Value)>) -> Clause {
        Clause::Field {
            name: name.into(),
            cond: FieldCond::Ops(ops),
        }
    }

    pub fn and(children: Vec<Filter>) -> Clause {
        Clause::And(children)
    }

    pub fn or(children: Vec<Filter>) -> Clause {
        Clause::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Clause {
        Clause::Not(inner)
    }
}

impl From<Vec<Clause>> for Filter {
    fn from(clauses: Vec<Clause>) -> Self {
        Filter(clauses)
    }
}
