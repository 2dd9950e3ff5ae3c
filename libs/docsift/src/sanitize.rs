//! Filter sanitizer: untrusted JSON tree in, canonical tree plus violations out.
//!
//! Two failure tiers, deliberately asymmetric:
//! - per-clause problems (blocked field, unknown operator, wrong operand
//!   shape) drop that clause, record one violation string and keep going, so
//!   one bad field cannot silently disable an otherwise legitimate filter;
//! - structural limit breaches (depth, array length, string length, object
//!   key count) abort the whole call and fail closed with an empty filter,
//!   because they indicate resource-exhaustion attempts rather than
//!   legitimate-but-malformed queries.

use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::{Clause, FieldCond, FieldOp, Filter, Value};
use crate::policy::{Limits, SanitizeOptions, SecurityPolicy};

/// Reserved key marker of the target query language. Any client key
/// containing it is rejected, never translated.
pub const NATIVE_OPERATOR_MARKER: char = '$';

/// Structural limit breach. Fatal for the whole sanitize call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimitBreach {
    #[error("nesting depth exceeds maximum of {max}")]
    Depth { max: usize },

    #[error("array length {len} exceeds maximum of {max}")]
    ArrayLen { len: usize, max: usize },

    #[error("string length {len} exceeds maximum of {max}")]
    StringLen { len: usize, max: usize },

    #[error("object key count {len} exceeds maximum of {max}")]
    ObjectKeys { len: usize, max: usize },
}

/// Result of sanitizing one untrusted filter tree.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct Sanitized {
    /// The canonical, policy-compliant filter. Empty when everything was
    /// dropped or when a structural breach failed the call closed.
    pub filter: Filter,
    /// One human-readable string per dropped clause or blocked operator,
    /// in encounter order. A single `"Sanitization failed: ..."` entry means
    /// the whole filter was discarded and must be treated as absent.
    pub violations: Vec<String>,
}

impl Sanitized {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// True when the call failed closed on a structural breach.
    #[must_use]
    pub fn failed_closed(&self) -> bool {
        self.violations
            .first()
            .is_some_and(|v| v.starts_with("Sanitization failed"))
    }
}

struct Ctx<'a> {
    policy: &'a SecurityPolicy,
    opts: &'a SanitizeOptions,
    limits: Limits,
}

/// Sanitize an untrusted filter tree against a policy.
///
/// Never panics and never errors: soft violations are recorded in the
/// result, and structural breaches collapse the result to an empty filter
/// with a single `"Sanitization failed: <cause>"` violation.
pub fn sanitize(raw: &Json, policy: &SecurityPolicy, opts: &SanitizeOptions) -> Sanitized {
    let ctx = Ctx {
        policy,
        opts,
        limits: opts.effective_limits(policy),
    };
    let mut violations = Vec::new();
    match sanitize_filter(raw, 0, &ctx, &mut violations) {
        Ok(filter) => Sanitized { filter, violations },
        Err(breach) => {
            warn!(cause = %breach, "filter sanitization failed closed");
            Sanitized {
                filter: Filter::default(),
                violations: vec![format!("Sanitization failed: {breach}")],
            }
        }
    }
}

fn record(violations: &mut Vec<String>, msg: String) {
    debug!(violation = %msg, "dropped filter clause");
    violations.push(msg);
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn sanitize_filter(
    raw: &Json,
    depth: usize,
    ctx: &Ctx<'_>,
    violations: &mut Vec<String>,
) -> Result<Filter, LimitBreach> {
    if depth > ctx.limits.max_depth {
        return Err(LimitBreach::Depth {
            max: ctx.limits.max_depth,
        });
    }

    let Some(obj) = raw.as_object() else {
        record(
            violations,
            format!("Filter clause must be an object: got {}", json_type(raw)),
        );
        return Ok(Filter::default());
    };
    if obj.len() > ctx.limits.max_object_keys {
        return Err(LimitBreach::ObjectKeys {
            len: obj.len(),
            max: ctx.limits.max_object_keys,
        });
    }

    let mut clauses = Vec::new();
    for (key, value) in obj {
        if key.contains(NATIVE_OPERATOR_MARKER) {
            record(
                violations,
                format!("{NATIVE_OPERATOR_MARKER} operators not allowed: {key}"),
            );
            continue;
        }

        let lower = key.to_ascii_lowercase();
        match lower.as_str() {
            "and" | "or" => {
                if !ctx.policy.allows_logical(&lower) {
                    record(violations, format!("Logical operator not allowed: {key}"));
                    continue;
                }
                let Some(items) = value.as_array() else {
                    record(
                        violations,
                        format!("'{lower}' expects an array of clauses: got {}", json_type(value)),
                    );
                    continue;
                };
                if items.len() > ctx.limits.max_array_len {
                    return Err(LimitBreach::ArrayLen {
                        len: items.len(),
                        max: ctx.limits.max_array_len,
                    });
                }
                let mut children = Vec::new();
                for item in items {
                    let child = sanitize_filter(item, depth + 1, ctx, violations)?;
                    if !child.is_empty() {
                        children.push(child);
                    }
                }
                // A group with nothing left in it is omitted outright.
                if !children.is_empty() {
                    clauses.push(if lower == "and" {
                        Clause::And(children)
                    } else {
                        Clause::Or(children)
                    });
                }
            }
            "not" => {
                if !ctx.policy.allows_logical(&lower) {
                    record(violations, format!("Logical operator not allowed: {key}"));
                    continue;
                }
                if !value.is_object() {
                    record(
                        violations,
                        format!("'not' expects an object: got {}", json_type(value)),
                    );
                    continue;
                }
                let inner = sanitize_filter(value, depth + 1, ctx, violations)?;
                if !inner.is_empty() {
                    clauses.push(Clause::Not(inner));
                }
            }
            _ => {
                if ctx.policy.is_protected(key) || ctx.opts.is_protected(key) {
                    record(violations, format!("Blocked protected field: {key}"));
                    continue;
                }
                if !ctx.opts.is_whitelisted(key) {
                    record(violations, format!("Field not in whitelist: {key}"));
                    continue;
                }
                match value {
                    Json::Object(map) => {
                        let ops = sanitize_op_map(key, map, ctx, violations)?;
                        if !ops.is_empty() {
                            clauses.push(Clause::Field {
                                name: key.clone(),
                                cond: FieldCond::Ops(ops),
                            });
                        }
                    }
                    _ => match sanitize_primitive(value, ctx, violations)? {
                        Some(v) => clauses.push(Clause::Field {
                            name: key.clone(),
                            cond: FieldCond::Value(v),
                        }),
                        None => record(violations, format!("Unsupported value for field: {key}")),
                    },
                }
            }
        }
    }
    Ok(Filter::new(clauses))
}

fn sanitize_op_map(
    field: &str,
    map: &serde_json::Map<String, Json>,
    ctx: &Ctx<'_>,
    violations: &mut Vec<String>,
) -> Result<Vec<(FieldOp, Value)>, LimitBreach> {
    if map.len() > ctx.limits.max_object_keys {
        return Err(LimitBreach::ObjectKeys {
            len: map.len(),
            max: ctx.limits.max_object_keys,
        });
    }

    let mut ops = Vec::new();
    // One bad operator never drops its siblings on the same field.
    for (op_key, operand) in map {
        if op_key.contains(NATIVE_OPERATOR_MARKER) {
            record(
                violations,
                format!("{NATIVE_OPERATOR_MARKER} operators not allowed: {op_key}"),
            );
            continue;
        }
        let allowed = ctx.policy.allows_field_op(op_key);
        let Some(op) = FieldOp::parse(op_key).filter(|_| allowed) else {
            record(violations, format!("Operator not allowed: {op_key}"));
            continue;
        };

        match op {
            FieldOp::Like | FieldOp::NotLike => match operand {
                Json::String(s) => {
                    let len = s.chars().count();
                    if len > ctx.limits.max_string_len {
                        return Err(LimitBreach::StringLen {
                            len,
                            max: ctx.limits.max_string_len,
                        });
                    }
                    ops.push((op, Value::String(s.clone())));
                }
                _ => record(
                    violations,
                    format!("'{op}' on {field} expects a string: got {}", json_type(operand)),
                ),
            },
            FieldOp::In | FieldOp::Nin => match operand {
                Json::Array(items) => {
                    if items.len() > ctx.limits.max_array_len {
                        return Err(LimitBreach::ArrayLen {
                            len: items.len(),
                            max: ctx.limits.max_array_len,
                        });
                    }
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        match sanitize_primitive(item, ctx, violations)? {
                            Some(v) => values.push(v),
                            None => record(
                                violations,
                                format!("Unsupported value in '{op}' list on {field}"),
                            ),
                        }
                    }
                    ops.push((op, Value::Array(values)));
                }
                _ => record(
                    violations,
                    format!("'{op}' on {field} expects an array: got {}", json_type(operand)),
                ),
            },
            FieldOp::Between => match operand {
                // Stored as-is; bound ordering is validated at compile time.
                Json::Array(items) if items.len() == 2 => {
                    let mut bounds = Vec::with_capacity(2);
                    for item in items {
                        match sanitize_primitive(item, ctx, violations)? {
                            Some(v) => bounds.push(v),
                            None => {
                                record(
                                    violations,
                                    format!("Unsupported 'between' bound on {field}"),
                                );
                            }
                        }
                    }
                    if bounds.len() == 2 {
                        ops.push((op, Value::Array(bounds)));
                    }
                }
                _ => record(
                    violations,
                    format!("'between' on {field} expects an array of exactly 2 values"),
                ),
            },
            FieldOp::Exists => match operand {
                Json::Bool(b) => ops.push((op, Value::Bool(*b))),
                _ => record(
                    violations,
                    format!("'exists' on {field} expects a boolean: got {}", json_type(operand)),
                ),
            },
            // Operand carries no information; normalized away.
            FieldOp::IsNull | FieldOp::IsNotNull => ops.push((op, Value::Bool(true))),
            _ => match sanitize_primitive(operand, ctx, violations)? {
                Some(v) => ops.push((op, v)),
                None => record(
                    violations,
                    format!("Unsupported operand for '{op}' on {field}"),
                ),
            },
        }
    }
    Ok(ops)
}

/// Sanitize a leaf value. `Ok(None)` means the value is of an unsupported
/// shape (an object in value position) and the clause should be dropped.
fn sanitize_primitive(
    v: &Json,
    ctx: &Ctx<'_>,
    violations: &mut Vec<String>,
) -> Result<Option<Value>, LimitBreach> {
    Ok(match v {
        Json::Null => Some(Value::Null),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => Some(Value::Number(n.clone())),
        Json::String(s) => {
            let len = s.chars().count();
            if len > ctx.limits.max_string_len {
                // An oversized string indicates abuse, not a bad clause.
                return Err(LimitBreach::StringLen {
                    len,
                    max: ctx.limits.max_string_len,
                });
            }
            Some(Value::String(s.clone()))
        }
        Json::Array(items) => {
            if items.len() > ctx.limits.max_array_len {
                return Err(LimitBreach::ArrayLen {
                    len: items.len(),
                    max: ctx.limits.max_array_len,
                });
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match sanitize_primitive(item, ctx, violations)? {
                    Some(v) => out.push(v),
                    None => record(violations, "Unsupported value in array".to_owned()),
                }
            }
            Some(Value::Array(out))
        }
        Json::Object(_) => None,
    })
}
