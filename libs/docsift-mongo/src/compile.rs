//! Canonical filter tree → MongoDB filter document.
//!
//! Input is a `docsift::Filter`, which only the sanitizer produces, so no
//! security checks happen here: every key and operator is already policy
//! compliant. What remains is faithful translation — operator mapping, value
//! coercion and per-field merging. Unlike the sanitizer, nothing here is
//! recovered from: every error is a request-level failure.

use bson::{Bson, Document, doc};
use docsift::{Clause, FieldCond, FieldOp, Filter, Value};
use thiserror::Error;
use tracing::trace;

use crate::coerce::{like_pattern, parse_date, to_bson_cast};
use crate::schema::{CompileOptions, ResolvedField};

/// Hard cap on compile recursion. The sanitizer's depth limit keeps real
/// input far below this; reaching it means the two stages disagree.
pub const MAX_COMPILE_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("'between' expects an array of exactly 2 values")]
    BetweenArity,

    #[error("'between' bounds out of order: min must not exceed max")]
    BetweenOrder,

    #[error("'between' is not supported on _id")]
    BetweenOnId,

    #[error("'between' bounds must both be numbers or both be strings")]
    BetweenBounds,

    #[error("invalid date operand: {0}")]
    InvalidDate(String),

    #[error("invalid operand for '{op}': expected {expected}")]
    InvalidOperand { op: FieldOp, expected: &'static str },

    #[error("filter nesting exceeds compiler limit of {}", MAX_COMPILE_DEPTH)]
    RecursionLimit,
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Compile a sanitized filter with default options (the `_id`-suffix cast
/// convention, no schema).
///
/// # Errors
/// Returns [`CompileError`] for malformed `between` operands, unparseable
/// dates, or a stage contract breach (see the variant list). Errors must
/// propagate to the caller as request failures; there is no partial output.
pub fn compile(filter: &Filter) -> CompileResult<Document> {
    compile_with(filter, &CompileOptions::default())
}

/// Compile a sanitized filter into a MongoDB filter document.
///
/// # Errors
/// Same contract as [`compile`].
pub fn compile_with(filter: &Filter, opts: &CompileOptions) -> CompileResult<Document> {
    trace!(clauses = filter.0.len(), "compiling sanitized filter");
    compile_filter(filter, opts, 0)
}

/// Merge the compiled client filter with an entity's permanent filter
/// (logical AND). Permanent filters are never client-overridable; the
/// repository applies them on every query.
#[must_use]
pub fn merge_permanent(client: Document, permanent: Document) -> Document {
    if client.is_empty() {
        return permanent;
    }
    if permanent.is_empty() {
        return client;
    }
    doc! { "$and": [client, permanent] }
}

fn compile_filter(filter: &Filter, opts: &CompileOptions, depth: usize) -> CompileResult<Document> {
    if depth > MAX_COMPILE_DEPTH {
        return Err(CompileError::RecursionLimit);
    }

    let mut out = Document::new();
    for clause in &filter.0 {
        match clause {
            Clause::Field { name, cond } => {
                let field = ResolvedField::resolve(name, opts);
                let cond_doc = compile_field_cond(&field, cond)?;
                merge_field(&mut out, &field.name, cond_doc);
            }
            Clause::And(children) => push_group(&mut out, "$and", children, opts, depth)?,
            Clause::Or(children) => push_group(&mut out, "$or", children, opts, depth)?,
            Clause::Not(inner) => {
                // The engine has no top-level $not; a single-element $nor is
                // the equivalent "none of" construct.
                let compiled = compile_filter(inner, opts, depth + 1)?;
                push_array_element(&mut out, "$nor", Bson::Document(compiled));
            }
        }
    }
    Ok(out)
}

/// Append compiled group members to `key`, extending an existing array when
/// the filter carries more than one group of the same kind.
fn push_group(
    out: &mut Document,
    key: &str,
    children: &[Filter],
    opts: &CompileOptions,
    depth: usize,
) -> CompileResult<()> {
    for child in children {
        let compiled = compile_filter(child, opts, depth + 1)?;
        if !compiled.is_empty() {
            push_array_element(out, key, Bson::Document(compiled));
        }
    }
    Ok(())
}

fn push_array_element(out: &mut Document, key: &str, element: Bson) {
    if let Some(Bson::Array(existing)) = out.get_mut(key) {
        existing.push(element);
    } else {
        out.insert(key, Bson::Array(vec![element]));
    }
}

/// Merge a field's operator document into the output, combining with any
/// operators already present for the same field instead of overwriting them.
fn merge_field(out: &mut Document, name: &str, cond: Document) {
    if let Some(Bson::Document(existing)) = out.get_mut(name) {
        existing.extend(cond);
    } else {
        out.insert(name, cond);
    }
}

fn compile_field_cond(field: &ResolvedField, cond: &FieldCond) -> CompileResult<Document> {
    match cond {
        // Implicit equality becomes explicit $eq so it merges cleanly with
        // other operators on the same field.
        FieldCond::Value(v) => Ok(doc! { "$eq": to_bson_cast(v, field.cast_ids) }),
        FieldCond::Ops(ops) => {
            let mut out = Document::new();
            for (op, operand) in ops {
                compile_op(field, *op, operand, &mut out)?;
            }
            Ok(out)
        }
    }
}

fn compile_op(
    field: &ResolvedField,
    op: FieldOp,
    operand: &Value,
    out: &mut Document,
) -> CompileResult<()> {
    match op {
        FieldOp::Eq => {
            out.insert("$eq", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Ne => {
            out.insert("$ne", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Gt => {
            out.insert("$gt", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Gte => {
            out.insert("$gte", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Lt => {
            out.insert("$lt", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Lte => {
            out.insert("$lte", to_bson_cast(operand, field.cast_ids));
        }
        FieldOp::Like => {
            let Value::String(s) = operand else {
                return Err(CompileError::InvalidOperand {
                    op,
                    expected: "string",
                });
            };
            out.insert("$regex", like_pattern(s));
            out.insert("$options", "i");
        }
        FieldOp::NotLike => {
            let Value::String(s) = operand else {
                return Err(CompileError::InvalidOperand {
                    op,
                    expected: "string",
                });
            };
            out.insert(
                "$not",
                Bson::RegularExpression(bson::Regex {
                    pattern: like_pattern(s),
                    options: "i".to_owned(),
                }),
            );
        }
        FieldOp::In | FieldOp::Nin => {
            // A scalar operand is treated as a one-element membership list.
            let items = match operand {
                Value::Array(items) => items
                    .iter()
                    .map(|v| to_bson_cast(v, field.cast_ids))
                    .collect(),
                single => vec![to_bson_cast(single, field.cast_ids)],
            };
            let key = if op == FieldOp::In { "$in" } else { "$nin" };
            out.insert(key, Bson::Array(items));
        }
        FieldOp::Between => compile_between(field, operand, out)?,
        FieldOp::GtDate => {
            out.insert("$gt", Bson::DateTime(parse_date(operand)?));
        }
        FieldOp::LtDate => {
            out.insert("$lt", Bson::DateTime(parse_date(operand)?));
        }
        FieldOp::Exists => {
            let Value::Bool(b) = operand else {
                return Err(CompileError::InvalidOperand {
                    op,
                    expected: "boolean",
                });
            };
            out.insert("$exists", *b);
        }
        FieldOp::IsNull => {
            out.insert("$eq", Bson::Null);
        }
        FieldOp::IsNotNull => {
            out.insert("$ne", Bson::Null);
        }
    }
    Ok(())
}

/// Inclusive range. Bound ordering is enforced here rather than in the
/// sanitizer because ordering is a semantic property, not a safety one.
fn compile_between(
    field: &ResolvedField,
    operand: &Value,
    out: &mut Document,
) -> CompileResult<()> {
    if field.name == "_id" {
        return Err(CompileError::BetweenOnId);
    }
    let Value::Array(bounds) = operand else {
        return Err(CompileError::BetweenArity);
    };
    let [lo, hi] = bounds.as_slice() else {
        return Err(CompileError::BetweenArity);
    };

    // Identifier-typed fields carry opaque bounds; everything else must be
    // an ordered pair of like-typed values.
    if !field.cast_ids {
        match (lo, hi) {
            (Value::Number(a), Value::Number(b)) => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                if a > b {
                    return Err(CompileError::BetweenOrder);
                }
            }
            (Value::String(a), Value::String(b)) => {
                if a > b {
                    return Err(CompileError::BetweenOrder);
                }
            }
            _ => return Err(CompileError::BetweenBounds),
        }
    }

    out.insert("$gte", to_bson_cast(lo, field.cast_ids));
    out.insert("$lte", to_bson_cast(hi, field.cast_ids));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn implicit_equality_becomes_explicit_eq() {
        let filter = Filter::new(vec![Filter::field("status", "active")]);
        let compiled = compile(&filter).expect("compiles");
        assert_eq!(compiled, doc! { "status": { "$eq": "active" } });
    }

    #[test]
    fn not_compiles_to_single_element_nor() {
        let filter = Filter::new(vec![Filter::not(Filter::new(vec![Filter::field(
            "status", "archived",
        )]))]);
        let compiled = compile(&filter).expect("compiles");
        assert_eq!(
            compiled,
            doc! { "$nor": [ { "status": { "$eq": "archived" } } ] }
        );
    }

    #[test]
    fn scalar_membership_operand_is_wrapped() {
        let filter = Filter::new(vec![Filter::field_ops(
            "status",
            vec![(FieldOp::In, Value::String("active".into()))],
        )]);
        let compiled = compile(&filter).expect("compiles");
        assert_eq!(compiled, doc! { "status": { "$in": ["active"] } });
    }

    #[test]
    fn null_checks_compile_to_null_comparisons() {
        let filter = Filter::new(vec![Filter::field_ops(
            "middleName",
            vec![(FieldOp::IsNull, Value::Bool(true))],
        )]);
        let compiled = compile(&filter).expect("compiles");
        assert_eq!(compiled, doc! { "middleName": { "$eq": Bson::Null } });
    }

    #[test]
    fn merge_permanent_ands_non_empty_documents() {
        let client = doc! { "status": { "$eq": "active" } };
        let permanent = doc! { "isDeleted": false };
        assert_eq!(
            merge_permanent(client.clone(), permanent.clone()),
            doc! { "$and": [client.clone(), permanent.clone()] }
        );
        assert_eq!(merge_permanent(Document::new(), permanent.clone()), permanent);
        assert_eq!(merge_permanent(client.clone(), Document::new()), client);
    }

    #[test]
    fn recursion_guard_trips_on_contract_breach() {
        let mut filter = Filter::new(vec![Filter::field("a", 1i64)]);
        for _ in 0..40 {
            filter = Filter::new(vec![Filter::not(filter)]);
        }
        assert_eq!(compile(&filter), Err(CompileError::RecursionLimit));
    }
}
