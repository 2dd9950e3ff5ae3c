//! Policy-driven sanitizer for untrusted document-database filters.
//!
//! Clients send arbitrarily nested JSON filter expressions; this crate turns
//! them into a canonical, policy-compliant [`ast::Filter`] plus an ordered
//! list of violations describing every dropped clause. The canonical tree is
//! then handed to a backend compiler crate (e.g. `docsift-mongo`) which
//! translates it into the target database's native query representation.
//!
//! Both stages are pure, synchronous and stateless: a [`SecurityPolicy`] is
//! built once and shared by reference across any number of concurrent calls.
//!
//! ```
//! use docsift::{parse_filter_str, SanitizeOptions, SecurityPolicy};
//!
//! let policy = SecurityPolicy::default();
//! let out = parse_filter_str(
//!     r#"{"status": "active", "age": {"gte": 18}}"#,
//!     &policy,
//!     &SanitizeOptions::default(),
//! ).unwrap();
//! assert!(out.violations.is_empty());
//! assert!(!out.filter.is_empty());
//! ```

pub mod ast;
pub mod policy;
pub mod sanitize;

pub use ast::{Clause, FieldCond, FieldOp, Filter, Value};
pub use policy::{Limits, SanitizeOptions, SecurityPolicy};
pub use sanitize::{LimitBreach, NATIVE_OPERATOR_MARKER, Sanitized, sanitize};

/// Error for the inbound JSON boundary.
///
/// A malformed filter string is a client error, distinct from sanitization
/// violations: the caller should answer 400 instead of applying a reduced
/// filter.
#[derive(Debug, thiserror::Error, Clone)]
pub enum FilterParseError {
    #[error("invalid filter JSON: {0}")]
    InvalidJson(String),
}

/// Parse a raw JSON-encoded filter string and sanitize it in one step.
///
/// This is the usual entry point for an HTTP layer that extracted the filter
/// query parameter. Absence of the parameter means "no filter" and is the
/// caller's concern; this function expects an actual string.
///
/// # Errors
/// Returns [`FilterParseError::InvalidJson`] when the string is not valid
/// JSON. Policy violations are never errors; they are reported through
/// [`Sanitized::violations`].
pub fn parse_filter_str(
    raw: &str,
    policy: &SecurityPolicy,
    opts: &SanitizeOptions,
) -> Result<Sanitized, FilterParseError> {
    let tree: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| FilterParseError::InvalidJson(e.to_string()))?;
    Ok(sanitize(&tree, policy, opts))
}
