//! MongoDB query compiler for sanitized `docsift` filter trees.
//!
//! The second stage of the filter pipeline: takes a canonical
//! [`docsift::Filter`] (trusted by construction — only the sanitizer can
//! produce one) and emits a native `bson::Document` query, handling operator
//! translation, ObjectId coercion, date parsing and regex escaping. Compile
//! errors are request-level failures and are never silently recovered.
//!
//! ```
//! use docsift::{parse_filter_str, SanitizeOptions, SecurityPolicy};
//! use docsift_mongo::compile;
//!
//! let policy = SecurityPolicy::default();
//! let out = parse_filter_str(
//!     r#"{"age": {"gte": 18}}"#,
//!     &policy,
//!     &SanitizeOptions::default(),
//! ).unwrap();
//! let query = compile(&out.filter).unwrap();
//! assert_eq!(query, bson::doc! { "age": { "$gte": 18_i64 } });
//! ```

pub mod coerce;
pub mod compile;
pub mod schema;

pub use coerce::{like_pattern, looks_like_object_id, parse_date};
pub use compile::{
    CompileError, CompileResult, MAX_COMPILE_DEPTH, compile, compile_with, merge_permanent,
};
pub use schema::{CastConfig, CompileOptions, FieldType};
