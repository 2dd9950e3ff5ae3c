//! Field typing and identifier-cast configuration for compilation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared value kind of a queryable field.
///
/// Supplying a schema is the explicit alternative to the `_id`-suffix naming
/// convention: when a field is declared here, the declaration decides whether
/// identifier coercion applies, regardless of spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Date,
    ObjectId,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Number => write!(f, "Number"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Date => write!(f, "Date"),
            FieldType::ObjectId => write!(f, "ObjectId"),
        }
    }
}

/// Identifier-coercion convention settings.
///
/// By default a field whose name ends in `_id` is assumed to hold an
/// ObjectId reference; string operands that look like one (24 hex chars) are
/// cast. A trailing `*` on the field name in the filter, or membership in
/// `no_cast`, suppresses the cast for that field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Name suffix implying an ObjectId reference (default: `_id`)
    pub id_suffix: String,
    /// Fields never cast even when they match the suffix convention
    pub no_cast: HashSet<String>,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            id_suffix: "_id".to_owned(),
            no_cast: HashSet::new(),
        }
    }
}

impl CastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.id_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn without_cast(mut self, field: impl Into<String>) -> Self {
        self.no_cast.insert(field.into());
        self
    }
}

/// Per-call compiler configuration.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct CompileOptions {
    pub cast: CastConfig,
    /// Explicit field schema. When present it overrides the suffix
    /// convention entirely.
    pub schema: Option<HashMap<String, FieldType>>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cast(mut self, cast: CastConfig) -> Self {
        self.cast = cast;
        self
    }

    pub fn with_schema<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.schema = Some(fields.into_iter().map(|(k, t)| (k.into(), t)).collect());
        self
    }
}

/// A field name resolved for compilation: escape marker stripped, cast
/// decision made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedField {
    pub name: String,
    pub cast_ids: bool,
}

impl ResolvedField {
    /// Apply the resolution rules from most to least specific: trailing `*`
    /// escape marker, the `no_cast` set, an explicit schema entry, then the
    /// suffix convention.
    pub(crate) fn resolve(raw: &str, opts: &CompileOptions) -> Self {
        let (name, escaped) = match raw.strip_suffix('*') {
            Some(bare) => (bare, true),
            None => (raw, false),
        };

        let cast_ids = if escaped || opts.cast.no_cast.contains(name) {
            false
        } else if let Some(schema) = &opts.schema {
            schema.get(name) == Some(&FieldType::ObjectId)
        } else {
            name.ends_with(&opts.cast.id_suffix)
        };

        ResolvedField {
            name: name.to_owned(),
            cast_ids,
        }
    }
}
