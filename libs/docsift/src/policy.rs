//! Security policy for filter sanitization.
//!
//! A [`SecurityPolicy`] is pure data: allowed operator names, blocked field
//! names and structural limits. It is built once at startup (or deserialized
//! from app config) and shared by reference across every sanitize call; it
//! has no mutation API after construction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Structural limits that bound worst-case recursion and allocation.
///
/// Breaching any of these is a fatal, fail-closed sanitization error, not a
/// per-clause violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum nesting depth of logical groups (default: 5)
    pub max_depth: usize,
    /// Maximum length of any array (default: 100)
    pub max_array_len: usize,
    /// Maximum length of any string value in characters (default: 512)
    pub max_string_len: usize,
    /// Maximum number of keys in any object (default: 25)
    pub max_object_keys: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_array_len: 100,
            max_string_len: 512,
            max_object_keys: 25,
        }
    }
}

impl Limits {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    #[must_use]
    pub fn with_max_array_len(mut self, max: usize) -> Self {
        self.max_array_len = max;
        self
    }

    #[must_use]
    pub fn with_max_string_len(mut self, max: usize) -> Self {
        self.max_string_len = max;
        self
    }

    #[must_use]
    pub fn with_max_object_keys(mut self, max: usize) -> Self {
        self.max_object_keys = max;
        self
    }
}

fn default_logical_ops() -> HashSet<String> {
    ["and", "or", "not"].iter().map(|s| (*s).to_owned()).collect()
}

fn default_field_ops() -> HashSet<String> {
    [
        "=", "eq", "!=", "ne", "<>", ">", "gt", ">=", "gte", "<", "lt", "<=", "lte", "like",
        "not like", "in", "nin", "not in", "between", "exists", "is null", "is not null", ">date",
        "<date",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_protected_fields() -> HashSet<String> {
    ["isDeleted", "deletedAt", "createdBy", "updatedBy", "password"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

/// Immutable sanitization policy: allowed operators, protected fields and
/// structural limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Allowed logical group operators (default: `and`, `or`, `not`)
    pub logical_ops: HashSet<String>,
    /// Allowed field operator spellings (default: the full DSL)
    pub field_ops: HashSet<String>,
    /// Framework bookkeeping fields clients may never filter on
    pub protected_fields: HashSet<String>,
    /// Structural limits
    pub limits: Limits,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            logical_ops: default_logical_ops(),
            field_ops: default_field_ops(),
            protected_fields: default_protected_fields(),
            limits: Limits::default(),
        }
    }
}

impl SecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a field to the protected set.
    #[must_use]
    pub fn protect_field(mut self, name: impl Into<String>) -> Self {
        self.protected_fields.insert(name.into());
        self
    }

    /// Restrict the field operator set to exactly the given spellings.
    #[must_use]
    pub fn with_field_ops<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_ops = ops.into_iter().map(|s| s.into().to_ascii_lowercase()).collect();
        self
    }

    #[must_use]
    pub fn allows_logical(&self, name: &str) -> bool {
        self.logical_ops.contains(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn allows_field_op(&self, name: &str) -> bool {
        self.field_ops.contains(&name.to_ascii_lowercase())
    }

    /// Protected-field check. The compiler's escape marker (`*` suffix) is
    /// stripped first so it cannot be used to smuggle a protected name past
    /// the check.
    #[must_use]
    pub fn is_protected(&self, name: &str) -> bool {
        let bare = name.strip_suffix('*').unwrap_or(name);
        self.protected_fields.contains(bare)
    }
}

/// Per-call overrides layered on top of a [`SecurityPolicy`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct SanitizeOptions {
    /// When present, every non-logical field key must appear here.
    pub whitelist: Option<HashSet<String>>,
    /// Additional protected fields for this call.
    pub extra_protected: HashSet<String>,
    /// Structural limit overrides for this call.
    pub limits: Option<Limits>,
}

impl SanitizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn protect_field(mut self, name: impl Into<String>) -> Self {
        self.extra_protected.insert(name.into());
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    #[must_use]
    pub fn effective_limits(&self, policy: &SecurityPolicy) -> Limits {
        self.limits.unwrap_or(policy.limits)
    }

    #[must_use]
    pub fn is_whitelisted(&self, name: &str) -> bool {
        match &self.whitelist {
            Some(list) => {
                let bare = name.strip_suffix('*').unwrap_or(name);
                list.contains(bare)
            }
            None => true,
        }
    }

    #[must_use]
    pub fn is_protected(&self, name: &str) -> bool {
        let bare = name.strip_suffix('*').unwrap_or(name);
        self.extra_protected.contains(bare)
    }
}
