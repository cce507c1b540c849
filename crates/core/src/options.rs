//! Leaf query options and label matchers.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

/// API group addressed by a leaf query. The empty group name is the core group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ApiGroup {
    Core,
    Named(String),
}

impl ApiGroup {
    pub fn from_name(name: &str) -> Self {
        if name.is_empty() { ApiGroup::Core } else { ApiGroup::Named(name.to_string()) }
    }

    /// Group name as used by discovery; `None` for the core group.
    pub fn name(&self) -> Option<&str> {
        match self {
            ApiGroup::Core => None,
            ApiGroup::Named(n) => Some(n.as_str()),
        }
    }
}

impl fmt::Display for ApiGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiGroup::Core => f.write_str("(core)"),
            ApiGroup::Named(n) => f.write_str(n),
        }
    }
}

/// Authoring defect in a leaf query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("api group is not specified for kind {}", .kind.as_deref().unwrap_or("(none)"))]
    MissingApiGroup { kind: Option<String> },
}

/// Predicate over the value of one label key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LabelMatcher {
    Equals(String),
    NotEquals(String),
    Exists,
    DoesNotExist,
    In(BTreeSet<String>),
    NotIn(BTreeSet<String>),
}

impl LabelMatcher {
    /// `value` is the label value on the object, `None` when the key is absent.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            LabelMatcher::Equals(want) => value == Some(want.as_str()),
            LabelMatcher::NotEquals(want) => value != Some(want.as_str()),
            LabelMatcher::Exists => value.is_some(),
            LabelMatcher::DoesNotExist => value.is_none(),
            LabelMatcher::In(set) => value.map(|v| set.contains(v)).unwrap_or(false),
            LabelMatcher::NotIn(set) => value.map(|v| !set.contains(v)).unwrap_or(true),
        }
    }
}

impl From<&str> for LabelMatcher {
    fn from(v: &str) -> Self { LabelMatcher::Equals(v.to_string()) }
}

impl From<String> for LabelMatcher {
    fn from(v: String) -> Self { LabelMatcher::Equals(v) }
}

/// Conjunctive label filters, keyed by label name.
pub type LabelFilters = SmallVec<[(String, LabelMatcher); 4]>;

/// Options addressed to a registry by a leaf query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOptions {
    pub api_group: Option<ApiGroup>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    /// Names in insertion order; repeats are ignored by registries. Empty means "no name filter".
    pub name_filters: Vec<String>,
    /// Empty means "no label filter".
    pub label_filters: LabelFilters,
}

/// Validated addressing part of a [`QueryOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTarget<'a> {
    pub api_group: &'a ApiGroup,
    pub version: Option<&'a str>,
    pub kind: &'a str,
    pub namespace: Option<&'a str>,
}

impl QueryOptions {
    /// Validate the options. `Ok(None)` is the vacuous query (no kind).
    pub fn target(&self) -> Result<Option<QueryTarget<'_>>, ConfigurationError> {
        let api_group = self
            .api_group
            .as_ref()
            .ok_or_else(|| ConfigurationError::MissingApiGroup { kind: self.kind.clone() })?;
        let kind = match self.kind.as_deref() {
            Some(k) if !k.is_empty() => k,
            _ => return Ok(None),
        };
        Ok(Some(QueryTarget {
            api_group,
            version: self.version.as_deref().filter(|v| !v.is_empty()),
            kind,
            namespace: self.namespace.as_deref(),
        }))
    }

    pub fn add_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.name_filters.contains(&name) { self.name_filters.push(name); }
    }

    pub fn add_label(&mut self, key: impl Into<String>, matcher: LabelMatcher) {
        self.label_filters.push((key.into(), matcher));
    }

    /// Name filters with duplicates removed, first occurrence kept.
    pub fn distinct_names(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.name_filters.iter().map(String::as_str).filter(|n| seen.insert(*n)).collect()
    }
}

impl fmt::Display for QueryTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.api_group.name(), self.version) {
            (Some(g), Some(v)) => write!(f, "{}/{}/{}", g, v, self.kind),
            (Some(g), None) => write!(f, "{}/*/{}", g, self.kind),
            (None, Some(v)) => write!(f, "{}/{}", v, self.kind),
            (None, None) => write!(f, "*/{}", self.kind),
        }
    }
}
