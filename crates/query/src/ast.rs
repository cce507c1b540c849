//! Query AST and the builder functions that produce it.
//!
//! Builders only assemble trees; nothing here touches a registry.
//!
//! ```
//! use keel_query::ast::{api_version, transform, union, shortcut};
//!
//! let pods = union([
//!     shortcut("DeploymentPodSpec", Vec::<String>::new()),
//!     transform(api_version("v1").kind("Pod")).to(|m| Ok(m.object().clone())),
//! ]);
//! assert_eq!(pods.node_kind(), "union");
//! ```

use std::fmt;
use std::sync::Arc;

use keel_core::{ApiGroup, LabelMatcher, Manifest, QueryOptions, ResourceObject};

/// Maps one manifest to exactly one derived document.
pub type MapOne = Arc<dyn Fn(&Manifest) -> anyhow::Result<ResourceObject> + Send + Sync>;
/// Maps one manifest to zero or more derived documents.
pub type MapMany = Arc<dyn Fn(&Manifest) -> anyhow::Result<Vec<ResourceObject>> + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&Manifest) -> anyhow::Result<bool> + Send + Sync>;

/// Immutable query tree. Cloning shares callbacks.
#[derive(Clone)]
pub enum QueryNode {
    Leaf(QueryOptions),
    Union(Vec<QueryNode>),
    Transform { source: Box<QueryNode>, map: MapOne },
    TransformMany { source: Box<QueryNode>, map: MapMany },
    Filter { source: Box<QueryNode>, predicate: Predicate },
    First(Vec<QueryNode>),
    Shortcut { name: String, args: Vec<String> },
}

impl QueryNode {
    /// Leaf over raw options; unlike the builder, the API group may be missing.
    pub fn leaf(options: QueryOptions) -> Self { QueryNode::Leaf(options) }

    pub fn node_kind(&self) -> &'static str {
        match self {
            QueryNode::Leaf(_) => "leaf",
            QueryNode::Union(_) => "union",
            QueryNode::Transform { .. } => "transform",
            QueryNode::TransformMany { .. } => "transform_many",
            QueryNode::Filter { .. } => "filter",
            QueryNode::First(_) => "first",
            QueryNode::Shortcut { .. } => "shortcut",
        }
    }
}

impl fmt::Debug for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Leaf(o) => f.debug_tuple("Leaf").field(o).finish(),
            QueryNode::Union(c) => f.debug_tuple("Union").field(c).finish(),
            QueryNode::Transform { source, .. } => f.debug_struct("Transform").field("source", source).finish_non_exhaustive(),
            QueryNode::TransformMany { source, .. } => f.debug_struct("TransformMany").field("source", source).finish_non_exhaustive(),
            QueryNode::Filter { source, .. } => f.debug_struct("Filter").field("source", source).finish_non_exhaustive(),
            QueryNode::First(c) => f.debug_tuple("First").field(c).finish(),
            QueryNode::Shortcut { name, args } => f.debug_struct("Shortcut").field("name", name).field("args", args).finish(),
        }
    }
}

// ---- leaf builder ----

/// Accumulates [`QueryOptions`] for a leaf query.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct LeafBuilder {
    options: QueryOptions,
}

/// Start from an API group; `""` is the core group.
pub fn api_group(group: &str) -> LeafBuilder {
    LeafBuilder { options: QueryOptions { api_group: Some(ApiGroup::from_name(group)), ..Default::default() } }
}

/// Start from an `apiVersion` string: `"apps/v1"` or `"v1"` (core group).
pub fn api_version(api_version: &str) -> LeafBuilder {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    api_group(group).version(version)
}

/// Start from the core (legacy) group.
pub fn core() -> LeafBuilder { api_group("") }

impl LeafBuilder {
    pub fn version(mut self, version: &str) -> Self {
        self.options.version = Some(version.to_string());
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.options.kind = Some(kind.to_string());
        self
    }

    /// Repeatable; names accumulate.
    pub fn name(mut self, name: &str) -> Self {
        self.options.add_name(name);
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.options.namespace = Some(namespace.to_string());
        self
    }

    /// Equality label filter.
    pub fn label(self, key: &str, value: &str) -> Self { self.label_matching(key, LabelMatcher::from(value)) }

    pub fn label_matching(mut self, key: &str, matcher: LabelMatcher) -> Self {
        self.options.add_label(key, matcher);
        self
    }

    pub fn options(&self) -> &QueryOptions { &self.options }

    pub fn build(self) -> QueryNode { QueryNode::Leaf(self.options) }
}

impl From<LeafBuilder> for QueryNode {
    fn from(b: LeafBuilder) -> Self { b.build() }
}

// ---- combinators ----

/// Set union by manifest identity, first-seen order.
pub fn union<I, N>(children: I) -> QueryNode
where
    I: IntoIterator<Item = N>,
    N: Into<QueryNode>,
{
    QueryNode::Union(children.into_iter().map(Into::into).collect())
}

/// First non-empty child result; later children are not evaluated.
pub fn first<I, N>(children: I) -> QueryNode
where
    I: IntoIterator<Item = N>,
    N: Into<QueryNode>,
{
    QueryNode::First(children.into_iter().map(Into::into).collect())
}

/// Named query template, resolved when evaluated.
pub fn shortcut<I, S>(name: &str, args: I) -> QueryNode
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    QueryNode::Shortcut { name: name.to_string(), args: args.into_iter().map(Into::into).collect() }
}

#[must_use]
pub struct TransformBuilder(QueryNode);
#[must_use]
pub struct TransformManyBuilder(QueryNode);
#[must_use]
pub struct FilterBuilder(QueryNode);

pub fn transform(source: impl Into<QueryNode>) -> TransformBuilder { TransformBuilder(source.into()) }
pub fn transform_many(source: impl Into<QueryNode>) -> TransformManyBuilder { TransformManyBuilder(source.into()) }
pub fn filter(source: impl Into<QueryNode>) -> FilterBuilder { FilterBuilder(source.into()) }

impl TransformBuilder {
    pub fn to<F>(self, map: F) -> QueryNode
    where
        F: Fn(&Manifest) -> anyhow::Result<ResourceObject> + Send + Sync + 'static,
    {
        QueryNode::Transform { source: Box::new(self.0), map: Arc::new(map) }
    }
}

impl TransformManyBuilder {
    pub fn to<F>(self, map: F) -> QueryNode
    where
        F: Fn(&Manifest) -> anyhow::Result<Vec<ResourceObject>> + Send + Sync + 'static,
    {
        QueryNode::TransformMany { source: Box::new(self.0), map: Arc::new(map) }
    }
}

impl FilterBuilder {
    pub fn criteria<F>(self, predicate: F) -> QueryNode
    where
        F: Fn(&Manifest) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        QueryNode::Filter { source: Box::new(self.0), predicate: Arc::new(predicate) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_options(node: &QueryNode) -> &QueryOptions {
        match node {
            QueryNode::Leaf(o) => o,
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn api_version_splits_group() {
        let n = api_version("apps/v1").kind("Deployment").build();
        let o = leaf_options(&n);
        assert_eq!(o.api_group, Some(ApiGroup::Named("apps".into())));
        assert_eq!(o.version.as_deref(), Some("v1"));
        assert_eq!(o.kind.as_deref(), Some("Deployment"));

        let n = api_version("v1").kind("Secret").build();
        assert_eq!(leaf_options(&n).api_group, Some(ApiGroup::Core));
    }

    #[test]
    fn builder_accumulates_names_and_labels() {
        let n: QueryNode = core().kind("Secret").name("a").name("b").name("a").namespace("prod").label("app", "web").into();
        let o = leaf_options(&n);
        assert_eq!(o.name_filters, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(o.namespace.as_deref(), Some("prod"));
        assert_eq!(o.label_filters.len(), 1);
    }

    #[test]
    fn empty_group_name_is_core() {
        assert_eq!(leaf_options(&api_group("").kind("Pod").build()).api_group, Some(ApiGroup::Core));
    }

    #[test]
    fn combinators_nest_without_evaluating() {
        let n = first([
            core().kind("Secret").build(),
            transform(filter(api_group("bitnami.com").kind("SealedSecret")).criteria(|_| Ok(true))).to(|m| Ok(m.object().clone())),
        ]);
        match &n {
            QueryNode::First(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[1].node_kind(), "transform");
            }
            other => panic!("unexpected {:?}", other),
        }
        let dbg = format!("{:?}", n);
        assert!(dbg.contains("SealedSecret"));
    }
}
