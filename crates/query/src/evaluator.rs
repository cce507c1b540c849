//! Depth-first evaluation of a [`QueryNode`] against one registry.

use std::time::Instant;

use keel_core::Manifest;
use keel_registry::RegistryQueryExecutor;
use metrics::histogram;
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace};

use crate::ast::QueryNode;
use crate::error::{QueryError, QueryResult};
use crate::shortcut::ShortcutRegistry;

/// Evaluates query trees. Children of `Union`/`First` run strictly in order and
/// nothing is cached between sibling branches.
pub struct Evaluator<'a, R: ?Sized> {
    registry: &'a R,
    shortcuts: &'a ShortcutRegistry,
}

impl<'a, R: RegistryQueryExecutor + ?Sized> Evaluator<'a, R> {
    pub fn new(registry: &'a R, shortcuts: &'a ShortcutRegistry) -> Self { Self { registry, shortcuts } }

    pub fn evaluate(&self, node: &QueryNode) -> QueryResult<Vec<Manifest>> {
        let started = Instant::now();
        let mut path = Vec::new();
        let out = self.eval(node, &mut path);
        let took_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("query_eval_ms", took_ms);
        match &out {
            Ok(items) => info!(root = node.node_kind(), count = items.len(), took_ms, "query evaluated"),
            Err(e) => info!(root = node.node_kind(), error = %e, took_ms, "query failed"),
        }
        out
    }

    pub fn evaluate_shortcut(&self, name: &str, args: &[String]) -> QueryResult<Vec<Manifest>> {
        self.evaluate(&QueryNode::Shortcut { name: name.to_string(), args: args.to_vec() })
    }

    /// `path` holds the shortcut names currently being expanded.
    fn eval(&self, node: &QueryNode, path: &mut Vec<String>) -> QueryResult<Vec<Manifest>> {
        trace!(node = node.node_kind(), depth = path.len(), "eval");
        match node {
            QueryNode::Leaf(options) => {
                if options.target()?.is_none() {
                    debug!("leaf without kind; empty");
                    return Ok(Vec::new());
                }
                Ok(self.registry.query(options)?)
            }
            QueryNode::Union(children) => {
                let mut seen = FxHashSet::default();
                let mut out = Vec::new();
                for child in children {
                    for m in self.eval(child, path)? {
                        if seen.insert(m.id()) { out.push(m); }
                    }
                }
                Ok(out)
            }
            QueryNode::Transform { source, map } => {
                let input = self.eval(source, path)?;
                let mut out = Vec::with_capacity(input.len());
                for m in input.iter() {
                    let derived = map(m).map_err(|source| QueryError::Mapper { stage: "transform", source })?;
                    out.push(Manifest::derived(derived, m));
                }
                Ok(out)
            }
            QueryNode::TransformMany { source, map } => {
                let input = self.eval(source, path)?;
                let mut out = Vec::new();
                for m in input.iter() {
                    let derived = map(m).map_err(|source| QueryError::Mapper { stage: "transform_many", source })?;
                    out.extend(derived.into_iter().map(|o| Manifest::derived(o, m)));
                }
                Ok(out)
            }
            QueryNode::Filter { source, predicate } => {
                let input = self.eval(source, path)?;
                let mut out = Vec::with_capacity(input.len());
                for m in input {
                    if predicate(&m).map_err(|source| QueryError::Mapper { stage: "filter", source })? {
                        out.push(m);
                    }
                }
                Ok(out)
            }
            QueryNode::First(children) => {
                for (i, child) in children.iter().enumerate() {
                    let items = self.eval(child, path)?;
                    if !items.is_empty() {
                        debug!(branch = i, count = items.len(), "first: branch selected");
                        return Ok(items);
                    }
                }
                Ok(Vec::new())
            }
            QueryNode::Shortcut { name, args } => {
                if path.iter().any(|p| p == name) {
                    let mut chain = path.clone();
                    chain.push(name.clone());
                    return Err(QueryError::CyclicShortcut(chain));
                }
                let expanded = self.shortcuts.resolve(name, args)?;
                debug!(shortcut = %name, args = ?args, "shortcut expanded");
                path.push(name.clone());
                let out = self.eval(&expanded, path);
                path.pop();
                out
            }
        }
    }
}
