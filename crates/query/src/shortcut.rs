//! Named query templates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::QueryNode;
use crate::error::{QueryError, QueryResult};

pub type ShortcutBuilder = Arc<dyn Fn(&[String]) -> QueryNode + Send + Sync>;

#[derive(Clone)]
pub struct ShortcutDefinition {
    name: String,
    arity: usize,
    builder: ShortcutBuilder,
}

impl ShortcutDefinition {
    pub fn name(&self) -> &str { &self.name }
    pub fn arity(&self) -> usize { self.arity }

    /// Build the query tree for `args`, checking the argument count first.
    pub fn build(&self, args: &[String]) -> QueryResult<QueryNode> {
        if args.len() != self.arity {
            return Err(QueryError::ShortcutArity { name: self.name.clone(), expected: self.arity, got: args.len() });
        }
        Ok((self.builder)(args))
    }
}

impl fmt::Debug for ShortcutDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortcutDefinition").field("name", &self.name).field("arity", &self.arity).finish_non_exhaustive()
    }
}

/// Name -> builder table. Built once, then shared by reference with evaluators.
#[derive(Debug, Clone, Default)]
pub struct ShortcutRegistry {
    defs: BTreeMap<String, ShortcutDefinition>,
}

impl ShortcutRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registry preloaded with the built-in workload/secret vocabulary.
    pub fn with_library() -> Self {
        let mut r = Self::new();
        crate::library::setup(&mut r);
        r
    }

    /// Register a zero-argument shortcut.
    pub fn setup<F>(&mut self, name: &str, builder: F) -> &mut Self
    where
        F: Fn() -> QueryNode + Send + Sync + 'static,
    {
        self.setup_with(name, 0, move |_| builder())
    }

    /// Register a shortcut taking exactly `arity` arguments. Re-registering replaces.
    pub fn setup_with<F>(&mut self, name: &str, arity: usize, builder: F) -> &mut Self
    where
        F: Fn(&[String]) -> QueryNode + Send + Sync + 'static,
    {
        let def = ShortcutDefinition { name: name.to_string(), arity, builder: Arc::new(builder) };
        if self.defs.insert(name.to_string(), def).is_some() {
            warn!(shortcut = %name, "shortcut redefined");
        } else {
            debug!(shortcut = %name, arity, "shortcut registered");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ShortcutDefinition> { self.defs.get(name) }

    /// Resolve a reference into its query tree.
    pub fn resolve(&self, name: &str, args: &[String]) -> QueryResult<QueryNode> {
        self.get(name).ok_or_else(|| QueryError::UnknownShortcut(name.to_string()))?.build(args)
    }

    /// Sorted by name.
    pub fn definitions(&self) -> impl Iterator<Item = &ShortcutDefinition> { self.defs.values() }
    pub fn names(&self) -> impl Iterator<Item = &str> { self.defs.keys().map(String::as_str) }
    pub fn len(&self) -> usize { self.defs.len() }
    pub fn is_empty(&self) -> bool { self.defs.is_empty() }
}
