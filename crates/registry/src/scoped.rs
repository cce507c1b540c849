//! Namespace pinning for registries.

use keel_core::{Manifest, QueryOptions};
use tracing::trace;

use crate::{RegistryQueryExecutor, RegistryResult};

/// Gives every leaf query without a namespace a fixed one. Leaves that name
/// their own namespace are passed through unchanged.
pub struct NamespaceScoped<R> {
    inner: R,
    namespace: String,
}

impl<R: RegistryQueryExecutor> NamespaceScoped<R> {
    pub fn new(inner: R, namespace: impl Into<String>) -> Self { Self { inner, namespace: namespace.into() } }

    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn inner(&self) -> &R { &self.inner }
}

impl<R: RegistryQueryExecutor> RegistryQueryExecutor for NamespaceScoped<R> {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> {
        if options.namespace.is_some() {
            return self.inner.query(options);
        }
        trace!(ns = %self.namespace, "scoped registry: pinning namespace");
        let mut pinned = options.clone();
        pinned.namespace = Some(self.namespace.clone());
        self.inner.query(&pinned)
    }
}
