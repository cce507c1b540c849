//! Keel registries: resolve leaf query options to manifests.
//!
//! Two implementations share one contract: [`LocalRegistry`] serves a static
//! in-memory index built from loaded manifest sources, [`RemoteRegistry`]
//! serves a live cluster through a [`ClusterClient`].

#![forbid(unsafe_code)]

use keel_core::{ConfigurationError, Manifest, QueryOptions};

pub mod filtering;
pub mod loader;
pub mod local;
pub mod remote;
pub mod scoped;

pub use filtering::apply_label_filter;
pub use loader::{LoadedSource, ManifestLoader};
pub use local::{LocalIndex, LocalRegistry};
pub use remote::{ClusterClient, RemoteRegistry, ResourceClient};
pub use scoped::NamespaceScoped;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("upstream query failed: {0:#}")]
    Upstream(#[source] anyhow::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Resolves `(group, version, kind, namespace, names, labels)` to manifests.
///
/// - missing API group: [`RegistryError::Configuration`] before any lookup
/// - missing kind: empty, no lookup
/// - unknown resource type: empty, logged
pub trait RegistryQueryExecutor: Send + Sync {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>>;
}

impl<T: RegistryQueryExecutor + ?Sized> RegistryQueryExecutor for &T {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> { (**self).query(options) }
}

impl<T: RegistryQueryExecutor + ?Sized> RegistryQueryExecutor for std::sync::Arc<T> {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> { (**self).query(options) }
}

impl<T: RegistryQueryExecutor + ?Sized> RegistryQueryExecutor for Box<T> {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> { (**self).query(options) }
}
