//! Live registry over a cluster client.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use keel_core::{ApiGroup, Manifest, ManifestSource, QueryOptions, ResourceObject};
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{apply_label_filter, RegistryError, RegistryQueryExecutor, RegistryResult};

/// Access to one resolved resource type.
pub trait ResourceClient {
    /// Point lookup in one namespace, or of a cluster-scoped object when `namespace` is `None`.
    fn get_one(&self, namespace: Option<&str>, name: &str) -> Result<Option<Value>>;
    /// Every object called `name`. With `namespace = None` a namespaced type is searched
    /// across all namespaces.
    fn find_named(&self, namespace: Option<&str>, name: &str) -> Result<Vec<Value>> {
        Ok(self.get_one(namespace, name)?.into_iter().collect())
    }
    /// List in one namespace, or across all namespaces when `None`.
    fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Value>>;
}

/// Resolves resource types on a cluster. `None` means "type not served".
pub trait ClusterClient: Send + Sync {
    fn resolve(&self, kind: &str, api_group: &ApiGroup, version: Option<&str>) -> Option<Box<dyn ResourceClient + '_>>;
}

impl<T: ClusterClient + ?Sized> ClusterClient for Arc<T> {
    fn resolve(&self, kind: &str, api_group: &ApiGroup, version: Option<&str>) -> Option<Box<dyn ResourceClient + '_>> {
        (**self).resolve(kind, api_group, version)
    }
}

pub struct RemoteRegistry<C> {
    client: C,
    source: Arc<ManifestSource>,
}

impl<C: ClusterClient> RemoteRegistry<C> {
    pub fn new(client: C) -> Self { Self { client, source: Arc::new(ManifestSource::live_cluster()) } }

    pub fn source(&self) -> &Arc<ManifestSource> { &self.source }
    pub fn client(&self) -> &C { &self.client }

    fn make_manifest(&self, raw: Value) -> Option<Manifest> {
        match ResourceObject::try_from(raw) {
            Ok(o) => Some(Manifest::new(o, Arc::clone(&self.source))),
            Err(e) => {
                warn!(error = %e, "remote registry: dropping malformed object");
                None
            }
        }
    }
}

impl<C: ClusterClient> RegistryQueryExecutor for RemoteRegistry<C> {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> {
        let started = Instant::now();
        let Some(target) = options.target()? else {
            info!("remote registry: no kind; nothing to look up");
            return Ok(Vec::new());
        };
        debug!(target = %target, ns = ?target.namespace, names = ?options.name_filters, "remote registry: query");
        counter!("registry_queries_total", 1u64, "registry" => "remote");

        let Some(resource) = self.client.resolve(target.kind, target.api_group, target.version) else {
            info!(target = %target, "remote registry: unknown resource");
            counter!("registry_unknown_resource_total", 1u64, "registry" => "remote");
            return Ok(Vec::new());
        };

        let names = options.distinct_names();
        let raw: Vec<Value> = if !names.is_empty() {
            let mut found = Vec::with_capacity(names.len());
            for name in names.iter() {
                found.extend(resource.find_named(target.namespace, name).map_err(RegistryError::Upstream)?);
            }
            found
                .into_iter()
                .filter(|item| {
                    item.pointer("/metadata/name")
                        .and_then(|v| v.as_str())
                        .map(|n| names.contains(&n))
                        .unwrap_or(false)
                })
                .collect()
        } else {
            resource.list_all(target.namespace).map_err(RegistryError::Upstream)?
        };
        let raw_count = raw.len();

        let manifests: Vec<Manifest> = raw.into_iter().filter_map(|v| self.make_manifest(v)).collect();
        let out = apply_label_filter(manifests, &options.label_filters);
        histogram!("registry_query_ms", started.elapsed().as_secs_f64() * 1000.0, "registry" => "remote");
        info!(target = %target, raw = raw_count, count = out.len(), "remote registry: query ok");
        Ok(out)
    }
}
