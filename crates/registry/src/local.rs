//! Static registry served from an in-memory index of loaded manifests.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use keel_core::{ApiGroup, Manifest, QueryOptions, QueryTarget};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::{apply_label_filter, LoadedSource, RegistryQueryExecutor, RegistryResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKey {
    group: ApiGroup,
    kind: String,
}

/// Manifests grouped by `(api group, kind)`, each group in load order.
#[derive(Debug, Default)]
pub struct LocalIndex {
    by_type: FxHashMap<TypeKey, Vec<Manifest>>,
    len: usize,
}

impl LocalIndex {
    pub fn new() -> Self { Self::default() }

    pub fn from_manifests(items: impl IntoIterator<Item = Manifest>) -> Self {
        let mut idx = Self::new();
        for m in items { idx.insert(m); }
        idx
    }

    /// Index every document of every loaded source.
    pub fn from_loaded(sources: &[LoadedSource]) -> Self {
        Self::from_manifests(sources.iter().flat_map(|s| s.manifests()))
    }

    /// Returns false (and skips the manifest) when it has no `apiVersion` or `kind`.
    pub fn insert(&mut self, m: Manifest) -> bool {
        let o = m.object();
        let (Some(_), Some(kind)) = (o.api_version(), o.kind()) else {
            warn!(source = %m.source().path, "index: manifest without apiVersion/kind skipped");
            return false;
        };
        let key = TypeKey { group: ApiGroup::from_name(o.api_group().unwrap_or("")), kind: kind.to_string() };
        self.by_type.entry(key).or_default().push(m);
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Manifests of the target type, `None` when the type is unknown to this index.
    fn of_type(&self, target: &QueryTarget<'_>) -> Option<Vec<&Manifest>> {
        let key = TypeKey { group: target.api_group.clone(), kind: target.kind.to_string() };
        let all = self.by_type.get(&key)?;
        let typed: Vec<&Manifest> = match target.version {
            Some(v) => all.iter().filter(|m| m.object().version() == Some(v)).collect(),
            None => all.iter().collect(),
        };
        if typed.is_empty() { None } else { Some(typed) }
    }

    /// Raw lookup without label filtering; `None` for an unknown resource type.
    pub fn lookup(&self, target: &QueryTarget<'_>, names: &[&str]) -> Option<Vec<Manifest>> {
        let typed = self.of_type(target)?;
        let in_ns = |m: &&Manifest| match target.namespace {
            Some(ns) => m.object().namespace() == Some(ns),
            None => true,
        };
        if names.is_empty() {
            return Some(typed.into_iter().filter(in_ns).cloned().collect());
        }
        let mut out = Vec::new();
        for name in names {
            out.extend(typed.iter().copied().filter(in_ns).filter(|m| m.object().name() == Some(*name)).cloned());
        }
        Some(out)
    }
}

/// Registry over a swappable [`LocalIndex`] snapshot.
pub struct LocalRegistry {
    index: ArcSwap<LocalIndex>,
}

impl LocalRegistry {
    pub fn new(index: LocalIndex) -> Self { Self { index: ArcSwap::from_pointee(index) } }

    pub fn from_loaded(sources: &[LoadedSource]) -> Self { Self::new(LocalIndex::from_loaded(sources)) }

    /// Current snapshot; stays valid after a later `replace`.
    pub fn snapshot(&self) -> Arc<LocalIndex> { self.index.load_full() }

    /// Swap in a new index. Queries already running keep their snapshot.
    pub fn replace(&self, index: LocalIndex) {
        let len = index.len();
        self.index.store(Arc::new(index));
        info!(manifests = len, "local registry: index replaced");
    }
}

impl RegistryQueryExecutor for LocalRegistry {
    fn query(&self, options: &QueryOptions) -> RegistryResult<Vec<Manifest>> {
        let started = Instant::now();
        let Some(target) = options.target()? else {
            info!("local registry: no kind; nothing to look up");
            return Ok(Vec::new());
        };
        debug!(target = %target, ns = ?target.namespace, names = ?options.name_filters, labels = options.label_filters.len(), "local registry: query");
        counter!("registry_queries_total", 1u64, "registry" => "local");

        let snap = self.index.load();
        let Some(raw) = snap.lookup(&target, &options.distinct_names()) else {
            info!(target = %target, "local registry: unknown resource");
            counter!("registry_unknown_resource_total", 1u64, "registry" => "local");
            return Ok(Vec::new());
        };
        let raw_count = raw.len();
        let out = apply_label_filter(raw, &options.label_filters);
        histogram!("registry_query_ms", started.elapsed().as_secs_f64() * 1000.0, "registry" => "local");
        info!(target = %target, raw = raw_count, count = out.len(), "local registry: query ok");
        Ok(out)
    }
}
