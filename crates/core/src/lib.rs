//! Keel core types: resource documents, provenance, and leaf query options.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod options;
pub mod views;

pub use options::{ApiGroup, ConfigurationError, LabelFilters, LabelMatcher, QueryOptions, QueryTarget};

pub mod prelude {
    pub use super::{
        ApiGroup, ConfigurationError, LabelFilters, LabelMatcher, Manifest, ManifestId, ManifestSource,
        QueryOptions, QueryTarget, ResourceObject, SourceKind,
    };
}

/// Returned when a document is not shaped like a Kubernetes object.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("resource document must be a JSON object, got {0}")]
pub struct NotAnObject(&'static str);

/// Immutable Kubernetes-style document (`apiVersion`, `kind`, `metadata`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ResourceObject(Map<String, Value>);

impl ResourceObject {
    pub fn api_version(&self) -> Option<&str> { self.0.get("apiVersion").and_then(|v| v.as_str()) }
    pub fn kind(&self) -> Option<&str> { self.0.get("kind").and_then(|v| v.as_str()) }

    /// API group encoded in `apiVersion`; `None` for the core group.
    pub fn api_group(&self) -> Option<&str> {
        self.api_version().and_then(|av| av.rsplit_once('/')).map(|(g, _)| g)
    }

    /// Version part of `apiVersion` (`apps/v1` -> `v1`, `v1` -> `v1`).
    pub fn version(&self) -> Option<&str> {
        self.api_version().map(|av| av.rsplit_once('/').map(|(_, v)| v).unwrap_or(av))
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> { self.0.get("metadata").and_then(|v| v.as_object()) }
    pub fn name(&self) -> Option<&str> { self.metadata().and_then(|m| m.get("name")).and_then(|v| v.as_str()) }
    pub fn namespace(&self) -> Option<&str> { self.metadata().and_then(|m| m.get("namespace")).and_then(|v| v.as_str()) }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(key))
            .and_then(|v| v.as_str())
    }

    /// String-valued labels; non-string values are skipped.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.as_object())
            .into_iter()
            .flat_map(|l| l.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s))))
    }

    pub fn owner_references(&self) -> Option<&[Value]> {
        self.metadata()
            .and_then(|m| m.get("ownerReferences"))
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
    }

    pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }

    /// JSON pointer lookup relative to the document root, e.g. `/spec/template`.
    pub fn pointer(&self, ptr: &str) -> Option<&Value> {
        let rest = ptr.strip_prefix('/')?;
        let (head, tail) = match rest.split_once('/') {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };
        let root = self.0.get(head)?;
        match tail {
            Some(t) => root.pointer(&format!("/{}", t)),
            None => Some(root),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> { &self.0 }
    pub fn into_value(self) -> Value { Value::Object(self.0) }
}

impl TryFrom<Value> for ResourceObject {
    type Error = NotAnObject;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(NotAnObject("null")),
            Value::Bool(_) => Err(NotAnObject("a boolean")),
            Value::Number(_) => Err(NotAnObject("a number")),
            Value::String(_) => Err(NotAnObject("a string")),
            Value::Array(_) => Err(NotAnObject("an array")),
        }
    }
}

impl From<Map<String, Value>> for ResourceObject {
    fn from(map: Map<String, Value>) -> Self { Self(map) }
}

impl From<ResourceObject> for Value {
    fn from(o: ResourceObject) -> Self { o.into_value() }
}

/// Where a set of manifests came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Cluster,
    File,
    Inline,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Cluster => "cluster",
            SourceKind::File => "file",
            SourceKind::Inline => "inline",
        };
        f.write_str(s)
    }
}

/// Origin descriptor plus ingest diagnostics. Built once, then shared via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSource {
    pub kind: SourceKind,
    pub path: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ManifestSource {
    pub fn new(kind: SourceKind, path: impl Into<String>) -> Self {
        Self { kind, path: path.into(), success: true, errors: Vec::new(), warnings: Vec::new() }
    }

    /// Source used by registries backed by a live cluster.
    pub fn live_cluster() -> Self { Self::new(SourceKind::Cluster, "live") }
}

/// Identity of a manifest within an evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ManifestId {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub source: SourceKind,
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let av = self.api_version.as_deref().unwrap_or("?");
        let kind = self.kind.as_deref().unwrap_or("?");
        let name = self.name.as_deref().unwrap_or("?");
        match self.namespace.as_deref() {
            Some(ns) => write!(f, "{}/{} {}/{} ({})", av, kind, ns, name, self.source),
            None => write!(f, "{}/{} {} ({})", av, kind, name, self.source),
        }
    }
}

/// A resource document paired with its provenance.
#[derive(Debug, Clone)]
pub struct Manifest {
    object: Arc<ResourceObject>,
    source: Arc<ManifestSource>,
    synthetic: bool,
}

impl Manifest {
    pub fn new(object: ResourceObject, source: Arc<ManifestSource>) -> Self {
        Self { object: Arc::new(object), source, synthetic: false }
    }

    /// Manifest derived from `origin`; it shares the origin's source.
    pub fn derived(object: ResourceObject, origin: &Manifest) -> Self {
        Self { object: Arc::new(object), source: Arc::clone(&origin.source), synthetic: true }
    }

    pub fn object(&self) -> &ResourceObject { &self.object }
    pub fn source(&self) -> &Arc<ManifestSource> { &self.source }
    pub fn is_synthetic(&self) -> bool { self.synthetic }

    pub fn id(&self) -> ManifestId {
        ManifestId {
            api_version: self.object.api_version().map(str::to_string),
            kind: self.object.kind().map(str::to_string),
            namespace: self.object.namespace().map(str::to_string),
            name: self.object.name().map(str::to_string),
            source: self.source.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> ResourceObject { ResourceObject::try_from(v).unwrap() }

    #[test]
    fn api_version_splits_group_and_version() {
        let d = obj(json!({"apiVersion": "apps/v1", "kind": "Deployment"}));
        assert_eq!(d.api_group(), Some("apps"));
        assert_eq!(d.version(), Some("v1"));
        let s = obj(json!({"apiVersion": "v1", "kind": "Secret"}));
        assert_eq!(s.api_group(), None);
        assert_eq!(s.version(), Some("v1"));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(ResourceObject::try_from(json!([1, 2])).is_err());
        assert!(ResourceObject::try_from(Value::Null).is_err());
    }

    #[test]
    fn labels_skip_non_string_values() {
        let d = obj(json!({"metadata": {"labels": {"app": "web", "n": 3}}}));
        let labels: Vec<_> = d.labels().collect();
        assert_eq!(labels, vec![("app", "web")]);
        assert_eq!(d.label("app"), Some("web"));
        assert_eq!(d.label("n"), None);
    }

    #[test]
    fn pointer_reads_nested_fields() {
        let d = obj(json!({"spec": {"template": {"spec": {"containers": [{"name": "app"}]}}}}));
        assert_eq!(d.pointer("/spec/template/spec/containers/0/name"), Some(&json!("app")));
        assert_eq!(d.pointer("/spec/missing"), None);
        assert!(d.pointer("/spec").is_some());
    }

    #[test]
    fn identity_includes_source_kind() {
        let o = obj(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a", "namespace": "ns"}}));
        let file = Manifest::new(o.clone(), Arc::new(ManifestSource::new(SourceKind::File, "a.yaml")));
        let live = Manifest::new(o, Arc::new(ManifestSource::live_cluster()));
        assert_ne!(file.id(), live.id());
        assert_eq!(file.id().to_string(), "v1/ConfigMap ns/a (file)");
    }

    #[test]
    fn derived_manifest_shares_origin_source() {
        let o = obj(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}}));
        let origin = Manifest::new(o.clone(), Arc::new(ManifestSource::live_cluster()));
        let d = Manifest::derived(o, &origin);
        assert!(d.is_synthetic());
        assert!(Arc::ptr_eq(d.source(), origin.source()));
    }
}
