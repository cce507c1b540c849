#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use keel_core::{ApiGroup, QueryOptions, SourceKind};
use keel_registry::{ClusterClient, RegistryError, RegistryQueryExecutor, RemoteRegistry, ResourceClient};
use serde_json::{json, Value};

/// In-memory cluster keyed by "group/Kind"; records every call.
#[derive(Default)]
struct FakeCluster {
    types: HashMap<String, Vec<Value>>,
    calls: Mutex<Vec<String>>,
    fail_lists: bool,
    /// Returned by every point lookup regardless of the requested name.
    misdirected: Option<Value>,
}

impl FakeCluster {
    fn with(mut self, group: &str, kind: &str, items: Vec<Value>) -> Self {
        self.types.insert(format!("{}/{}", group, kind), items);
        self
    }
    fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }
}

struct FakeResource<'a> {
    cluster: &'a FakeCluster,
    items: &'a [Value],
}

fn ns_of(v: &Value) -> Option<&str> { v.pointer("/metadata/namespace").and_then(|v| v.as_str()) }

impl ResourceClient for FakeResource<'_> {
    fn get_one(&self, namespace: Option<&str>, name: &str) -> Result<Option<Value>> {
        self.cluster.calls.lock().unwrap().push(format!("get {:?} {}", namespace, name));
        if let Some(v) = &self.cluster.misdirected { return Ok(Some(v.clone())); }
        Ok(self
            .items
            .iter()
            .find(|v| ns_of(v) == namespace && v.pointer("/metadata/name").and_then(|n| n.as_str()) == Some(name))
            .cloned())
    }

    fn find_named(&self, namespace: Option<&str>, name: &str) -> Result<Vec<Value>> {
        if namespace.is_some() {
            return Ok(self.get_one(namespace, name)?.into_iter().collect());
        }
        self.cluster.calls.lock().unwrap().push(format!("find {}", name));
        Ok(self.items.iter().filter(|v| v.pointer("/metadata/name").and_then(|n| n.as_str()) == Some(name)).cloned().collect())
    }

    fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Value>> {
        self.cluster.calls.lock().unwrap().push(format!("list {:?}", namespace));
        if self.cluster.fail_lists { return Err(anyhow!("connection refused")); }
        Ok(self.items.iter().filter(|v| namespace.is_none() || ns_of(v) == namespace).cloned().collect())
    }
}

impl ClusterClient for FakeCluster {
    fn resolve(&self, kind: &str, api_group: &ApiGroup, _version: Option<&str>) -> Option<Box<dyn ResourceClient + '_>> {
        let key = format!("{}/{}", api_group.name().unwrap_or(""), kind);
        self.calls.lock().unwrap().push(format!("resolve {}", key));
        let items = self.types.get(&key)?;
        Some(Box::new(FakeResource { cluster: self, items }))
    }
}

fn pod(ns: &str, name: &str, app: &str) -> Value {
    json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name, "namespace": ns, "labels": {"app": app}}})
}

fn pods() -> FakeCluster {
    FakeCluster::default().with("", "Pod", vec![pod("default", "a", "web"), pod("kube-system", "b", "dns"), pod("default", "c", "web")])
}

fn leaf(kind: &str) -> QueryOptions {
    QueryOptions { api_group: Some(ApiGroup::Core), kind: Some(kind.into()), ..Default::default() }
}

fn names(items: &[keel_core::Manifest]) -> Vec<String> {
    items.iter().filter_map(|m| m.object().name().map(str::to_string)).collect()
}

#[test]
fn lists_and_tags_live_source() {
    let reg = RemoteRegistry::new(pods());
    let out = reg.query(&leaf("Pod")).unwrap();
    assert_eq!(names(&out), vec!["a", "b", "c"]);
    assert!(out.iter().all(|m| m.source().kind == SourceKind::Cluster && m.source().path == "live"));
    assert!(out.iter().all(|m| std::sync::Arc::ptr_eq(m.source(), reg.source())));
}

#[test]
fn one_point_lookup_per_distinct_name() {
    let reg = RemoteRegistry::new(pods());
    let mut q = leaf("Pod");
    q.namespace = Some("default".into());
    q.add_name("a");
    q.add_name("zzz");
    q.add_name("a");
    let out = reg.query(&q).unwrap();
    assert_eq!(names(&out), vec!["a"]);
    let gets: Vec<_> = reg_calls(&reg).into_iter().filter(|c| c.starts_with("get")).collect();
    assert_eq!(gets, vec!["get Some(\"default\") a".to_string(), "get Some(\"default\") zzz".to_string()]);
}

#[test]
fn repeated_names_set_directly_on_options_are_looked_up_once() {
    let reg = RemoteRegistry::new(pods());
    let q = QueryOptions { namespace: Some("default".into()), name_filters: vec!["a".into(), "a".into()], ..leaf("Pod") };
    let out = reg.query(&q).unwrap();
    assert_eq!(names(&out), vec!["a"]);
    let gets: Vec<_> = reg_calls(&reg).into_iter().filter(|c| c.starts_with("get")).collect();
    assert_eq!(gets, vec!["get Some(\"default\") a".to_string()]);
}

#[test]
fn name_lookup_without_namespace_finds_every_namespace() {
    let cluster = FakeCluster::default().with("", "Pod", vec![pod("default", "a", "web"), pod("kube-system", "a", "dns"), pod("default", "c", "web")]);
    let reg = RemoteRegistry::new(cluster);
    let q = QueryOptions { name_filters: vec!["a".into(), "a".into()], ..leaf("Pod") };
    let out = reg.query(&q).unwrap();
    assert_eq!(names(&out), vec!["a", "a"]);
    let namespaces: Vec<_> = out.iter().map(|m| m.object().namespace().unwrap_or_default().to_string()).collect();
    assert_eq!(namespaces, vec!["default", "kube-system"]);
    let lookups: Vec<_> = reg_calls(&reg).into_iter().filter(|c| !c.starts_with("resolve")).collect();
    assert_eq!(lookups, vec!["find a".to_string()]);
}

fn reg_calls(reg: &RemoteRegistry<FakeCluster>) -> Vec<String> { reg_client(reg).calls() }

fn reg_client(reg: &RemoteRegistry<FakeCluster>) -> &FakeCluster { reg.client() }

#[test]
fn mismatched_point_lookup_results_are_dropped() {
    let mut cluster = pods();
    cluster.misdirected = Some(pod("default", "other", "web"));
    let reg = RemoteRegistry::new(cluster);
    let mut q = leaf("Pod");
    q.add_name("a");
    assert!(reg.query(&q).unwrap().is_empty());
}

#[test]
fn labels_filter_client_side() {
    let reg = RemoteRegistry::new(pods());
    let mut q = leaf("Pod");
    q.add_label("app", "web".into());
    assert_eq!(names(&reg.query(&q).unwrap()), vec!["a", "c"]);
}

#[test]
fn unknown_resource_is_empty_and_missing_kind_skips_resolution() {
    let reg = RemoteRegistry::new(pods());
    assert!(reg.query(&leaf("Widget")).unwrap().is_empty());
    let vacuous = QueryOptions { api_group: Some(ApiGroup::Core), ..Default::default() };
    assert!(reg.query(&vacuous).unwrap().is_empty());
    assert_eq!(reg_calls(&reg), vec!["resolve /Widget".to_string()]);
}

#[test]
fn missing_api_group_fails_before_resolution() {
    let reg = RemoteRegistry::new(pods());
    let q = QueryOptions { kind: Some("Pod".into()), ..Default::default() };
    assert!(matches!(reg.query(&q), Err(RegistryError::Configuration(_))));
    assert!(reg_calls(&reg).is_empty());
}

#[test]
fn upstream_errors_propagate() {
    let mut cluster = pods();
    cluster.fail_lists = true;
    let reg = RemoteRegistry::new(cluster);
    let err = reg.query(&leaf("Pod")).unwrap_err();
    assert!(matches!(err, RegistryError::Upstream(_)));
    assert!(err.to_string().contains("connection refused"));
}
