//! Keel kubehub: kube-rs backed cluster client for the live registry.
//!
//! The registry contract is synchronous, so the client owns a current-thread
//! tokio runtime and blocks on each API call.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use keel_core::ApiGroup;
use keel_registry::{ClusterClient, ResourceClient};
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{ApiCapabilities, Discovery, Scope},
    Client, Config,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Page size for list requests.
const PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespaced: bool,
}

impl DiscoveredResource {
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Live cluster connection with a discovery snapshot taken at connect time.
pub struct KubeClusterClient {
    rt: Runtime,
    client: Client,
    discovery: Discovery,
}

impl KubeClusterClient {
    /// Connect using the default kubeconfig/in-cluster config, or a named kubeconfig context.
    pub fn connect(context: Option<&str>) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("building tokio runtime")?;
        let t0 = Instant::now();
        let (client, discovery) = rt.block_on(async {
            let client = match context {
                Some(ctx) => {
                    let kubeconfig = Kubeconfig::read().context("reading kubeconfig")?;
                    let opts = KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
                    let config = Config::from_custom_kubeconfig(kubeconfig, &opts)
                        .await
                        .with_context(|| format!("loading kubeconfig context {}", ctx))?;
                    Client::try_from(config)?
                }
                None => Client::try_default().await.context("connecting with default kube config")?,
            };
            let discovery = Discovery::new(client.clone()).run().await.context("running API discovery")?;
            Ok::<_, anyhow::Error>((client, discovery))
        })?;
        let groups = discovery.groups().count();
        info!(context = ?context, groups, took_ms = %t0.elapsed().as_millis(), "kube: connected");
        Ok(Self { rt, client, discovery })
    }

    /// Served resources (incl. CRDs) at their recommended versions, sorted by group/version/kind.
    pub fn resources(&self) -> Vec<DiscoveredResource> {
        let mut out = Vec::new();
        for group in self.discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                out.push(DiscoveredResource {
                    group: ar.group.clone(),
                    version: ar.version.clone(),
                    kind: ar.kind.clone(),
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                });
            }
        }
        out.sort_by(|a, b| a.group.cmp(&b.group).then(a.version.cmp(&b.version)).then(a.kind.cmp(&b.kind)));
        out
    }

    fn find(&self, kind: &str, group: &str, version: Option<&str>) -> Option<(ApiResource, ApiCapabilities)> {
        match version {
            Some(v) => self.discovery.resolve_gvk(&GroupVersionKind::gvk(group, v, kind)),
            None => self.discovery.get(group).and_then(|g| g.recommended_kind(kind)),
        }
    }
}

impl ClusterClient for KubeClusterClient {
    fn resolve(&self, kind: &str, api_group: &ApiGroup, version: Option<&str>) -> Option<Box<dyn ResourceClient + '_>> {
        let group = api_group.name().unwrap_or("");
        let (ar, caps) = self.find(kind, group, version)?;
        let namespaced = matches!(caps.scope, Scope::Namespaced);
        debug!(group, version = %ar.version, kind, namespaced, "kube: resolved resource");
        Some(Box::new(KubeResource { owner: self, ar, namespaced }))
    }
}

struct KubeResource<'a> {
    owner: &'a KubeClusterClient,
    ar: ApiResource,
    namespaced: bool,
}

/// How a point lookup by name reaches the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointLookup<'a> {
    /// `GET` in one namespace, or of a cluster-scoped object.
    Get(Option<&'a str>),
    /// Namespaced type without a namespace: list across namespaces filtered by `metadata.name`.
    AcrossNamespaces,
}

fn point_lookup(namespaced: bool, namespace: Option<&str>) -> PointLookup<'_> {
    match (namespaced, namespace) {
        (false, _) => PointLookup::Get(None),
        (true, Some(ns)) => PointLookup::Get(Some(ns)),
        (true, None) => PointLookup::AcrossNamespaces,
    }
}

fn name_selector(name: &str) -> String { format!("metadata.name={}", name) }

impl KubeResource<'_> {
    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let client = self.owner.client.clone();
        match namespace {
            Some(ns) if self.namespaced => Api::namespaced_with(client, ns, &self.ar),
            _ => Api::all_with(client, &self.ar),
        }
    }

    fn to_value(&self, obj: DynamicObject) -> Result<Value> {
        let mut raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
        fill_type_meta(&mut raw, &self.ar);
        strip_managed_fields(&mut raw);
        Ok(raw)
    }

    fn list_pages(&self, namespace: Option<&str>, base: ListParams) -> Result<Vec<Value>> {
        let api = self.api(namespace);
        let mut out = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut lp = base.clone().limit(PAGE_SIZE);
            if let Some(token) = continue_token.as_deref() {
                lp = lp.continue_token(token);
            }
            counter!("kube_requests_total", 1u64, "verb" => "list");
            let page = self
                .owner
                .rt
                .block_on(api.list(&lp))
                .with_context(|| format!("listing {} in {}", self.ar.kind, namespace.unwrap_or("all namespaces")))?;
            continue_token = page.metadata.continue_.clone().filter(|t| !t.is_empty());
            for o in page.items {
                out.push(self.to_value(o)?);
            }
            if continue_token.is_none() { break; }
        }
        Ok(out)
    }
}

impl ResourceClient for KubeResource<'_> {
    fn get_one(&self, namespace: Option<&str>, name: &str) -> Result<Option<Value>> {
        Ok(self.find_named(namespace, name)?.into_iter().next())
    }

    fn find_named(&self, namespace: Option<&str>, name: &str) -> Result<Vec<Value>> {
        match point_lookup(self.namespaced, namespace) {
            PointLookup::Get(ns) => {
                let api = self.api(ns);
                counter!("kube_requests_total", 1u64, "verb" => "get");
                let found = self
                    .owner
                    .rt
                    .block_on(api.get_opt(name))
                    .with_context(|| format!("getting {} {}", self.ar.kind, name))?;
                Ok(found.map(|o| self.to_value(o)).transpose()?.into_iter().collect())
            }
            PointLookup::AcrossNamespaces => {
                let found = self.list_pages(None, ListParams::default().fields(&name_selector(name)))?;
                debug!(kind = %self.ar.kind, name, count = found.len(), "kube: name lookup across namespaces");
                Ok(found)
            }
        }
    }

    fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Value>> {
        let out = self.list_pages(namespace, ListParams::default())?;
        debug!(kind = %self.ar.kind, ns = ?namespace, count = out.len(), "kube: list done");
        Ok(out)
    }
}

/// List items come back without `apiVersion`/`kind`; restore them from the resolved resource.
fn fill_type_meta(v: &mut Value, ar: &ApiResource) {
    if let Some(obj) = v.as_object_mut() {
        if !obj.get("apiVersion").map(|x| x.is_string()).unwrap_or(false) {
            obj.insert("apiVersion".into(), Value::String(ar.api_version.clone()));
        }
        if !obj.get("kind").map(|x| x.is_string()).unwrap_or(false) {
            obj.insert("kind".into(), Value::String(ar.kind.clone()));
        }
    }
}

fn strip_managed_fields(v: &mut Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

/// Parse `v1/Kind` or `group/v1/Kind`.
pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind::gvk("", version, kind)),
        [group, version, kind] => Ok(GroupVersionKind::gvk(group, version, kind)),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}
