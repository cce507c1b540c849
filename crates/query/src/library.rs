//! Built-in shortcut vocabulary: pod specs, container specs and secrets.

use anyhow::{anyhow, Result};
use keel_core::views::{container_name, PodSpecView, SealedSecretView, WorkloadView};
use keel_core::{Manifest, ResourceObject};
use serde_json::{json, Map, Value};

use crate::ast::{api_group, api_version, filter, first, shortcut, transform, transform_many, union};
use crate::shortcut::ShortcutRegistry;

const NO_ARGS: [&str; 0] = [];

pub fn setup(registry: &mut ShortcutRegistry) {
    registry
        .setup("DeploymentPodSpec", || transform(api_version("apps/v1").kind("Deployment")).to(workload_pod_spec))
        .setup("StatefulSetPodSpec", || transform(api_version("apps/v1").kind("StatefulSet")).to(workload_pod_spec))
        .setup("DaemonSetPodSpec", || transform(api_version("apps/v1").kind("DaemonSet")).to(workload_pod_spec))
        .setup("JobPodSpec", || {
            // Jobs spawned by a CronJob are covered by CronJobPodSpec.
            transform(filter(api_group("batch").kind("Job")).criteria(|m| Ok(WorkloadView::of(m.object()).is_some_and(|v| !v.has_owner()))))
                .to(workload_pod_spec)
        })
        .setup("CronJobPodSpec", || transform(api_group("batch").kind("CronJob")).to(workload_pod_spec))
        .setup("PodSpec", || {
            union([
                shortcut("DeploymentPodSpec", NO_ARGS),
                shortcut("StatefulSetPodSpec", NO_ARGS),
                shortcut("DaemonSetPodSpec", NO_ARGS),
                shortcut("JobPodSpec", NO_ARGS),
                shortcut("CronJobPodSpec", NO_ARGS),
            ])
        })
        .setup("ContainerSpec", || transform_many(shortcut("PodSpec", NO_ARGS)).to(container_specs))
        .setup_with("Secret", 1, |args| {
            first([
                api_version("v1").kind("Secret").name(&args[0]).build(),
                transform(api_group("bitnami.com").kind("SealedSecret").name(&args[0])).to(sealed_secret_as_secret),
            ])
        });
}

fn document(kind: &str, metadata: Map<String, Value>) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("apiVersion".into(), json!("v1"));
    doc.insert("kind".into(), json!(kind));
    doc.insert("metadata".into(), Value::Object(metadata));
    doc
}

/// `<Kind>-<name>` PodSpec carrying the pod template metadata and the workload's namespace.
fn workload_pod_spec(item: &Manifest) -> Result<ResourceObject> {
    let view = WorkloadView::of(item.object()).ok_or_else(|| anyhow!("{} has no pod template", item.id()))?;
    let mut metadata = view.template_metadata().cloned().unwrap_or_default();
    metadata.insert("name".into(), json!(format!("{}-{}", view.kind().as_str(), view.name().unwrap_or_default())));
    if let Some(ns) = view.namespace() {
        metadata.insert("namespace".into(), json!(ns));
    }
    let mut doc = document("PodSpec", metadata);
    if let Some(spec) = view.pod_spec() {
        doc.insert("spec".into(), spec.clone());
    }
    Ok(ResourceObject::from(doc))
}

fn container_specs(item: &Manifest) -> Result<Vec<ResourceObject>> {
    let pod = PodSpecView::of(item.object());
    let pod_name = item.object().name().unwrap_or_default();
    let base = item.object().metadata().cloned().unwrap_or_default();
    let mut out = Vec::new();
    for (tag, containers) in [("Cont", pod.containers()), ("InitCont", pod.init_containers())] {
        for c in containers.unwrap_or_default() {
            let mut metadata = base.clone();
            metadata.insert("name".into(), json!(format!("{}-{}-{}", pod_name, tag, container_name(c).unwrap_or_default())));
            let mut doc = document("ContainerSpec", metadata);
            doc.insert("spec".into(), c.clone());
            out.push(ResourceObject::from(doc));
        }
    }
    Ok(out)
}

fn sealed_secret_as_secret(item: &Manifest) -> Result<ResourceObject> {
    let sealed = SealedSecretView::of(item.object());
    let mut doc = document("Secret", sealed.metadata().cloned().unwrap_or_default());
    doc.insert("data".into(), Value::Object(sealed.encrypted_data().cloned().unwrap_or_default()));
    Ok(ResourceObject::from(doc))
}
