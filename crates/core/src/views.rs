//! Partial structural views over resource documents.
//!
//! Each view exposes only the fields a query reads for one family of kinds.
//! Accessors return `None` when the field is absent instead of guessing.

use serde_json::{Map, Value};

use crate::ResourceObject;

/// Workload kinds that carry a pod template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(WorkloadKind::Deployment),
            "StatefulSet" => Some(WorkloadKind::StatefulSet),
            "DaemonSet" => Some(WorkloadKind::DaemonSet),
            "Job" => Some(WorkloadKind::Job),
            "CronJob" => Some(WorkloadKind::CronJob),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
        }
    }

    fn template_pointer(&self) -> &'static str {
        match self {
            WorkloadKind::CronJob => "/spec/jobTemplate/spec/template",
            _ => "/spec/template",
        }
    }
}

/// Pod template of a workload object.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadView<'a> {
    object: &'a ResourceObject,
    kind: WorkloadKind,
}

impl<'a> WorkloadView<'a> {
    /// `None` when the object's kind is not a known workload.
    pub fn of(object: &'a ResourceObject) -> Option<Self> {
        let kind = WorkloadKind::from_kind(object.kind()?)?;
        Some(Self { object, kind })
    }

    pub fn kind(&self) -> WorkloadKind { self.kind }
    pub fn name(&self) -> Option<&'a str> { self.object.name() }
    pub fn namespace(&self) -> Option<&'a str> { self.object.namespace() }

    pub fn pod_template(&self) -> Option<&'a Value> { self.object.pointer(self.kind.template_pointer()) }

    pub fn template_metadata(&self) -> Option<&'a Map<String, Value>> {
        self.pod_template().and_then(|t| t.get("metadata")).and_then(|m| m.as_object())
    }

    pub fn pod_spec(&self) -> Option<&'a Value> { self.pod_template().and_then(|t| t.get("spec")) }

    /// True when the object is owned by another (e.g. a Job created by a CronJob).
    pub fn has_owner(&self) -> bool { self.object.owner_references().is_some() }
}

/// Containers of a pod spec (the `spec` of a PodSpec document).
#[derive(Debug, Clone, Copy)]
pub struct PodSpecView<'a> {
    spec: Option<&'a Value>,
}

impl<'a> PodSpecView<'a> {
    pub fn of(object: &'a ResourceObject) -> Self { Self { spec: object.get("spec") } }

    pub fn containers(&self) -> Option<&'a [Value]> { self.array("containers") }
    pub fn init_containers(&self) -> Option<&'a [Value]> { self.array("initContainers") }

    fn array(&self, key: &str) -> Option<&'a [Value]> {
        self.spec.and_then(|s| s.get(key)).and_then(|v| v.as_array()).map(|v| v.as_slice())
    }
}

/// Container name, if set.
pub fn container_name(container: &Value) -> Option<&str> { container.get("name").and_then(|v| v.as_str()) }

/// Bitnami SealedSecret.
#[derive(Debug, Clone, Copy)]
pub struct SealedSecretView<'a> {
    object: &'a ResourceObject,
}

impl<'a> SealedSecretView<'a> {
    pub fn of(object: &'a ResourceObject) -> Self { Self { object } }

    pub fn metadata(&self) -> Option<&'a Map<String, Value>> { self.object.metadata() }

    pub fn encrypted_data(&self) -> Option<&'a Map<String, Value>> {
        self.object.pointer("/spec/encryptedData").and_then(|v| v.as_object())
    }
}
