//! In-memory object client for testing
//!
//! Behaves like a minimal API server: it assigns uid, resourceVersion and
//! generation, applies strategic and JSON merge patches, and bumps
//! resourceVersion only when a patch changes something. Generation follows
//! changes outside `metadata` and `status`.

use async_trait::async_trait;
use gitlab_operator_core::ObjectExt;
use gitlab_operator_core::objects::{GroupVersionResource, split_api_version};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::error::ErrorResponse;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::client::{ObjectClient, ObjectPatch, PatchKind};
use crate::error::{KubeError, Result};
use crate::patch::{apply_json_merge_patch, apply_strategic_merge_patch};
use crate::scheme::PatchMeta;

/// Resources served by a new mock
const BUILTIN_RESOURCES: &[(&str, &str, &str, &str)] = &[
    ("", "v1", "configmaps", "ConfigMap"),
    ("", "v1", "secrets", "Secret"),
    ("", "v1", "services", "Service"),
    ("", "v1", "serviceaccounts", "ServiceAccount"),
    ("", "v1", "persistentvolumeclaims", "PersistentVolumeClaim"),
    ("apps", "v1", "deployments", "Deployment"),
    ("apps", "v1", "statefulsets", "StatefulSet"),
    ("batch", "v1", "jobs", "Job"),
    ("batch", "v1", "cronjobs", "CronJob"),
    ("networking.k8s.io", "v1", "ingresses", "Ingress"),
    ("networking.k8s.io", "v1", "networkpolicies", "NetworkPolicy"),
    ("autoscaling", "v2", "horizontalpodautoscalers", "HorizontalPodAutoscaler"),
];

/// Identity of a stored object; the version is not part of it
type ObjectKey = (String, String, String, String);

fn key_for(group: &str, kind: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        group.to_string(),
        kind.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub patches: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    resources: Vec<(GroupVersionResource, GroupVersionKind)>,
    failing_lists: BTreeSet<GroupVersionResource>,
    next_uid: u64,
    next_resource_version: u64,
}

/// In-memory [`ObjectClient`]
#[derive(Clone)]
pub struct MockObjectClient {
    state: Arc<RwLock<State>>,
    operations: Arc<RwLock<OperationCounts>>,
}

impl Default for MockObjectClient {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error(code: u16, reason: &str, message: String) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

impl MockObjectClient {
    /// A mock serving the built-in resources with no objects
    pub fn new() -> Self {
        let state = State {
            resources: BUILTIN_RESOURCES
                .iter()
                .map(|(group, version, resource, kind)| {
                    (
                        GroupVersionResource::new(group, version, resource),
                        GroupVersionKind::gvk(group, version, kind),
                    )
                })
                .collect(),
            next_uid: 1,
            next_resource_version: 1,
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
        }
    }

    /// Serve an additional resource type
    pub fn with_resource(self, gvr: GroupVersionResource, kind: &str) -> Self {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, kind);
            state.resources.push((gvr, gvk));
        }
        self
    }

    /// Make every list of `gvr` fail with a server error
    pub fn fail_list(&self, gvr: GroupVersionResource) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.failing_lists.insert(gvr);
    }

    /// Store objects as-is, bypassing create
    pub fn insert(&self, objects: impl IntoIterator<Item = DynamicObject>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for object in objects {
            let gvk = object.gvk();
            let key = key_for(
                &gvk.group,
                &gvk.kind,
                object.metadata.namespace.as_deref(),
                object.metadata.name.as_deref().unwrap_or_default(),
            );
            state.objects.insert(key, object);
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        let mut operations = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        *operations = OperationCounts::default();
    }

    /// All stored objects, ordered by group, kind, namespace and name
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .objects
            .values()
            .cloned()
            .collect()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        let mut counts = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *counts);
    }
}

impl State {
    fn next_resource_version(&mut self) -> String {
        let version = self.next_resource_version;
        self.next_resource_version += 1;
        version.to_string()
    }
}

/// Everything that counts as a change for the generation
fn generation_fields(object: &Value) -> Value {
    match object {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "metadata" | "status"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[async_trait]
impl ObjectClient for MockObjectClient {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.count(|c| c.gets += 1);
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .objects
            .get(&key_for(&gvk.group, &gvk.kind, namespace, name))
            .cloned())
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject> {
        self.count(|c| c.creates += 1);
        object.validate()?;

        let gvk = object.gvk();
        let name = object.metadata.name.as_deref().unwrap_or_default();
        let key = key_for(&gvk.group, &gvk.kind, object.metadata.namespace.as_deref(), name);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", gvk.kind, name),
            ));
        }

        let mut created = object.clone();
        created.metadata.uid = Some(format!("uid-{}", state.next_uid));
        state.next_uid += 1;
        created.metadata.resource_version = Some(state.next_resource_version());
        created.metadata.generation = Some(1);
        created.metadata.creation_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));

        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn patch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<DynamicObject> {
        self.count(|c| c.patches += 1);
        let key = key_for(&gvk.group, &gvk.kind, namespace, name);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = state.objects.get(&key) else {
            return Err(api_error(
                404,
                "NotFound",
                format!("{} \"{}\" not found", gvk.kind, name),
            ));
        };

        let before = serde_json::to_value(stored)?;
        let after = match patch.kind {
            PatchKind::Strategic => {
                apply_strategic_merge_patch(&before, &patch.data, &PatchMeta::for_kind(&gvk.kind))
            }
            PatchKind::Merge => apply_json_merge_patch(&before, &patch.data),
        };
        if after == before {
            return Ok(stored.clone());
        }

        let mut patched: DynamicObject = serde_json::from_value(after.clone())?;
        let generation = stored.metadata.generation.unwrap_or(1);
        let spec_changed = generation_fields(&after) != generation_fields(&before);
        patched.metadata.generation = Some(if spec_changed { generation + 1 } else { generation });
        patched.metadata.resource_version = Some(state.next_resource_version());

        state.objects.insert(key, patched.clone());
        Ok(patched)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        self.count(|c| c.deletes += 1);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .objects
            .remove(&key_for(&gvk.group, &gvk.kind, namespace, name))
            .is_some())
    }

    fn kind_for(&self, gvr: &GroupVersionResource) -> Option<GroupVersionKind> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .resources
            .iter()
            .find(|(r, _)| r == gvr)
            .map(|(_, k)| k.clone())
    }

    async fn list_metadata(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>> {
        self.count(|c| c.lists += 1);
        let kind = self.kind_for(gvr).ok_or_else(|| {
            api_error(
                404,
                "NotFound",
                format!("the server could not find the requested resource {}", gvr),
            )
        })?;

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.failing_lists.contains(gvr) {
            return Err(api_error(500, "InternalError", format!("listing {} failed", gvr)));
        }

        // metadata-only items carry no type information
        Ok(state
            .objects
            .values()
            .filter(|o| {
                let (group, version) = split_api_version(o.api_version());
                group == kind.group
                    && version == kind.version
                    && o.kind() == kind.kind
                    && o.metadata.namespace.as_deref().unwrap_or_default() == namespace
            })
            .map(|o| DynamicObject {
                types: None,
                metadata: o.metadata.clone(),
                data: Value::Object(Default::default()),
            })
            .collect())
    }

    async fn preferred_resources(&self) -> Result<Vec<GroupVersionResource>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.resources.iter().map(|(r, _)| r.clone()).collect())
    }
}
