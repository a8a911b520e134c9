//! Known kinds and their strategic merge metadata
//!
//! Strategic merge needs to know, for every list field, which item key
//! identifies an element. The table is keyed by kind and field path, the
//! way the API types tag their lists. Lists missing from the table are
//! atomic: any change replaces them whole. Kinds outside the scheme (custom
//! resources) are patched with a plain JSON merge patch.

use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::BTreeMap;

/// Merge keys of every kind, relative to the object root
const OBJECT_MERGE_KEYS: &[(&str, &str)] = &[("metadata.ownerReferences", "uid")];

/// Merge keys of lists inside a pod spec, relative to the pod spec
///
/// `tolerations`, `hostAliases` and container `args`/`command` are atomic.
const POD_SPEC_MERGE_KEYS: &[(&str, &str)] = &[
    ("containers", "name"),
    ("initContainers", "name"),
    ("ephemeralContainers", "name"),
    ("volumes", "name"),
    ("imagePullSecrets", "name"),
    ("topologySpreadConstraints", "topologyKey"),
    ("containers.env", "name"),
    ("containers.volumeMounts", "mountPath"),
    ("containers.volumeDevices", "devicePath"),
    ("containers.ports", "containerPort"),
    ("initContainers.env", "name"),
    ("initContainers.volumeMounts", "mountPath"),
    ("initContainers.volumeDevices", "devicePath"),
    ("initContainers.ports", "containerPort"),
    ("ephemeralContainers.env", "name"),
    ("ephemeralContainers.volumeMounts", "mountPath"),
    ("ephemeralContainers.volumeDevices", "devicePath"),
];

/// Where each workload kind keeps its pod spec
const POD_SPEC_PATHS: &[(&str, &str)] = &[
    ("Pod", "spec"),
    ("Deployment", "spec.template.spec"),
    ("StatefulSet", "spec.template.spec"),
    ("DaemonSet", "spec.template.spec"),
    ("ReplicaSet", "spec.template.spec"),
    ("Job", "spec.template.spec"),
    ("CronJob", "spec.jobTemplate.spec.template.spec"),
];

/// Merge keys specific to one kind
const KIND_MERGE_KEYS: &[(&str, &str, &str)] = &[("Service", "spec.ports", "port")];

const BUILTIN_KINDS: &[(&str, &str, &str)] = &[
    ("", "v1", "ConfigMap"),
    ("", "v1", "Secret"),
    ("", "v1", "Service"),
    ("", "v1", "ServiceAccount"),
    ("", "v1", "PersistentVolumeClaim"),
    ("", "v1", "Pod"),
    ("apps", "v1", "Deployment"),
    ("apps", "v1", "StatefulSet"),
    ("apps", "v1", "DaemonSet"),
    ("batch", "v1", "Job"),
    ("batch", "v1", "CronJob"),
    ("networking.k8s.io", "v1", "Ingress"),
    ("networking.k8s.io", "v1", "NetworkPolicy"),
    ("autoscaling", "v2", "HorizontalPodAutoscaler"),
    ("autoscaling", "v1", "HorizontalPodAutoscaler"),
    ("policy", "v1", "PodDisruptionBudget"),
    ("rbac.authorization.k8s.io", "v1", "Role"),
    ("rbac.authorization.k8s.io", "v1", "RoleBinding"),
];

/// Join a field onto a dotted path; list positions are not part of paths
pub(crate) fn child_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

/// Merge-key lookup of one kind for strategic merge patches
#[derive(Debug, Clone, Default)]
pub struct PatchMeta {
    merge_keys: BTreeMap<String, String>,
}

impl PatchMeta {
    /// Merge keys of a built-in kind
    ///
    /// Unknown kinds only get the object metadata keys.
    pub fn for_kind(kind: &str) -> Self {
        let mut meta = Self::default();
        for (path, key) in OBJECT_MERGE_KEYS {
            meta = meta.with_merge_key(path, key);
        }
        if let Some((_, pod_spec)) = POD_SPEC_PATHS.iter().find(|(k, _)| *k == kind) {
            for (path, key) in POD_SPEC_MERGE_KEYS {
                meta = meta.with_merge_key(&child_path(pod_spec, path), key);
            }
        }
        for (_, path, key) in KIND_MERGE_KEYS.iter().filter(|(k, _, _)| *k == kind) {
            meta = meta.with_merge_key(path, key);
        }
        meta
    }

    /// Register (or replace) the merge key of the list at `path`
    pub fn with_merge_key(mut self, path: &str, key: &str) -> Self {
        self.merge_keys.insert(path.to_string(), key.to_string());
        self
    }

    /// The merge key of the list at `path`
    ///
    /// Lists without a registered key, or whose items are not objects, are
    /// replaced wholesale.
    pub fn merge_key<'a, I>(&self, path: &str, items: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let key = self.merge_keys.get(path)?;
        items.into_iter().all(Value::is_object).then_some(key.as_str())
    }
}

/// The set of kinds that are patched strategically
#[derive(Debug, Clone)]
pub struct Scheme {
    kinds: BTreeMap<(String, String, String), PatchMeta>,
}

impl Default for Scheme {
    /// Built-in Kubernetes kinds the operator manages
    fn default() -> Self {
        let mut scheme = Self::empty();
        for (group, version, kind) in BUILTIN_KINDS {
            scheme.register(&GroupVersionKind::gvk(group, version, kind));
        }
        scheme
    }
}

impl Scheme {
    /// A scheme that knows no kinds; every patch falls back to JSON merge
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, gvk: &GroupVersionKind) {
        self.register_with(gvk, PatchMeta::for_kind(&gvk.kind));
    }

    /// Register a kind with its own merge keys
    pub fn register_with(&mut self, gvk: &GroupVersionKind, patch_meta: PatchMeta) {
        self.kinds.insert(
            (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone()),
            patch_meta,
        );
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.patch_meta(gvk).is_some()
    }

    /// Patch metadata for a registered kind
    pub fn patch_meta(&self, gvk: &GroupVersionKind) -> Option<&PatchMeta> {
        self.kinds
            .get(&(gvk.group.clone(), gvk.version.clone(), gvk.kind.clone()))
    }
}
