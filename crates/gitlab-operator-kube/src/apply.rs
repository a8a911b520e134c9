//! Client-side apply
//!
//! [`Applier::apply`] creates or patches an object the way `kubectl apply`
//! does. The configuration used for every create or update is stored in the
//! `kubectl.kubernetes.io/last-applied-configuration` annotation and serves
//! as the original side of the next three-way patch.

use gitlab_operator_core::ObjectExt;
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::client::{ObjectClient, ObjectPatch, PatchKind};
use crate::error::{KubeError, Result};
use crate::patch::{is_empty_patch, three_way_json_merge_patch, three_way_strategic_merge_patch};
use crate::scheme::Scheme;

/// Annotation holding the last applied configuration
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// What [`Applier::apply`] did to the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Unchanged,
    Created,
    Updated,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
        })
    }
}

/// Builder for [`Applier`]
pub struct ApplierBuilder {
    client: Option<Arc<dyn ObjectClient>>,
    overwrite: bool,
    scheme: Scheme,
}

impl Default for ApplierBuilder {
    fn default() -> Self {
        Self {
            client: None,
            overwrite: true,
            scheme: Scheme::default(),
        }
    }
}

impl ApplierBuilder {
    pub fn client<C: ObjectClient + 'static>(mut self, client: C) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Resolve conflicts with server-side changes in favour of the applied
    /// configuration (default: true)
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Kinds that are patched strategically (default: built-in kinds)
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn build(self) -> Result<Applier> {
        let client = self
            .client
            .ok_or_else(|| KubeError::InvalidConfig("missing client interface".to_string()))?;
        Ok(Applier {
            client,
            overwrite: self.overwrite,
            scheme: self.scheme,
        })
    }
}

/// Creates or patches objects with a three-way merge
pub struct Applier {
    client: Arc<dyn ObjectClient>,
    overwrite: bool,
    scheme: Scheme,
}

impl Applier {
    pub fn builder() -> ApplierBuilder {
        ApplierBuilder::default()
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    /// Create the object, or patch it when it exists
    pub async fn apply(&self, object: &DynamicObject) -> Result<ApplyOutcome> {
        object.validate()?;

        let shown = object.display_name();
        let gvk = object.gvk();
        let namespace = object.metadata.namespace.as_deref();
        let name = object.name_any();

        debug!(object = %shown, "applying object");

        let annotated = with_last_applied(object)
            .map_err(|e| e.for_object("failed to get modified configuration", &shown))?;

        let current = self
            .client
            .get(&gvk, namespace, &name)
            .await
            .map_err(|e| e.for_object("failed to obtain current configuration", &shown))?;

        let Some(current) = current else {
            debug!(object = %shown, "object does not exist, creating it");
            self.client
                .create(&annotated)
                .await
                .map_err(|e| e.for_object("failed to create object", &shown))?;
            return Ok(ApplyOutcome::Created);
        };

        debug!(object = %shown, "object exists, patching it");
        let patch = self
            .calculate_patch(&annotated, &current)
            .map_err(|e| e.for_object("failed to calculate patch", &shown))?;

        if is_empty_patch(&patch.data) {
            debug!(object = %shown, "object is not modified");
            return Ok(ApplyOutcome::Unchanged);
        }

        let last_resource_version = current.metadata.resource_version.clone();
        let patched = self
            .client
            .patch(&gvk, namespace, &name, &patch)
            .await
            .map_err(|e| e.for_object("failed to patch object", &shown))?;

        if patched.metadata.resource_version != last_resource_version {
            debug!(object = %shown, "object is patched");
            Ok(ApplyOutcome::Updated)
        } else {
            Ok(ApplyOutcome::Unchanged)
        }
    }

    fn calculate_patch(&self, modified: &DynamicObject, current: &DynamicObject) -> Result<ObjectPatch> {
        let original = original_configuration(current)?;
        let modified_json = serde_json::to_value(modified)?;
        let current_json = serde_json::to_value(current)?;

        match self.scheme.patch_meta(&modified.gvk()) {
            Some(meta) => Ok(ObjectPatch {
                kind: PatchKind::Strategic,
                data: three_way_strategic_merge_patch(
                    original.as_ref(),
                    &modified_json,
                    &current_json,
                    meta,
                    self.overwrite,
                )?,
            }),
            None => {
                debug!(kind = %modified.kind(), "object kind is not registered, using merge patch");
                Ok(ObjectPatch {
                    kind: PatchKind::Merge,
                    data: three_way_json_merge_patch(original.as_ref(), &modified_json, &current_json)?,
                })
            }
        }
    }
}

/// The object with its own configuration stored in the last-applied
/// annotation
///
/// The stored configuration never contains the annotation itself.
pub fn with_last_applied(object: &DynamicObject) -> Result<DynamicObject> {
    let mut bare = object.clone();
    if let Some(annotations) = bare.metadata.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
        if annotations.is_empty() {
            bare.metadata.annotations = None;
        }
    }

    let configuration = serde_json::to_string(&bare)?;
    let mut annotated = bare;
    annotated
        .annotations_mut()
        .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), configuration);
    Ok(annotated)
}

/// The configuration stored in the last-applied annotation, if any
pub fn original_configuration(object: &DynamicObject) -> Result<Option<Value>> {
    match object.annotations().get(LAST_APPLIED_CONFIG_ANNOTATION) {
        Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(raw)?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObjectClient;
    use serde_json::json;

    fn config_map(data: Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "tests"},
            "data": data
        }))
        .unwrap()
    }

    #[test]
    fn test_builder_requires_client() {
        let err = Applier::builder().build().err().unwrap();
        assert_eq!(err.to_string(), "missing client interface");
    }

    #[test]
    fn test_last_applied_excludes_itself() {
        let annotated = with_last_applied(&config_map(json!({"a": "1"}))).unwrap();
        let reannotated = with_last_applied(&annotated).unwrap();

        assert_eq!(annotated.annotations(), reannotated.annotations());

        let original = original_configuration(&annotated).unwrap().unwrap();
        assert_eq!(original["data"], json!({"a": "1"}));
        assert!(original["metadata"].get("annotations").is_none());
    }

    #[tokio::test]
    async fn test_apply_create_then_unchanged() {
        let client = MockObjectClient::new();
        let applier = Applier::builder().client(client.clone()).build().unwrap();

        let object = config_map(json!({"a": "1"}));
        assert_eq!(applier.apply(&object).await.unwrap(), ApplyOutcome::Created);
        assert_eq!(applier.apply(&object).await.unwrap(), ApplyOutcome::Unchanged);

        let counts = client.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.patches, 0);
    }

    #[tokio::test]
    async fn test_apply_patches_object_without_last_applied() {
        let client = MockObjectClient::new();
        client.create(&config_map(json!({"a": "1"}))).await.unwrap();

        let applier = Applier::builder().client(client.clone()).build().unwrap();
        let outcome = applier.apply(&config_map(json!({"a": "1"}))).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored = &client.objects()[0];
        assert!(!stored.annotations()[LAST_APPLIED_CONFIG_ANNOTATION].is_empty());
    }

    #[tokio::test]
    async fn test_custom_kinds_use_merge_patch() {
        let client = MockObjectClient::new();
        let applier = Applier::builder().client(client.clone()).build().unwrap();

        let issuer = |email: &str| -> DynamicObject {
            serde_json::from_value(json!({
                "apiVersion": "cert-manager.io/v1",
                "kind": "Issuer",
                "metadata": {"name": "gitlab-issuer", "namespace": "tests"},
                "spec": {"acme": {"email": email}}
            }))
            .unwrap()
        };

        assert_eq!(applier.apply(&issuer("a@example.com")).await.unwrap(), ApplyOutcome::Created);
        assert_eq!(applier.apply(&issuer("b@example.com")).await.unwrap(), ApplyOutcome::Updated);
        assert_eq!(client.objects()[0].data["spec"]["acme"]["email"], "b@example.com");
    }
}
