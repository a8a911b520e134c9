//! The object client seam
//!
//! Apply and discovery only need a handful of cluster calls. They go through
//! [`ObjectClient`] so the same code runs against a live API server
//! ([`KubeObjectClient`]) and against the in-memory [`crate::MockObjectClient`].

use async_trait::async_trait;
use gitlab_operator_core::ObjectExt;
use gitlab_operator_core::objects::GroupVersionResource;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiGroup, ApiResource, Scope, verbs},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{KubeError, Result};

/// How the server should interpret a patch body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// `application/strategic-merge-patch+json`
    Strategic,
    /// `application/merge-patch+json`
    Merge,
}

/// A computed patch ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatch {
    pub kind: PatchKind,
    pub data: Value,
}

/// Cluster calls used by apply and discovery
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Fetch one object; `None` when it does not exist
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject>;

    async fn patch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<DynamicObject>;

    /// Delete one object; `false` when it was already gone
    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<bool>;

    /// The kind served under a resource, if the server knows it
    fn kind_for(&self, gvr: &GroupVersionResource) -> Option<GroupVersionKind>;

    /// Metadata of every object of a resource type in a namespace
    async fn list_metadata(&self, gvr: &GroupVersionResource, namespace: &str) -> Result<Vec<DynamicObject>>;

    /// Namespaced resources the server lets us list and get, in their
    /// preferred versions
    async fn preferred_resources(&self) -> Result<Vec<GroupVersionResource>>;
}

#[async_trait]
impl<T: ObjectClient + ?Sized> ObjectClient for Arc<T> {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        (**self).get(gvk, namespace, name).await
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject> {
        (**self).create(object).await
    }

    async fn patch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<DynamicObject> {
        (**self).patch(gvk, namespace, name, patch).await
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<bool> {
        (**self).delete(gvk, namespace, name).await
    }

    fn kind_for(&self, gvr: &GroupVersionResource) -> Option<GroupVersionKind> {
        (**self).kind_for(gvr)
    }

    async fn list_metadata(&self, gvr: &GroupVersionResource, namespace: &str) -> Result<Vec<DynamicObject>> {
        (**self).list_metadata(gvr, namespace).await
    }

    async fn preferred_resources(&self) -> Result<Vec<GroupVersionResource>> {
        (**self).preferred_resources().await
    }
}

/// [`ObjectClient`] backed by a live API server
///
/// API groups are discovered once, on connect. Call [`Self::refresh`] after
/// installing new CRDs.
pub struct KubeObjectClient {
    client: Client,
    groups: Vec<ApiGroup>,
}

impl KubeObjectClient {
    /// Connect and discover the served API groups
    ///
    /// Groups that fail discovery are logged and left out.
    pub async fn new(client: Client) -> Result<Self> {
        let groups = discover_groups(&client).await?;
        Ok(Self { client, groups })
    }

    /// Client from the ambient kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Self::new(client).await
    }

    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    /// Refresh discovery
    pub async fn refresh(&mut self) -> Result<()> {
        self.groups = discover_groups(&self.client).await?;
        Ok(())
    }

    fn resolve_gvk(&self, gvk: &GroupVersionKind) -> Option<(ApiResource, ApiCapabilities)> {
        self.groups
            .iter()
            .filter(|g| g.name() == gvk.group)
            .flat_map(|g| g.versioned_resources(&gvk.version))
            .find(|(ar, _)| ar.kind == gvk.kind)
    }

    fn resolve_gvr(&self, gvr: &GroupVersionResource) -> Option<(ApiResource, ApiCapabilities)> {
        self.groups
            .iter()
            .filter(|g| g.name() == gvr.group)
            .flat_map(|g| g.versioned_resources(&gvr.version))
            .find(|(ar, _)| ar.plural == gvr.resource)
    }

    fn api_for(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (resource, capabilities) = self
            .resolve_gvk(gvk)
            .ok_or_else(|| KubeError::UnknownResource(format!("{}/{} {}", gvk.group, gvk.version, gvk.kind)))?;

        let api = match (capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
            (Scope::Namespaced, None) => Api::default_namespaced_with(self.client.clone(), &resource),
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }
}

async fn discover_groups(client: &Client) -> Result<Vec<ApiGroup>> {
    let mut names = vec![ApiGroup::CORE_GROUP.to_string()];
    names.extend(client.list_api_groups().await?.groups.into_iter().map(|g| g.name));

    let mut groups = Vec::with_capacity(names.len());
    for name in names {
        match kube::discovery::group(client, &name).await {
            Ok(group) => groups.push(group),
            Err(e) => warn!(group = %name, error = %e, "could not discover API group"),
        }
    }
    debug!(count = groups.len(), "discovered API groups");
    Ok(groups)
}

fn object_name(object: &DynamicObject) -> Result<&str> {
    object
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| KubeError::InvalidConfig("object has no name".to_string()))
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api = self.api_for(gvk, namespace)?;
        Ok(api.get_opt(name).await?)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api_for(&object.gvk(), object.metadata.namespace.as_deref())?;
        object_name(object)?;
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn patch(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<DynamicObject> {
        let api = self.api_for(gvk, namespace)?;
        let params = PatchParams::default();
        let patched = match patch.kind {
            PatchKind::Strategic => api.patch(name, &params, &Patch::Strategic(&patch.data)).await?,
            PatchKind::Merge => api.patch(name, &params, &Patch::Merge(&patch.data)).await?,
        };
        Ok(patched)
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<bool> {
        let api = self.api_for(gvk, namespace)?;
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn kind_for(&self, gvr: &GroupVersionResource) -> Option<GroupVersionKind> {
        self.resolve_gvr(gvr)
            .map(|(ar, _)| GroupVersionKind::gvk(&ar.group, &ar.version, &ar.kind))
    }

    async fn list_metadata(&self, gvr: &GroupVersionResource, namespace: &str) -> Result<Vec<DynamicObject>> {
        let (resource, _) = self
            .resolve_gvr(gvr)
            .ok_or_else(|| KubeError::UnknownResource(gvr.to_string()))?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);
        let list = api.list_metadata(&ListParams::default()).await?;

        // items come back typed as PartialObjectMetadata
        Ok(list
            .items
            .into_iter()
            .map(|item| DynamicObject {
                types: Some(TypeMeta {
                    api_version: resource.api_version.clone(),
                    kind: resource.kind.clone(),
                }),
                metadata: item.metadata,
                data: Value::Object(Default::default()),
            })
            .collect())
    }

    async fn preferred_resources(&self) -> Result<Vec<GroupVersionResource>> {
        let mut resources = Vec::new();
        for group in &self.groups {
            for (ar, caps) in group.recommended_resources() {
                if caps.scope == Scope::Namespaced
                    && caps.supports_operation(verbs::LIST)
                    && caps.supports_operation(verbs::GET)
                {
                    resources.push(GroupVersionResource::new(&ar.group, &ar.version, &ar.plural));
                }
            }
        }
        Ok(resources)
    }
}
