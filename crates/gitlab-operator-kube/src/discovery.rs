//! Managed-object discovery
//!
//! Finds the objects a custom resource owns by scanning resource types in the
//! owner's namespace and keeping the objects whose owner references point at
//! it. Only metadata is fetched.

use gitlab_operator_core::objects::{GroupVersionResource, Selector, split_api_version};
use gitlab_operator_core::{Collection, ObjectExt};
use kube::api::DynamicObject;
use kube::core::TypeMeta;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

use crate::client::ObjectClient;
use crate::error::{KubeError, Result};

/// Resource types the operator may create, in `resource.version.group` form
///
/// Not every cluster serves all of them; see [`supported_resources`].
pub const SUPPORTED_RESOURCES: &[&str] = &[
    "configmaps.v1",
    "services.v1",
    "deployments.v1.apps",
    "statefulsets.v1.apps",
    "daemonsets.v1.apps",
    "ingresses.v1.networking.k8s.io",
    "ingresses.v1beta1.networking.k8s.io",
    "ingresses.v1beta1.extensions",
    "jobs.v1.batch",
    "cronjobs.v1.batch",
    "cronjobs.v1beta1.batch",
    "horizontalpodautoscalers.v2.autoscaling",
    "horizontalpodautoscalers.v2beta2.autoscaling",
    "horizontalpodautoscalers.v2beta1.autoscaling",
    "horizontalpodautoscalers.v1.autoscaling",
    "servicemonitors.v1.monitoring.coreos.com",
    "podmonitors.v1.monitoring.coreos.com",
    "prometheuses.v1.monitoring.coreos.com",
];

/// The entries of [`SUPPORTED_RESOURCES`] that the server serves
pub fn supported_resources(client: &dyn ObjectClient) -> Vec<GroupVersionResource> {
    SUPPORTED_RESOURCES
        .iter()
        .filter_map(|arg| arg.parse::<GroupVersionResource>().ok())
        .filter(|gvr| client.kind_for(gvr).is_some())
        .collect()
}

/// The object whose managed objects are discovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl OwnerIdentity {
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Identity of a typed resource such as the GitLab custom resource
    pub fn of<K: Resource<DynamicType = ()>>(resource: &K) -> Self {
        Self {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            name: resource.name_any(),
            namespace: resource.namespace().unwrap_or_default(),
        }
    }

    /// Whether one of the object's owner references points at this owner
    ///
    /// Group, version, kind and name must match; the uid is not compared.
    pub fn owns(&self, object: &DynamicObject) -> bool {
        if object.metadata.namespace.as_deref().unwrap_or_default() != self.namespace {
            return false;
        }

        let (group, version) = split_api_version(&self.api_version);
        object.owner_references().iter().any(|owner| {
            let (ref_group, ref_version) = split_api_version(&owner.api_version);
            ref_group == group && ref_version == version && owner.kind == self.kind && owner.name == self.name
        })
    }
}

/// What to scan during discovery
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    resources: Vec<GroupVersionResource>,
    auto_discovery: bool,
    filters: Vec<Selector>,
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_version_resources(mut self, resources: Vec<GroupVersionResource>) -> Self {
        self.resources = resources;
        self
    }

    /// Resource types in `resource.version.group` form
    ///
    /// The version is required; arguments that do not parse are skipped.
    pub fn with_group_version_resource_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resources = args
            .into_iter()
            .filter_map(|arg| match arg.as_ref().parse::<GroupVersionResource>() {
                Ok(gvr) => Some(gvr),
                Err(e) => {
                    warn!(resource = arg.as_ref(), error = %e, "ignoring resource argument");
                    None
                }
            })
            .collect();
        self
    }

    /// Scan every namespaced resource the server lets us list and get
    ///
    /// The explicit resource list is ignored in this mode.
    pub fn auto_discovery(mut self) -> Self {
        self.auto_discovery = true;
        self
    }

    /// Keep only objects matching every filter
    pub fn filter(mut self, selector: Selector) -> Self {
        self.filters.push(selector);
        self
    }

    pub fn resources(&self) -> &[GroupVersionResource] {
        &self.resources
    }

    pub fn validate(&self) -> Result<()> {
        if !self.auto_discovery && self.resources.is_empty() {
            return Err(KubeError::InvalidConfig("list of resources is required".to_string()));
        }
        Ok(())
    }
}

/// Objects in the owner's namespace that the owner manages
///
/// Listing failures are logged and the resource type is skipped. Cluster
/// scoped objects are never returned.
pub async fn discover_managed_objects(
    client: &dyn ObjectClient,
    owner: &OwnerIdentity,
    config: &DiscoveryConfig,
) -> Result<Collection> {
    config.validate()?;

    let resources = if config.auto_discovery {
        client.preferred_resources().await?
    } else {
        config.resources.clone()
    };

    let mut result = Collection::new();
    for gvr in &resources {
        let kind = client.kind_for(gvr);
        debug!(resource = %gvr, kind = ?kind.as_ref().map(|k| &k.kind), "fetching resources");

        let items = match client.list_metadata(gvr, &owner.namespace).await {
            Ok(items) => items,
            Err(e) => {
                warn!(resource = %gvr, error = %e, "could not list resources");
                continue;
            }
        };
        debug!(resource = %gvr, count = items.len(), "got list items");

        let owned = items.into_iter().filter_map(|mut item| {
            if item.api_version().is_empty() && item.kind().is_empty() {
                if let Some(kind) = &kind {
                    item.types = Some(TypeMeta {
                        api_version: gvr.api_version(),
                        kind: kind.kind.clone(),
                    });
                }
            }
            (owner.owns(&item) && config.filters.iter().all(|f| f.matches(&item))).then_some(item)
        });
        result.append(owned);
    }

    Ok(result)
}
