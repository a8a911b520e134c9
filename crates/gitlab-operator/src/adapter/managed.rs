//! Objects owned by a GitLab resource

use gitlab_operator_core::{Collection, DynamicObject};
use gitlab_operator_kube::{DiscoveryConfig, ObjectClient, OwnerIdentity, discover_managed_objects, supported_resources};
use tracing::debug;

use super::GitLabAdapter;
use crate::error::Result;

impl GitLabAdapter {
    /// Objects in the cluster that the resource owns
    ///
    /// Only resource types the cluster serves and the settings allow are
    /// scanned.
    pub async fn current_objects(&self, client: &dyn ObjectClient) -> Result<Collection> {
        let resources: Vec<_> = supported_resources(client)
            .into_iter()
            .filter(|gvr| self.settings.is_group_version_supported(&gvr.group, &gvr.version))
            .collect();
        debug!(count = resources.len(), "scanning supported resources");

        let config = DiscoveryConfig::new().with_group_version_resources(resources);
        let owner = OwnerIdentity::of(&self.resource);
        Ok(discover_managed_objects(client, &owner, &config).await?)
    }

    /// Objects the resource should own after this reconcile
    pub fn target_objects(&self) -> &Collection {
        &self.target
    }

    /// Add objects to the targets, skipping identities already present
    ///
    /// Returns how many were added.
    pub fn populate_managed_objects<I>(&mut self, objects: I) -> usize
    where
        I: IntoIterator<Item = DynamicObject>,
    {
        self.target.append_unique(objects)
    }
}
