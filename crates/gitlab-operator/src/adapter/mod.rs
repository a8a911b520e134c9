//! Adapter over a v1beta1 GitLab resource
//!
//! [`GitLabAdapter`] resolves the chart a resource asks for and computes the
//! values it is rendered with. It is built once per reconcile and does not
//! follow later changes to the resource; status changes made through it are
//! read back with [`GitLabAdapter::into_resource`].

pub mod features;
mod managed;
mod operation;
pub mod status;
mod values;

use gitlab_operator_core::catalog::{with_name, with_version};
use gitlab_operator_core::{Catalog, ChainedOperation, Values, simple_object_hash};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use semver::Version;
use tracing::debug;

use crate::error::{OperatorError, Result};
use crate::resource::{ChartConsumer, CustomResourceWrapper, GitLab, GitLabStatus, ValueProvider};
use crate::settings::OperatorSettings;
use features::{Component, FeatureCheck};

pub use features::{ALL, CORE, STATEFUL};
pub use status::{ConditionType, PHASE_PREPARING, PHASE_RUNNING};

/// Name of the chart every GitLab resource is deployed from
pub const GITLAB_CHART: &str = "gitlab";

#[derive(Debug, Clone)]
pub struct GitLabAdapter {
    resource: GitLab,
    settings: OperatorSettings,
    values: Values,
    charts: Catalog,
    target: gitlab_operator_core::Collection,
}

impl GitLabAdapter {
    /// Wrap a resource: find its chart, then compute its values
    pub fn new(resource: GitLab, catalog: &Catalog, settings: &OperatorSettings) -> Result<Self> {
        let mut adapter = Self {
            resource,
            settings: settings.clone(),
            values: Values::new(),
            charts: Catalog::new(),
            target: Default::default(),
        };

        ChainedOperation::<Self, OperatorError>::new()
            .then(|a| a.prepare_charts(catalog))
            .then(Self::populate_values)
            .then(Self::validate)
            .run(&mut adapter)?;

        debug!(resource = %adapter.name(), version = %adapter.desired_version(), "adapter ready");
        Ok(adapter)
    }

    fn prepare_charts(&mut self, catalog: &Catalog) -> Result<()> {
        let version = self.desired_version().to_string();
        Version::parse(&version).map_err(|source| OperatorError::InvalidVersion {
            version: version.clone(),
            source,
        })?;

        let result = catalog.query(&[with_name(GITLAB_CHART), with_version(version.as_str())]);
        if result.is_empty() {
            return Err(OperatorError::ChartNotFound {
                name: GITLAB_CHART.to_string(),
                version,
                available: catalog.versions(GITLAB_CHART).join(", "),
            });
        }

        self.charts = result;
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn wants_feature(&self, check: FeatureCheck) -> bool {
        check.check(&self.values)
    }

    /// Components without an enabled check are never wanted
    pub fn wants_component(&self, component: Component) -> bool {
        component
            .enabled_check()
            .is_some_and(|check| self.wants_feature(check))
    }

    pub fn status(&self) -> Option<&GitLabStatus> {
        self.resource.status.as_ref()
    }

    /// Controller reference placed on every managed object
    pub fn owner_reference(&self) -> Result<OwnerReference> {
        self.resource.controller_owner_ref(&()).ok_or_else(|| {
            OperatorError::Resource(format!("{} has no uid; it must be persisted first", self.name()))
        })
    }

    pub fn namespace(&self) -> String {
        self.resource.namespace().unwrap_or_default()
    }

    /// The wrapped resource, with any status changes made through the adapter
    pub fn into_resource(self) -> GitLab {
        self.resource
    }
}

impl CustomResourceWrapper for GitLabAdapter {
    fn name(&self) -> String {
        format!("{}/{}", self.namespace(), self.resource.name_any())
    }

    fn origin(&self) -> &GitLab {
        &self.resource
    }
}

impl ValueProvider for GitLabAdapter {
    fn values(&self) -> &Values {
        &self.values
    }

    fn hash(&self) -> String {
        simple_object_hash(&self.resource.metadata)
    }
}

impl ChartConsumer for GitLabAdapter {
    fn release_name(&self) -> &str {
        self.resource.metadata.name.as_deref().unwrap_or_default()
    }

    fn charts(&self) -> &Catalog {
        &self.charts
    }
}


#[cfg(test)]
mod tests {
    use super::features::{BACKUP_CRON_JOB, CONFIGURE_CERT_MANAGER};
    use super::testing::{adapter, catalog, gitlab};
    use super::*;

    #[test]
    fn test_identity() {
        let a = adapter(gitlab("7.1.0", None));
        assert_eq!(a.name(), "gitlab-system/example");
        assert_eq!(a.release_name(), "example");
        assert_eq!(a.hash(), "0000-1111-3");
        assert_eq!(a.charts().len(), 1);
        assert_eq!(a.origin().spec.chart.version, "7.1.0");

        let owner = a.owner_reference().unwrap();
        assert_eq!(owner.kind, "GitLab");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_invalid_version() {
        let err = GitLabAdapter::new(gitlab("seven", None), &catalog(), &OperatorSettings::default()).unwrap_err();
        assert_eq!(err.to_string(), "invalid version format seven");
    }

    #[test]
    fn test_unknown_version() {
        let err = GitLabAdapter::new(gitlab("6.0.0", None), &catalog(), &OperatorSettings::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "gitlab chart version 6.0.0 not found; use one of 7.0.0, 7.1.0"
        );
    }

    #[test]
    fn test_values_layering() {
        let a = adapter(gitlab("7.1.0", None));
        let values = a.values();

        // user values win over chart defaults
        assert_eq!(values.get_string("global.hosts.domain", ""), "gitlab.test");
        assert!(!values.get_bool("redis.install", true));
        // chart defaults fill the gaps
        assert_eq!(values.get_string("global.edition", ""), "ee");
        // operator defaults and overrides
        assert_eq!(values.get_string("global.ingress.class", ""), "example-nginx");
        assert_eq!(
            values.get_string("nginx-ingress.serviceAccount.name", ""),
            "gitlab-nginx-ingress"
        );
        assert_eq!(
            values.get_string("global.ingress.annotations.cert-manager\\.io/issuer", ""),
            "example-issuer"
        );
    }

    #[test]
    fn test_overrides_beat_user_values() {
        let mut resource = gitlab("7.1.0", None);
        resource.spec.chart.values["shared-secrets"] = serde_json::json!({"serviceAccount": {"name": "mine"}});

        let a = adapter(resource);
        assert_eq!(
            a.values().get_string("shared-secrets.serviceAccount.name", ""),
            "gitlab-manager"
        );
    }

    #[test]
    fn test_features_and_components() {
        let a = adapter(gitlab("7.1.0", None));
        assert!(a.wants_feature(CONFIGURE_CERT_MANAGER));
        assert!(!a.wants_feature(BACKUP_CRON_JOB));

        assert!(a.wants_component(Component::Webservice));
        assert!(a.wants_component(Component::Sidekiq));
        assert!(!a.wants_component(Component::Redis));
        assert!(!a.wants_component(Component::SharedSecrets));
    }
}
