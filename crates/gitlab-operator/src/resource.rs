//! The GitLab custom resource and the seams the reconciler sees it through

use gitlab_operator_core::{Catalog, Values};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Desired state of a GitLab instance
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "apps.gitlab.com",
    version = "v1beta1",
    kind = "GitLab",
    namespaced,
    status = "GitLabStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct GitLabSpec {
    #[serde(default)]
    pub chart: GitLabChartSpec,
}

/// Chart version and values used to deploy the instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitLabChartSpec {
    /// Semantic version of the GitLab chart
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Helm values, passed through untouched
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub values: Value,
}

/// Observed state of a GitLab instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitLabStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,

    /// Chart version of the last successful reconcile
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Identity and origin of a wrapped custom resource
///
/// A wrapper is built at the start of each reconcile and does not follow
/// later changes to the resource.
pub trait CustomResourceWrapper {
    /// `namespace/name`
    fn name(&self) -> String;

    fn origin(&self) -> &GitLab;
}

/// One-way mapping of a custom resource onto chart values
pub trait ValueProvider {
    fn values(&self) -> &Values;

    /// Stable for a given revision of the resource
    fn hash(&self) -> String;
}

/// The charts a custom resource is reconciled with
pub trait ChartConsumer {
    /// Release name shared by every chart
    fn release_name(&self) -> &str;

    fn charts(&self) -> &Catalog;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_deserialize_resource() {
        let gitlab: GitLab = serde_yaml::from_str(
            r#"
apiVersion: apps.gitlab.com/v1beta1
kind: GitLab
metadata:
  name: example
  namespace: gitlab-system
spec:
  chart:
    version: "7.2.0"
    values:
      global:
        hosts:
          domain: example.com
status:
  version: "7.1.0"
  phase: Running
"#,
        )
        .unwrap();

        assert_eq!(gitlab.spec.chart.version, "7.2.0");
        assert_eq!(gitlab.spec.chart.values["global"]["hosts"]["domain"], "example.com");
        assert_eq!(gitlab.status.unwrap().version, "7.1.0");
        assert_eq!(GitLab::api_version(&()), "apps.gitlab.com/v1beta1");
        assert_eq!(GitLab::kind(&()), "GitLab");
    }

    #[test]
    fn test_empty_spec() {
        let gitlab: GitLab = serde_yaml::from_str(
            "apiVersion: apps.gitlab.com/v1beta1\nkind: GitLab\nmetadata:\n  name: example\nspec: {}\n",
        )
        .unwrap();
        assert!(gitlab.spec.chart.version.is_empty());
        assert!(gitlab.spec.chart.values.is_null());
        assert!(gitlab.status.is_none());
    }
}
