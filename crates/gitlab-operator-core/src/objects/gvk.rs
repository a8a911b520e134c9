//! Kind arguments and resource identifiers
//!
//! Kind arguments follow the command-line convention of `kubectl`: `Kind`,
//! `Kind.group` or `Kind.version.group`.

use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A kind qualified by its API group only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

/// A parsed kind argument
///
/// `Deployment.v1.apps` yields both a GVK (`apps/v1 Deployment`) and the
/// group-kind `Deployment` in group `v1.apps`. Matching tries the GVK first
/// and falls back to the group-kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindArg {
    pub gvk: Option<GroupVersionKind>,
    pub group_kind: GroupKind,
}

impl KindArg {
    pub fn parse(arg: &str) -> Self {
        let gvk = if arg.matches('.').count() >= 2 {
            let mut parts = arg.splitn(3, '.');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(kind), Some(version), Some(group)) => {
                    Some(GroupVersionKind::gvk(group, version, kind))
                }
                _ => None,
            }
        } else {
            None
        };

        let group_kind = match arg.split_once('.') {
            Some((kind, group)) => GroupKind {
                group: group.to_string(),
                kind: kind.to_string(),
            },
            None => GroupKind {
                group: String::new(),
                kind: arg.to_string(),
            },
        };

        Self { gvk, group_kind }
    }

    /// Whether an object of the given type satisfies this argument
    ///
    /// The group-kind fallback also accepts the object's version in place
    /// of its group, so `Job.v1` matches `batch/v1 Job`.
    pub fn matches(&self, object: &GroupVersionKind) -> bool {
        if let Some(q) = &self.gvk {
            if q.kind == object.kind
                && (q.group.is_empty() || q.group == object.group)
                && (q.version.is_empty() || q.version == object.version)
            {
                return true;
            }
        }

        let q = &self.group_kind;
        q.kind == object.kind
            && (q.group.is_empty() || q.group == object.group || q.group == object.version)
    }
}

/// A resource type as addressed by the API server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// `group/version`, or only `version` for the legacy group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl FromStr for GroupVersionResource {
    type Err = CoreError;

    /// Parse `resource.version.group` (`deployments.v1.apps`, `pods.v1`)
    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let mut parts = arg.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(version), group)
                if !resource.is_empty() && !version.is_empty() =>
            {
                Ok(Self::new(group.unwrap_or_default(), version, resource))
            }
            _ => Err(CoreError::InvalidPath {
                path: arg.to_string(),
                message: "expected resource.version.group".to_string(),
            }),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.resource, self.version)
        } else {
            write!(f, "{}.{}.{}", self.resource, self.version, self.group)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvk(group: &str, version: &str, kind: &str) -> GroupVersionKind {
        GroupVersionKind::gvk(group, version, kind)
    }

    #[test]
    fn test_parse_kind_arg() {
        let arg = KindArg::parse("Deployment");
        assert!(arg.gvk.is_none());
        assert_eq!(arg.group_kind.kind, "Deployment");
        assert_eq!(arg.group_kind.group, "");

        let arg = KindArg::parse("Deployment.apps");
        assert!(arg.gvk.is_none());
        assert_eq!(arg.group_kind.group, "apps");

        let arg = KindArg::parse("Ingress.v1.networking.k8s.io");
        assert_eq!(arg.gvk, Some(gvk("networking.k8s.io", "v1", "Ingress")));
        assert_eq!(arg.group_kind.group, "v1.networking.k8s.io");
    }

    #[test]
    fn test_equivalent_spellings_match() {
        let deployment = gvk("apps", "v1", "Deployment");

        for spelling in ["Deployment", "Deployment.apps", "Deployment.v1.apps"] {
            assert!(KindArg::parse(spelling).matches(&deployment), "{}", spelling);
        }
        assert!(!KindArg::parse("Deployment.v1beta1.apps").matches(&deployment));
        assert!(!KindArg::parse("StatefulSet").matches(&deployment));
    }

    #[test]
    fn test_group_may_match_version() {
        assert!(KindArg::parse("Job.v1").matches(&gvk("batch", "v1", "Job")));
        assert!(KindArg::parse("ConfigMap.v1").matches(&gvk("", "v1", "ConfigMap")));
        assert!(!KindArg::parse("Job.v2").matches(&gvk("batch", "v1", "Job")));
    }

    #[test]
    fn test_versioned_ingress_does_not_match_beta() {
        let beta = gvk("networking.k8s.io", "v1beta1", "Ingress");
        assert!(!KindArg::parse("Ingress.v1.networking.k8s.io").matches(&beta));
        assert!(KindArg::parse("Ingress.networking.k8s.io").matches(&beta));
    }

    #[test]
    fn test_parse_group_version_resource() {
        let gvr: GroupVersionResource = "deployments.v1.apps".parse().unwrap();
        assert_eq!(gvr, GroupVersionResource::new("apps", "v1", "deployments"));
        assert_eq!(gvr.api_version(), "apps/v1");
        assert_eq!(gvr.to_string(), "deployments.v1.apps");

        let gvr: GroupVersionResource = "ingresses.v1.networking.k8s.io".parse().unwrap();
        assert_eq!(gvr.group, "networking.k8s.io");

        let gvr: GroupVersionResource = "configmaps.v1".parse().unwrap();
        assert_eq!(gvr.api_version(), "v1");

        assert!("deployments".parse::<GroupVersionResource>().is_err());
    }
}
