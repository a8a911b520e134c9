//! Kubernetes object model shared by the renderer, the adapter and the
//! cluster layer
//!
//! Objects are handled as [`DynamicObject`]s. Typed access goes through
//! [`editor::typed_editor`] or through the typed queries of the engine.

pub mod collection;
pub mod editor;
pub mod gvk;
pub mod selector;

pub use collection::{Collection, EditFailure, edit_all};
pub use editor::{EditError, Editor};
pub use gvk::{GroupKind, GroupVersionResource, KindArg};
pub use selector::Selector;

pub use kube::api::DynamicObject;

use kube::ResourceExt;
use kube::core::GroupVersionKind;

use crate::error::{CoreError, Result};

/// Split an apiVersion into (group, version); the legacy group is empty
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Accessors over the type and identity of a [`DynamicObject`]
pub trait ObjectExt {
    fn kind(&self) -> &str;
    fn api_version(&self) -> &str;
    fn gvk(&self) -> GroupVersionKind;
    /// `Kind/namespace/name`, used in log lines and error messages
    fn display_name(&self) -> String;
    /// Fails unless apiVersion, kind and name are all set
    fn validate(&self) -> Result<()>;
}

impl ObjectExt for DynamicObject {
    fn kind(&self) -> &str {
        self.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default()
    }

    fn api_version(&self) -> &str {
        self.types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or_default()
    }

    fn gvk(&self) -> GroupVersionKind {
        let (group, version) = split_api_version(ObjectExt::api_version(self));
        GroupVersionKind::gvk(group, version, ObjectExt::kind(self))
    }

    fn display_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", ObjectExt::kind(self), ns, self.name_any()),
            None => format!("{}/{}", ObjectExt::kind(self), self.name_any()),
        }
    }

    fn validate(&self) -> Result<()> {
        if ObjectExt::api_version(self).is_empty() || ObjectExt::kind(self).is_empty() {
            return Err(CoreError::InvalidObject {
                message: "object has no apiVersion or kind".to_string(),
            });
        }
        if self.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(CoreError::InvalidObject {
                message: format!("{} object has no name", ObjectExt::kind(self)),
            });
        }
        Ok(())
    }
}

/// Decode one YAML or JSON manifest into an object
pub fn object_from_yaml(yaml: &str) -> Result<DynamicObject> {
    let object: DynamicObject = serde_yaml::from_str(yaml)?;
    Ok(object)
}
