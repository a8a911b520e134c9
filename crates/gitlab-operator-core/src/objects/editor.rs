//! In-place object editors
//!
//! An editor may refuse an object it cannot handle by returning
//! [`EditError::TypeMismatch`]. Collections and templates skip such objects
//! and keep going; any other error stops the traversal.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::{DynamicObject, ObjectExt};

#[derive(Error, Debug)]
pub enum EditError {
    #[error("expected {expected}, got {observed}")]
    TypeMismatch { expected: String, observed: String },

    #[error("{message}")]
    Failed { message: String },
}

impl EditError {
    pub fn type_mismatch(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

/// Changes an object in place
#[derive(Clone)]
pub struct Editor(Arc<dyn Fn(&mut DynamicObject) -> Result<(), EditError> + Send + Sync>);

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Editor")
    }
}

impl Editor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut DynamicObject) -> Result<(), EditError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn edit(&self, object: &mut DynamicObject) -> Result<(), EditError> {
        (self.0)(object)
    }
}

pub fn set_namespace(namespace: impl Into<String>) -> Editor {
    let namespace = namespace.into();
    Editor::new(move |o| {
        o.metadata.namespace = Some(namespace.clone());
        Ok(())
    })
}

/// Merges into the existing annotations
pub fn set_annotations(annotations: BTreeMap<String, String>) -> Editor {
    Editor::new(move |o| {
        o.annotations_mut()
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    })
}

/// Merges into the existing labels
pub fn set_labels(labels: BTreeMap<String, String>) -> Editor {
    Editor::new(move |o| {
        o.labels_mut()
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    })
}

/// Adds the owner reference, replacing any reference with the same uid
pub fn set_owner_reference(owner: OwnerReference) -> Editor {
    Editor::new(move |o| {
        let refs = o.owner_references_mut();
        refs.retain(|r| r.uid != owner.uid);
        refs.push(owner.clone());
        Ok(())
    })
}

/// Runs `f` on the typed form of objects of kind `K`
///
/// Objects of any other kind are refused with a type mismatch.
pub fn typed_editor<K, F>(f: F) -> Editor
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    F: Fn(&mut K) -> Result<(), EditError> + Send + Sync + 'static,
{
    Editor::new(move |o| {
        let expected_kind = K::kind(&());
        let expected_version = K::api_version(&());
        if o.kind() != expected_kind || o.api_version() != expected_version {
            return Err(EditError::type_mismatch(
                format!("{} {}", expected_version, expected_kind),
                format!("{} {}", o.api_version(), o.kind()),
            ));
        }

        let value = serde_json::to_value(&*o).map_err(|e| EditError::failed(e.to_string()))?;
        let mut typed: K =
            serde_json::from_value(value).map_err(|e| EditError::failed(e.to_string()))?;

        f(&mut typed)?;

        let value = serde_json::to_value(&typed).map_err(|e| EditError::failed(e.to_string()))?;
        let mut edited: DynamicObject =
            serde_json::from_value(value).map_err(|e| EditError::failed(e.to_string()))?;
        // typed values serialise without apiVersion/kind for some kinds
        if edited.types.is_none() {
            edited.types = o.types.clone();
        }
        *o = edited;
        Ok(())
    })
}
