//! The result of rendering a chart

use gitlab_operator_core::objects::{EditFailure, edit_all};
use gitlab_operator_core::{DynamicObject, Editor, Selector};
use std::fmt;

use crate::query::{Query, QueryCache};

/// A document that did not decode into an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    /// Template path or `hook-<n>`
    pub source: String,
    pub message: String,
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Ordered objects produced by one render, with a query cache
///
/// Every mutation clears the cache.
#[derive(Debug)]
pub struct RenderedTemplate {
    release_name: String,
    namespace: String,
    hooks_disabled: bool,
    objects: Vec<DynamicObject>,
    warnings: Vec<RenderWarning>,
    cache: QueryCache,
}

impl Clone for RenderedTemplate {
    fn clone(&self) -> Self {
        Self {
            release_name: self.release_name.clone(),
            namespace: self.namespace.clone(),
            hooks_disabled: self.hooks_disabled,
            objects: self.objects.clone(),
            warnings: self.warnings.clone(),
            cache: QueryCache::default(),
        }
    }
}

impl RenderedTemplate {
    pub fn new(
        release_name: impl Into<String>,
        namespace: impl Into<String>,
        hooks_disabled: bool,
    ) -> Self {
        Self {
            release_name: release_name.into(),
            namespace: namespace.into(),
            hooks_disabled,
            objects: Vec::new(),
            warnings: Vec::new(),
            cache: QueryCache::default(),
        }
    }

    pub(crate) fn push_warning(&mut self, warning: RenderWarning) {
        self.warnings.push(warning);
    }

    pub fn release_name(&self) -> &str {
        &self.release_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn hooks_disabled(&self) -> bool {
        self.hooks_disabled
    }

    pub fn objects(&self) -> &[DynamicObject] {
        &self.objects
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.warnings
    }

    pub fn into_objects(self) -> Vec<DynamicObject> {
        self.objects
    }

    /// A caching query over this template
    pub fn query(&self) -> Query<'_> {
        Query::new(self, &self.cache)
    }

    pub fn get_objects(&self, selector: &Selector) -> Vec<&DynamicObject> {
        self.objects.iter().filter(|o| selector.matches(o)).collect()
    }

    pub fn add_object(&mut self, object: DynamicObject) {
        self.cache.clear();
        self.objects.push(object);
    }

    /// Replace the first matching object, returning it
    pub fn replace_object(
        &mut self,
        selector: &Selector,
        object: DynamicObject,
    ) -> Option<DynamicObject> {
        let position = self.objects.iter().position(|o| selector.matches(o))?;
        self.cache.clear();
        Some(std::mem::replace(&mut self.objects[position], object))
    }

    /// Remove all matching objects, returning how many were removed
    pub fn delete_objects(&mut self, selector: &Selector) -> usize {
        let before = self.objects.len();
        self.objects.retain(|o| !selector.matches(o));
        let removed = before - self.objects.len();
        if removed > 0 {
            self.cache.clear();
        }
        removed
    }

    pub fn edit_objects(&mut self, editors: &[Editor]) -> Result<usize, EditFailure> {
        self.cache.clear();
        edit_all(self.objects.iter_mut(), editors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlab_operator_core::objects::{EditError, editor, object_from_yaml};
    use kube::ResourceExt;

    fn object(kind: &str, name: &str) -> DynamicObject {
        object_from_yaml(&format!(
            "apiVersion: v1\nkind: {}\nmetadata:\n  name: {}\n",
            kind, name
        ))
        .unwrap()
    }

    fn sample() -> RenderedTemplate {
        let mut template = RenderedTemplate::new("gitlab", "default", false);
        template.add_object(object("ConfigMap", "a"));
        template.add_object(object("ConfigMap", "b"));
        template.add_object(object("Service", "a"));
        template
    }

    #[test]
    fn test_add_then_delete_restores_count() {
        let mut template = sample();
        let extra = object("Secret", "extra");

        template.add_object(extra.clone());
        assert_eq!(template.objects().len(), 4);

        assert_eq!(template.delete_objects(&Selector::by_identity(&extra)), 1);
        assert_eq!(template.objects().len(), 3);
    }

    #[test]
    fn test_replace_object() {
        let mut template = sample();
        let old = template
            .replace_object(&Selector::by_kind("Service"), object("Service", "renamed"))
            .unwrap();

        assert_eq!(old.name_any(), "a");
        assert_eq!(template.objects()[2].name_any(), "renamed");
        assert!(
            template
                .replace_object(&Selector::by_kind("Secret"), object("Secret", "x"))
                .is_none()
        );
    }

    #[test]
    fn test_edit_objects() {
        let mut template = sample();
        let count = template
            .edit_objects(&[editor::set_namespace("gitlab")])
            .unwrap();
        assert_eq!(count, 3);
        assert!(template.objects().iter().all(|o| o.namespace().as_deref() == Some("gitlab")));

        let failing = Editor::new(|o| {
            if o.name_any() == "b" {
                Err(EditError::failed("cannot edit b"))
            } else {
                Ok(())
            }
        });
        let err = template.edit_objects(&[failing]).unwrap_err();
        assert_eq!(err.edited, 1);
    }

    #[test]
    fn test_mutation_resets_cache() {
        let mut template = sample();
        template.query().objects_by_kind("ConfigMap");
        assert_eq!(template.query().cache_len(), 1);

        template.add_object(object("ConfigMap", "c"));
        assert_eq!(template.query().cache_len(), 0);
        assert_eq!(template.query().objects_by_kind("ConfigMap").len(), 3);
    }
}
