//! Object predicates

use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::gvk::KindArg;
use super::{DynamicObject, ObjectExt};

/// A predicate over objects
#[derive(Clone)]
pub struct Selector(Arc<dyn Fn(&DynamicObject) -> bool + Send + Sync>);

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Selector")
    }
}

impl Selector {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DynamicObject) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn matches(&self, object: &DynamicObject) -> bool {
        (self.0)(object)
    }

    /// Matches the kind argument (`Kind`, `Kind.group`, `Kind.version.group`)
    pub fn by_kind(kind: &str) -> Self {
        let arg = KindArg::parse(kind);
        Self::new(move |o| arg.matches(&o.gvk()))
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |o| o.metadata.name.as_deref() == Some(name.as_str()))
    }

    pub fn by_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self::new(move |o| o.metadata.namespace.as_deref().unwrap_or_default() == namespace)
    }

    /// Matches objects whose labels include every given pair
    pub fn by_labels(labels: BTreeMap<String, String>) -> Self {
        Self::new(move |o| {
            let own = o.labels();
            labels.iter().all(|(k, v)| own.get(k) == Some(v))
        })
    }

    /// Matches the `app` or `app.kubernetes.io/component` label
    pub fn by_component(component: impl Into<String>) -> Self {
        let component = component.into();
        Self::new(move |o| {
            let labels = o.labels();
            labels.get("app") == Some(&component)
                || labels.get("app.kubernetes.io/component") == Some(&component)
        })
    }

    /// Same kind (ignoring group and version), namespace and name
    pub fn by_identity(object: &DynamicObject) -> Self {
        let kind = object.kind().to_string();
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        Self::new(move |o| {
            o.kind() == kind
                && o.metadata.namespace.as_deref().unwrap_or_default() == namespace
                && o.metadata.name.as_deref().unwrap_or_default() == name
        })
    }

    pub fn all(selectors: Vec<Selector>) -> Self {
        Self::new(move |o| selectors.iter().all(|s| s.matches(o)))
    }

    pub fn any(selectors: Vec<Selector>) -> Self {
        Self::new(move |o| selectors.iter().any(|s| s.matches(o)))
    }

    pub fn none(selectors: Vec<Selector>) -> Self {
        Self::new(move |o| !selectors.iter().any(|s| s.matches(o)))
    }

    pub fn negate(selector: Selector) -> Self {
        Self::new(move |o| !selector.matches(o))
    }

    pub fn always() -> Self {
        Self::new(|_| true)
    }

    pub fn never() -> Self {
        Self::new(|_| false)
    }
}

/// Build a label map from pairs
pub fn labels<I, K, V>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::testing::{object, with_labels};

    #[test]
    fn test_by_kind() {
        let deployment = object("apps/v1", "Deployment", "web", "gitlab");

        assert!(Selector::by_kind("Deployment").matches(&deployment));
        assert!(Selector::by_kind("Deployment.apps").matches(&deployment));
        assert!(Selector::by_kind("Deployment.v1.apps").matches(&deployment));
        assert!(!Selector::by_kind("Service").matches(&deployment));
    }

    #[test]
    fn test_by_name_and_namespace() {
        let cm = object("v1", "ConfigMap", "settings", "gitlab");

        assert!(Selector::by_name("settings").matches(&cm));
        assert!(!Selector::by_name("other").matches(&cm));
        assert!(Selector::by_namespace("gitlab").matches(&cm));
        assert!(!Selector::by_namespace("default").matches(&cm));
    }

    #[test]
    fn test_by_labels_is_subset_match() {
        let cm = with_labels(
            object("v1", "ConfigMap", "settings", "gitlab"),
            &[("app", "webservice"), ("release", "gitlab")],
        );

        assert!(Selector::by_labels(labels([("app", "webservice")])).matches(&cm));
        assert!(Selector::by_labels(BTreeMap::new()).matches(&cm));
        assert!(!Selector::by_labels(labels([("app", "webservice"), ("tier", "web")])).matches(&cm));
    }

    #[test]
    fn test_by_component() {
        let legacy = with_labels(object("v1", "Service", "a", ""), &[("app", "sidekiq")]);
        let modern = with_labels(
            object("v1", "Service", "b", ""),
            &[("app.kubernetes.io/component", "sidekiq")],
        );
        let other = with_labels(object("v1", "Service", "c", ""), &[("app", "gitaly")]);

        let selector = Selector::by_component("sidekiq");
        assert!(selector.matches(&legacy));
        assert!(selector.matches(&modern));
        assert!(!selector.matches(&other));
    }

    #[test]
    fn test_combinators() {
        let cm = object("v1", "ConfigMap", "settings", "gitlab");
        let is_cm = Selector::by_kind("ConfigMap");
        let is_other = Selector::by_name("other");

        assert!(Selector::all(vec![is_cm.clone(), Selector::always()]).matches(&cm));
        assert!(!Selector::all(vec![is_cm.clone(), is_other.clone()]).matches(&cm));
        assert!(Selector::any(vec![is_other.clone(), is_cm.clone()]).matches(&cm));
        assert!(Selector::none(vec![is_other.clone(), Selector::never()]).matches(&cm));
        assert!(!Selector::negate(is_cm).matches(&cm));
    }

    #[test]
    fn test_by_identity_ignores_group_version() {
        let a = object("extensions/v1beta1", "Ingress", "web", "gitlab");
        let b = object("networking.k8s.io/v1", "Ingress", "web", "gitlab");
        let c = object("networking.k8s.io/v1", "Ingress", "web", "default");

        assert!(Selector::by_identity(&a).matches(&b));
        assert!(!Selector::by_identity(&a).matches(&c));
    }
}
