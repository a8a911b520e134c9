//! Caching queries over a rendered template
//!
//! Every query builds a key from the name (or `*`), a kind token and the
//! label set. Results are kept until the cache is reset, including empty
//! ones, so repeating a query never rescans the template.

use gitlab_operator_core::objects::{KindArg, ObjectExt, split_api_version};
use gitlab_operator_core::DynamicObject;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::template::RenderedTemplate;

const ANYTHING: &str = "*";
const APP_LABEL: &str = "app";

#[derive(Clone)]
enum Cached {
    /// Positions into the template's object list
    Objects(Arc<Vec<usize>>),
    Typed(Arc<dyn Any + Send + Sync>),
}

#[derive(Default)]
pub(crate) struct QueryCache(Mutex<HashMap<String, Cached>>);

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache").field("len", &self.lock().len()).finish()
    }
}

impl QueryCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Cached>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: &str) -> Option<Cached> {
        self.lock().get(key).cloned()
    }

    fn insert(&self, key: String, value: Cached) {
        self.lock().insert(key, value);
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// `<name>.<token>[<k=v,...>]`
fn cache_key(name: &str, token: &str, labels: Option<&BTreeMap<String, String>>) -> String {
    let labels = labels
        .map(|l| {
            l.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    format!("{}.{}[{}]", name, token, labels)
}

/// `Kind.version.group`, with `core` standing in for the legacy group
fn typed_token<K: Resource<DynamicType = ()>>() -> String {
    let api_version = K::api_version(&());
    let (group, version) = split_api_version(&api_version);
    let group = if group.is_empty() { "core" } else { group };
    format!("{}.{}.{}", K::kind(&()), version, group)
}

fn has_labels(own: &BTreeMap<String, String>, wanted: &BTreeMap<String, String>) -> bool {
    wanted.iter().all(|(k, v)| own.get(k) == Some(v))
}

/// A caching view over a [`RenderedTemplate`]
#[derive(Debug, Clone, Copy)]
pub struct Query<'t> {
    template: &'t RenderedTemplate,
    cache: &'t QueryCache,
}

impl<'t> Query<'t> {
    pub(crate) fn new(template: &'t RenderedTemplate, cache: &'t QueryCache) -> Self {
        Self { template, cache }
    }

    pub fn template(&self) -> &'t RenderedTemplate {
        self.template
    }

    pub fn reset(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn resolve(&self, positions: &[usize]) -> Vec<&'t DynamicObject> {
        let objects = self.template.objects();
        positions.iter().filter_map(|&i| objects.get(i)).collect()
    }

    fn run_kind_query<F>(&self, key: String, kind_arg: &str, filter: F) -> Vec<&'t DynamicObject>
    where
        F: Fn(&DynamicObject) -> bool,
    {
        if let Some(Cached::Objects(positions)) = self.cache.get(&key) {
            debug!(key = %key, "query cache hit");
            return self.resolve(&positions);
        }

        let arg = KindArg::parse(kind_arg);
        let positions: Vec<usize> = self
            .template
            .objects()
            .iter()
            .enumerate()
            .filter(|(_, o)| arg.matches(&o.gvk()) && filter(o))
            .map(|(i, _)| i)
            .collect();

        let result = self.resolve(&positions);
        self.cache.insert(key, Cached::Objects(Arc::new(positions)));
        result
    }

    /// Objects matching `Kind`, `Kind.group` or `Kind.version.group`
    pub fn objects_by_kind(&self, kind_arg: &str) -> Vec<&'t DynamicObject> {
        let key = cache_key(ANYTHING, &format!("{}?", kind_arg), None);
        self.run_kind_query(key, kind_arg, |_| true)
    }

    pub fn object_by_kind_and_name(&self, kind_arg: &str, name: &str) -> Option<&'t DynamicObject> {
        let key = cache_key(name, &format!("{}?", kind_arg), None);
        self.run_kind_query(key, kind_arg, |o| o.metadata.name.as_deref() == Some(name))
            .into_iter()
            .next()
    }

    pub fn objects_by_kind_and_labels(
        &self,
        kind_arg: &str,
        labels: &BTreeMap<String, String>,
    ) -> Vec<&'t DynamicObject> {
        let key = cache_key(ANYTHING, &format!("{}?", kind_arg), Some(labels));
        self.run_kind_query(key, kind_arg, |o| has_labels(o.labels(), labels))
    }

    /// First object of the kind labelled `app=<component>`
    pub fn object_by_kind_and_component(
        &self,
        kind_arg: &str,
        component: &str,
    ) -> Option<&'t DynamicObject> {
        let labels = BTreeMap::from([(APP_LABEL.to_string(), component.to_string())]);
        self.objects_by_kind_and_labels(kind_arg, &labels)
            .into_iter()
            .next()
    }

    fn run_typed_query<K, F>(&self, key: String, filter: F) -> Arc<Vec<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + Sync + 'static,
        F: Fn(&K) -> bool,
    {
        if let Some(Cached::Typed(any)) = self.cache.get(&key) {
            if let Ok(hit) = any.downcast::<Vec<K>>() {
                debug!(key = %key, "query cache hit");
                return hit;
            }
        }

        let api_version = K::api_version(&());
        let kind = K::kind(&());

        let items: Vec<K> = self
            .template
            .objects()
            .iter()
            .filter(|o| o.api_version() == api_version && o.kind() == kind)
            .filter_map(|o| {
                serde_json::to_value(o)
                    .and_then(serde_json::from_value::<K>)
                    .map_err(|e| warn!(object = %o.display_name(), "cannot convert object: {}", e))
                    .ok()
            })
            .filter(|k| filter(k))
            .collect();

        let items = Arc::new(items);
        self.cache.insert(key, Cached::Typed(items.clone()));
        items
    }

    fn typed_by_name<K>(&self, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = cache_key(name, &typed_token::<K>(), None);
        self.run_typed_query::<K, _>(key, |k| k.meta().name.as_deref() == Some(name))
            .first()
            .cloned()
    }

    fn typed_by_labels<K>(&self, labels: &BTreeMap<String, String>) -> Arc<Vec<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + Sync + 'static,
    {
        let key = cache_key(ANYTHING, &typed_token::<K>(), Some(labels));
        self.run_typed_query::<K, _>(key, |k| has_labels(k.labels(), labels))
    }

    fn typed_by_component<K>(&self, component: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let labels = BTreeMap::from([(APP_LABEL.to_string(), component.to_string())]);
        self.typed_by_labels::<K>(&labels).first().cloned()
    }
}

macro_rules! typed_queries {
    ($($kind:ty => $by_name:ident, $by_labels:ident, $by_component:ident;)*) => {
        impl<'t> Query<'t> {
            $(
                pub fn $by_name(&self, name: &str) -> Option<$kind> {
                    self.typed_by_name::<$kind>(name)
                }

                pub fn $by_labels(&self, labels: &BTreeMap<String, String>) -> Arc<Vec<$kind>> {
                    self.typed_by_labels::<$kind>(labels)
                }

                pub fn $by_component(&self, component: &str) -> Option<$kind> {
                    self.typed_by_component::<$kind>(component)
                }
            )*
        }
    };
}

typed_queries! {
    ConfigMap => config_map_by_name, config_maps_by_labels, config_map_by_component;
    Deployment => deployment_by_name, deployments_by_labels, deployment_by_component;
    Job => job_by_name, jobs_by_labels, job_by_component;
    Secret => secret_by_name, secrets_by_labels, secret_by_component;
    Service => service_by_name, services_by_labels, service_by_component;
    StatefulSet => stateful_set_by_name, stateful_sets_by_labels, stateful_set_by_component;
    Ingress => ingress_by_name, ingresses_by_labels, ingress_by_component;
    CronJob => cron_job_by_name, cron_jobs_by_labels, cron_job_by_component;
    HorizontalPodAutoscaler => hpa_by_name, hpas_by_labels, hpa_by_component;
    NetworkPolicy => network_policy_by_name, network_policies_by_labels, network_policy_by_component;
    PersistentVolumeClaim => pvc_by_name, pvcs_by_labels, pvc_by_component;
    ServiceAccount => service_account_by_name, service_accounts_by_labels, service_account_by_component;
}
