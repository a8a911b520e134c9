//! Chart renderer
//!
//! Rendering is a client-side dry-run install: nothing is looked up in a
//! cluster, capabilities come from the builder, and the release is always a
//! first revision.

use gitlab_operator_core::chart::evaluate_condition;
use gitlab_operator_core::objects::ObjectExt;
use gitlab_operator_core::{Catalog, Chart, CoreError, DynamicObject, Values};
use minijinja::{Value, context};
use std::path::Path;
use tracing::{debug, warn};

use crate::engine::{Engine, RenderedFile};
use crate::error::{EngineError, Result};
use crate::template::{RenderWarning, RenderedTemplate};

pub const DEFAULT_RELEASE_NAME: &str = "ephemeral";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_KUBE_VERSION: &str = "v1.31.0";

const HOOK_ANNOTATION: &str = "helm.sh/hook";
const HOOK_WEIGHT_ANNOTATION: &str = "helm.sh/hook-weight";

/// Group/versions every supported cluster serves
const DEFAULT_API_VERSIONS: &[&str] = &[
    "v1",
    "admissionregistration.k8s.io/v1",
    "apiextensions.k8s.io/v1",
    "apps/v1",
    "autoscaling/v1",
    "autoscaling/v2",
    "batch/v1",
    "coordination.k8s.io/v1",
    "networking.k8s.io/v1",
    "policy/v1",
    "rbac.authorization.k8s.io/v1",
    "scheduling.k8s.io/v1",
    "storage.k8s.io/v1",
];

/// Kinds in the order they are installed; unknown kinds come last
const INSTALL_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "SecretList",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleList",
    "ClusterRoleBinding",
    "ClusterRoleBindingList",
    "Role",
    "RoleList",
    "RoleBinding",
    "RoleBindingList",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "IngressClass",
    "Ingress",
    "APIService",
];

fn install_rank(kind: &str) -> usize {
    INSTALL_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(INSTALL_ORDER.len())
}

/// Builds and renders a chart
#[derive(Debug, Clone)]
pub struct Builder {
    chart: Chart,
    namespace: String,
    release_name: String,
    hooks_disabled: bool,
    kube_version: String,
    api_versions: Vec<String>,
    engine: Engine,
}

impl Builder {
    pub fn new(chart: Chart) -> Self {
        Self {
            chart,
            namespace: DEFAULT_NAMESPACE.to_string(),
            release_name: DEFAULT_RELEASE_NAME.to_string(),
            hooks_disabled: false,
            kube_version: DEFAULT_KUBE_VERSION.to_string(),
            api_versions: Vec::new(),
            engine: Engine::default(),
        }
    }

    /// Load the chart from a directory or archive on disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Chart::load(path)?))
    }

    /// Use the first chart of a catalog
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let chart = catalog.first().ok_or_else(|| CoreError::Operation {
            message: "the specified chart not found".to_string(),
        })?;
        Ok(Self::new(chart.clone()))
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    pub fn release_name(&self) -> &str {
        &self.release_name
    }

    pub fn set_release_name(&mut self, release_name: impl Into<String>) {
        self.release_name = release_name.into();
    }

    pub fn hooks_disabled(&self) -> bool {
        self.hooks_disabled
    }

    pub fn disable_hooks(&mut self) {
        self.hooks_disabled = true;
    }

    pub fn enable_hooks(&mut self) {
        self.hooks_disabled = false;
    }

    /// Kubernetes version reported to templates, e.g. `v1.29.4`
    pub fn set_kube_version(&mut self, version: impl Into<String>) -> Result<()> {
        let version = version.into();
        parse_kube_version(&version)?;
        self.kube_version = version;
        Ok(())
    }

    /// Extra group/versions reported on top of the built-in ones
    pub fn set_api_versions<I, S>(&mut self, versions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_versions = versions.into_iter().map(Into::into).collect();
    }

    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Render the chart with the given values
    ///
    /// Documents that fail to decode become warnings; template errors are
    /// returned.
    pub fn render(&self, values: &Values) -> Result<RenderedTemplate> {
        let mut values = values.clone();
        values.coalesce_with(&self.chart.values);

        let capabilities = self.capabilities()?;
        let mut files = Vec::new();
        self.render_chart(&self.chart, &values, self.chart.name(), &capabilities, &mut files)?;

        let mut manifests = Vec::new();
        let mut hooks = Vec::new();

        for file in &files {
            for doc in split_documents(&file.content) {
                match hook_weight(doc) {
                    Some(weight) => hooks.push((weight, file.path.as_str(), doc)),
                    None => manifests.push((file.path.as_str(), doc)),
                }
            }
        }

        manifests.sort_by_cached_key(|(_, doc)| install_rank(&peek_kind(doc)));
        hooks.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut template =
            RenderedTemplate::new(&self.release_name, &self.namespace, self.hooks_disabled);

        for (path, doc) in manifests {
            decode_into(&mut template, path, doc);
        }

        if self.hooks_disabled {
            debug!(count = hooks.len(), "hooks disabled, skipping hook documents");
        } else {
            for (index, (_, path, doc)) in hooks.into_iter().enumerate() {
                let content = format!("# Hook: {}\n{}\n", path, doc);
                decode_into(&mut template, &format!("hook-{}", index), &content);
            }
        }

        for warning in template.warnings() {
            warn!(source = %warning.source, "{}", warning.message);
        }

        debug!(
            chart = %self.chart.name(),
            version = %self.chart.version(),
            objects = template.objects().len(),
            "rendered chart"
        );

        Ok(template)
    }

    fn capabilities(&self) -> Result<Value> {
        let (major, minor) = parse_kube_version(&self.kube_version)?;
        let api_versions: Vec<String> = DEFAULT_API_VERSIONS
            .iter()
            .map(|v| v.to_string())
            .chain(self.api_versions.iter().cloned())
            .collect();

        Ok(context! {
            kubeVersion => context! {
                version => &self.kube_version,
                major => major,
                minor => minor,
            },
            apiVersions => api_versions,
        })
    }

    fn render_chart(
        &self,
        chart: &Chart,
        values: &Values,
        base_path: &str,
        capabilities: &Value,
        files: &mut Vec<RenderedFile>,
    ) -> Result<()> {
        let ctx = context! {
            values => Value::from_serialize(values.inner()),
            release => context! {
                name => &self.release_name,
                namespace => &self.namespace,
                service => "Helm",
                isInstall => true,
                isUpgrade => false,
                revision => 1,
            },
            chart => context! {
                name => chart.name(),
                version => chart.version(),
                appVersion => chart.app_version(),
            },
            capabilities => capabilities.clone(),
        };

        files.extend(self.engine.render_templates(chart.templates(), base_path, &ctx)?);

        for subchart in chart.dependencies() {
            let declared = chart.dependency_for(subchart);
            let key = declared.map_or(subchart.name(), |d| d.effective_name());

            if let Some(condition) = declared.and_then(|d| d.condition.as_deref()) {
                if !evaluate_condition(condition, values) {
                    debug!(chart = %subchart.name(), condition = %condition, "sub-chart disabled");
                    continue;
                }
            }

            let mut scoped = values.scope_for_subchart(key);
            scoped.coalesce_with(&subchart.values);

            let path = format!("{}/charts/{}", base_path, subchart.name());
            self.render_chart(subchart, &scoped, &path, capabilities, files)?;
        }

        Ok(())
    }
}

/// (major, minor) of `v1.29.4` style versions
fn parse_kube_version(version: &str) -> Result<(String, String)> {
    let parsed = semver::Version::parse(version.trim_start_matches('v')).map_err(|_| {
        EngineError::InvalidKubeVersion {
            version: version.to_string(),
        }
    })?;
    Ok((parsed.major.to_string(), parsed.minor.to_string()))
}

/// Split a multi-document YAML stream, dropping empty and comment-only parts
fn split_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter()
        .map(str::trim)
        .filter(|doc| {
            doc.lines()
                .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        })
        .collect()
}

fn peek(doc: &str) -> Option<serde_yaml::Value> {
    serde_yaml::from_str(doc).ok()
}

fn peek_kind(doc: &str) -> String {
    peek(doc)
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string))
        .unwrap_or_default()
}

/// Hook weight of a hook document, `None` for regular manifests
fn hook_weight(doc: &str) -> Option<i64> {
    let value = peek(doc)?;
    let annotations = value.get("metadata")?.get("annotations")?;
    annotations.get(HOOK_ANNOTATION)?;

    let weight = annotations
        .get(HOOK_WEIGHT_ANNOTATION)
        .and_then(|w| match w {
            serde_yaml::Value::Number(n) => n.as_i64(),
            serde_yaml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0);
    Some(weight)
}

fn decode_into(template: &mut RenderedTemplate, source: &str, doc: &str) {
    let decoded = serde_yaml::from_str::<DynamicObject>(doc)
        .map_err(|e| e.to_string())
        .and_then(|object| {
            if object.api_version().is_empty() {
                Err("Object 'apiVersion' is missing".to_string())
            } else if object.kind().is_empty() {
                Err("Object 'Kind' is missing".to_string())
            } else {
                Ok(object)
            }
        });

    match decoded {
        Ok(object) => template.add_object(object),
        Err(message) => template.push_warning(RenderWarning {
            source: source.to_string(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlab_operator_core::{ChartMetadata, ChartTemplate};
    use kube::ResourceExt;

    fn metadata(yaml: &str) -> ChartMetadata {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn template(name: &str, data: &str) -> ChartTemplate {
        ChartTemplate {
            name: name.to_string(),
            data: data.to_string(),
        }
    }

    fn chart() -> Chart {
        let registry = Chart::new(
            metadata("name: registry\nversion: 0.1.0\n"),
            Values::from_yaml("replicas: 1\n").unwrap(),
            vec![template(
                "templates/deployment.yaml",
                r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ release.name }}-registry
spec:
  replicas: {{ values.replicas }}
  selector:
    matchLabels:
      app: registry
  template:
    metadata:
      labels:
        app: registry
        edition: {{ values.global.edition }}
"#,
            )],
            vec![],
        );

        Chart::new(
            metadata(
                r#"
name: gitlab
version: 6.0.0
appVersion: 15.0.0
dependencies:
  - name: registry
    version: 0.1.0
    condition: registry.enabled
"#,
            ),
            Values::from_yaml("global:\n  edition: ee\nregistry:\n  enabled: true\n").unwrap(),
            vec![
                template(
                    "templates/_helpers.tpl",
                    "{% macro name(release) %}{{ release.name }}-gitlab{% endmacro %}",
                ),
                template(
                    "templates/all.yaml",
                    r#"{% import "templates/_helpers.tpl" as h %}
apiVersion: v1
kind: Service
metadata:
  name: {{ h.name(release) }}
---
# only a comment
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ h.name(release) }}
  namespace: {{ release.namespace }}
data:
  version: "{{ chart.appVersion }}"
  kube: "{{ capabilities.kubeVersion.minor }}"
"#,
                ),
                template(
                    "templates/hooks.yaml",
                    r#"apiVersion: batch/v1
kind: Job
metadata:
  name: late
  annotations:
    helm.sh/hook: post-install
    helm.sh/hook-weight: "5"
---
apiVersion: batch/v1
kind: Job
metadata:
  name: early
  annotations:
    helm.sh/hook: pre-install
    helm.sh/hook-weight: "-1"
"#,
                ),
                template("templates/broken.yaml", "metadata:\n  name: no-kind\n"),
            ],
            vec![registry],
        )
    }

    fn names(template: &RenderedTemplate) -> Vec<String> {
        template.objects().iter().map(|o| o.name_any()).collect()
    }

    #[test]
    fn test_builder_defaults() {
        let mut builder = Builder::new(chart());
        assert_eq!(builder.release_name(), "ephemeral");
        assert_eq!(builder.namespace(), "default");
        assert!(!builder.hooks_disabled());

        builder.disable_hooks();
        assert!(builder.hooks_disabled());
        builder.enable_hooks();
        assert!(!builder.hooks_disabled());

        assert!(builder.set_kube_version("not-a-version").is_err());
        assert!(builder.set_kube_version("v1.28.2").is_ok());
    }

    #[test]
    fn test_render_orders_manifests_then_hooks() {
        let mut builder = Builder::new(chart());
        builder.set_release_name("gitlab");
        builder.set_namespace("gitlab-system");

        let template = builder.render(&Values::new()).unwrap();

        assert_eq!(
            names(&template),
            vec!["gitlab-gitlab", "gitlab-gitlab", "gitlab-registry", "early", "late"]
        );
        assert_eq!(template.objects()[0].kind(), "ConfigMap");
        assert_eq!(template.objects()[1].kind(), "Service");
        assert_eq!(template.release_name(), "gitlab");
        assert_eq!(template.namespace(), "gitlab-system");
    }

    #[test]
    fn test_render_context() {
        let mut builder = Builder::new(chart());
        builder.set_release_name("gitlab");
        builder.set_namespace("gitlab-system");
        builder.set_kube_version("v1.28.2").unwrap();

        let template = builder.render(&Values::new()).unwrap();
        let cm = template.query().object_by_kind_and_name("ConfigMap", "gitlab-gitlab").unwrap();

        assert_eq!(cm.data["data"]["version"], "15.0.0");
        assert_eq!(cm.data["data"]["kube"], "28");
        assert_eq!(cm.namespace().as_deref(), Some("gitlab-system"));
    }

    #[test]
    fn test_subchart_values_are_scoped() {
        let user = Values::from_yaml("global:\n  edition: ce\nregistry:\n  replicas: 3\n").unwrap();
        let template = Builder::new(chart()).render(&user).unwrap();

        let deployment = template
            .query()
            .deployment_by_name("ephemeral-registry")
            .unwrap();
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(
            spec.template.metadata.unwrap().labels.unwrap()["edition"],
            "ce"
        );
    }

    #[test]
    fn test_disabled_subchart_is_skipped() {
        let user = Values::from_yaml("registry:\n  enabled: false\n").unwrap();
        let template = Builder::new(chart()).render(&user).unwrap();

        assert!(template.query().objects_by_kind("Deployment").is_empty());
    }

    #[test]
    fn test_hooks_can_be_disabled() {
        let mut builder = Builder::new(chart());
        builder.disable_hooks();

        let template = builder.render(&Values::new()).unwrap();
        assert!(template.query().objects_by_kind("Job").is_empty());
        assert!(template.hooks_disabled());
    }

    #[test]
    fn test_undecodable_documents_become_warnings() {
        let template = Builder::new(chart()).render(&Values::new()).unwrap();

        assert_eq!(template.warnings().len(), 1);
        assert_eq!(template.warnings()[0].source, "gitlab/templates/broken.yaml");
        assert!(template.warnings()[0].message.contains("apiVersion"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let builder = Builder::new(chart());
        let a = builder.render(&Values::new()).unwrap();
        let b = builder.render(&Values::new()).unwrap();
        assert_eq!(a.objects(), b.objects());
    }

    #[test]
    fn test_template_errors_are_fatal() {
        let broken = Chart::new(
            metadata("name: broken\nversion: 1.0.0\n"),
            Values::new(),
            vec![template("templates/x.yaml", "{{ fail(\"unsupported\") }}")],
            vec![],
        );
        assert!(matches!(
            Builder::new(broken).render(&Values::new()),
            Err(EngineError::Template(_))
        ));
    }

    #[test]
    fn test_from_catalog_requires_a_chart() {
        let err = Builder::from_catalog(&Catalog::new()).unwrap_err();
        assert_eq!(err.to_string(), "the specified chart not found");
    }

    #[test]
    fn test_split_documents() {
        let docs = split_documents("a: 1\n---\n# comment\n---\n\nb: 2\n--- \nc: 3");
        assert_eq!(docs, vec!["a: 1", "b: 2", "c: 3"]);
    }
}
