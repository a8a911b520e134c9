//! One reconcile pass of a GitLab resource
//!
//! Renders the requested chart, applies every object to the cluster and
//! deletes owned objects the chart no longer produces. Status conditions are
//! written to the resource as the pass goes, whether it succeeds or not.

use gitlab_operator_core::objects::editor::{set_labels, set_namespace, set_owner_reference};
use gitlab_operator_core::objects::selector::labels;
use gitlab_operator_core::{Catalog, ObjectExt};
use gitlab_operator_engine::{Builder, RenderWarning, RenderedTemplate};
use gitlab_operator_kube::{Applier, ApplyOutcome, ObjectClient};
use kube::ResourceExt;
use std::fmt;
use tracing::{debug, info};

use crate::adapter::{ConditionType, GitLabAdapter};
use crate::error::{OperatorError, Result};
use crate::resource::{ChartConsumer, CustomResourceWrapper, GitLab, ValueProvider};
use crate::settings::OperatorSettings;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

const PART_OF: &str = "gitlab";
const MANAGED_BY: &str = "gitlab-operator";

/// What a reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub warnings: Vec<RenderWarning>,
}

impl ReconcileSummary {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} pruned",
            self.created, self.updated, self.unchanged, self.pruned
        )
    }
}

/// Renders a GitLab resource's chart with the operator's settings
///
/// Objects are placed in the resource's namespace and labelled. They are owned
/// by the resource once it has been persisted; a resource read from a local
/// file has no uid and its objects carry no owner. Components are read from
/// the chart's own `app` labels.
pub fn render(
    adapter: &GitLabAdapter,
    settings: &OperatorSettings,
    hooks_disabled: bool,
) -> Result<RenderedTemplate> {
    let chart = adapter
        .charts()
        .first()
        .ok_or_else(|| {
            OperatorError::Resource(format!("no chart prepared for {}", adapter.name()))
        })?;

    let mut builder = Builder::new(chart.clone());
    builder.set_namespace(adapter.namespace());
    builder.set_release_name(adapter.release_name());
    if let Some(version) = &settings.kube_version {
        builder.set_kube_version(version.as_str())?;
    }
    builder.set_api_versions(settings.kube_api_versions.iter().cloned());
    if hooks_disabled {
        builder.disable_hooks();
    }

    let mut template = builder.render(adapter.values())?;

    let common = labels([
        (LABEL_NAME, adapter.release_name()),
        (LABEL_PART_OF, PART_OF),
        (LABEL_MANAGED_BY, MANAGED_BY),
    ]);

    let mut editors = vec![
        set_namespace(adapter.namespace()),
        set_labels(common),
        set_component_labels(adapter.release_name()),
    ];
    if let Ok(owner) = adapter.owner_reference() {
        editors.push(set_owner_reference(owner));
    }
    let edited = template
        .edit_objects(&editors)
        .map_err(|e| OperatorError::Edit(e.to_string()))?;
    debug!(resource = %adapter.name(), objects = edited, "edited rendered objects");

    Ok(template)
}

/// Labels an object with its component and `<release>-<component>` instance
///
/// The component comes from the chart's `app` label. Objects without one are
/// labelled with the bare release name as instance.
fn set_component_labels(release: &str) -> gitlab_operator_core::Editor {
    let release = release.to_string();
    gitlab_operator_core::Editor::new(move |o| {
        if let Some(app) = o.labels().get("app").cloned() {
            o.labels_mut().entry(LABEL_COMPONENT.to_string()).or_insert(app);
        }
        let instance = match o.labels().get(LABEL_COMPONENT) {
            Some(component) => format!("{}-{}", release, component),
            None => release.clone(),
        };
        o.labels_mut().insert(LABEL_INSTANCE.to_string(), instance);
        Ok(())
    })
}

pub struct Reconciler<'a> {
    catalog: &'a Catalog,
    settings: &'a OperatorSettings,
    applier: Applier,
    hooks_disabled: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new<C: ObjectClient + 'static>(
        client: C,
        catalog: &'a Catalog,
        settings: &'a OperatorSettings,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            settings,
            applier: Applier::builder().client(client).build()?,
            hooks_disabled: false,
        })
    }

    /// Leave hook documents out of the rendered chart
    pub fn disable_hooks(mut self) -> Self {
        self.hooks_disabled = true;
        self
    }

    /// Bring the cluster in line with the resource
    ///
    /// Status changes are written back to `resource` even when the pass fails
    /// part way; the caller persists them.
    pub async fn reconcile(&self, resource: &mut GitLab) -> Result<ReconcileSummary> {
        let mut adapter = GitLabAdapter::new(resource.clone(), self.catalog, self.settings)?;

        let result = self.run(&mut adapter).await;
        *resource = adapter.into_resource();
        result
    }

    async fn run(&self, adapter: &mut GitLabAdapter) -> Result<ReconcileSummary> {
        let name = adapter.name();
        let upgrading = adapter.is_upgrade();
        adapter.owner_reference()?;

        if adapter.is_install() {
            info!(resource = %name, version = %adapter.desired_version(), "installing GitLab");
            adapter.set_condition(ConditionType::Initialized.with_status(
                true,
                "Installing",
                format!("installing chart version {}", adapter.desired_version()),
            ));
        } else if upgrading {
            info!(
                resource = %name,
                from = %adapter.current_version(),
                to = %adapter.desired_version(),
                "upgrading GitLab"
            );
            adapter.set_condition(ConditionType::Upgrading.with_status(
                true,
                "Upgrading",
                format!(
                    "upgrading from {} to {}",
                    adapter.current_version(),
                    adapter.desired_version()
                ),
            ));
        }

        let template = render(adapter, self.settings, self.hooks_disabled)?;
        debug!(
            resource = %name,
            hash = %adapter.hash(),
            objects = template.objects().len(),
            "rendered chart"
        );

        let mut summary = ReconcileSummary {
            warnings: template.warnings().to_vec(),
            ..Default::default()
        };

        adapter.populate_managed_objects(template.into_objects());

        for object in adapter.target_objects() {
            let outcome = self.applier.apply(object).await?;
            debug!(object = %object.display_name(), %outcome, "applied");
            summary.record(outcome);
        }

        let client = self.applier.client();
        let current = adapter.current_objects(client.as_ref()).await?;
        for object in current.difference(adapter.target_objects()).iter() {
            let deleted = client
                .delete(&object.gvk(), object.metadata.namespace.as_deref(), &object.name_any())
                .await?;
            if deleted {
                info!(object = %object.display_name(), "pruned object");
                summary.pruned += 1;
            }
        }

        if upgrading {
            adapter.set_condition(ConditionType::Upgrading.with_status(
                false,
                "UpgradeCompleted",
                format!("upgraded to {}", adapter.desired_version()),
            ));
        }
        adapter.record_version();
        adapter.set_condition(ConditionType::Available.with_status(
            true,
            "ReconcileSucceeded",
            summary.to_string(),
        ));

        info!(resource = %name, %summary, "reconciled GitLab");
        Ok(summary)
    }
}
