//! Reconcile command - run one reconcile against the current cluster

use console::style;
use gitlab_operator::{GitLab, OperatorSettings, Reconciler};
use gitlab_operator_kube::KubeObjectClient;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde_json::json;
use std::path::Path;
use tracing::warn;

pub async fn run(resource_path: &Path, no_hooks: bool, settings: &OperatorSettings) -> Result<()> {
    let manifest = super::load_resource(resource_path)?;
    let name = manifest.name_any();
    let namespace = manifest
        .namespace()
        .ok_or_else(|| miette::miette!("{} has no metadata.namespace", resource_path.display()))?;

    let catalog = gitlab_operator_core::global::populate(&settings.populate_config())
        .into_diagnostic()
        .wrap_err("Failed to load charts")?;

    let client = Client::try_default()
        .await
        .into_diagnostic()
        .wrap_err("Failed to connect to Kubernetes")?;

    // The live object carries the uid and status the manifest lacks.
    let api: Api<GitLab> = Api::namespaced(client.clone(), &namespace);
    let mut resource = api
        .get(&name)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("GitLab {}/{} not found in the cluster", namespace, name))?;

    let object_client = KubeObjectClient::new(client)
        .await
        .into_diagnostic()
        .wrap_err("Failed to discover served API groups")?;
    let mut reconciler = Reconciler::new(object_client, catalog, settings)?;
    if no_hooks {
        reconciler = reconciler.disable_hooks();
    }

    let result = reconciler.reconcile(&mut resource).await;

    let patch = json!({ "status": resource.status });
    if let Err(e) = api
        .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        warn!(resource = %name, error = %e, "failed to update status");
    }

    let summary = result?;

    for warning in &summary.warnings {
        eprintln!(
            "{} {}: {}",
            style("warning").yellow().bold(),
            warning.source,
            warning.message
        );
    }

    println!(
        "{} GitLab {}/{}: {}",
        style("✓").green().bold(),
        namespace,
        name,
        summary
    );
    if let Some(status) = &resource.status {
        println!("  Phase:   {}", style(&status.phase).cyan());
        println!("  Version: {}", status.version);
    }

    Ok(())
}
