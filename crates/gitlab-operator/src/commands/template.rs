//! Template command - render a GitLab resource locally

use console::style;
use gitlab_operator::resource::ValueProvider;
use gitlab_operator::{GitLabAdapter, OperatorSettings};
use gitlab_operator_core::{ObjectExt, Selector};
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::Path;
use tracing::debug;

pub fn run(
    resource_path: &Path,
    component: Option<&str>,
    show_values: bool,
    no_hooks: bool,
    settings: &OperatorSettings,
) -> Result<()> {
    let resource = super::load_resource(resource_path)?;
    let catalog = gitlab_operator_core::global::populate(&settings.populate_config())
        .into_diagnostic()
        .wrap_err("Failed to load charts")?;
    debug!(charts = catalog.len(), "loaded catalog");

    let adapter = GitLabAdapter::new(resource, catalog, settings)?;

    if show_values {
        println!("{}", style("# Computed Values").cyan().bold());
        println!("---");
        let yaml = serde_yaml::to_string(adapter.values().inner())
            .into_diagnostic()
            .wrap_err("Failed to serialize values")?;
        println!("{}", yaml);
        println!("---");
        println!();
    }

    let template = gitlab_operator::render(&adapter, settings, no_hooks)?;

    let objects = match component {
        Some(component) => template.get_objects(&Selector::by_component(component)),
        None => template.objects().iter().collect(),
    };

    let mut first = true;
    for object in objects {
        if !first {
            println!("---");
        }
        first = false;

        let yaml = serde_yaml::to_string(object)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to serialize {}", object.display_name()))?;
        println!("{}", style(format!("# Source: {}", object.display_name())).dim());
        println!("{}", yaml.trim());
    }

    for warning in template.warnings() {
        eprintln!(
            "{} {}: {}",
            style("warning").yellow().bold(),
            warning.source,
            warning.message
        );
    }

    Ok(())
}
