//! Charts command - list the bundled charts

use console::style;
use gitlab_operator::OperatorSettings;
use gitlab_operator_core::Catalog;
use miette::{IntoDiagnostic, Result, WrapErr};

pub fn run(settings: &OperatorSettings) -> Result<()> {
    let mut catalog = Catalog::new();
    catalog
        .populate(&settings.populate_config())
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to load charts from {}", settings.charts_dir.display()))?;

    if catalog.is_empty() {
        println!(
            "No charts found in {}",
            style(settings.charts_dir.display()).cyan()
        );
        return Ok(());
    }

    println!(
        "{:<30} {:<15} {:<15}",
        style("NAME").bold(),
        style("VERSION").bold(),
        style("APP VERSION").bold()
    );

    for chart in catalog.iter() {
        println!(
            "{:<30} {:<15} {:<15}",
            chart.name(),
            chart.version(),
            chart.metadata.app_version.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
