//! CLI command implementations

pub mod charts;
pub mod reconcile;
pub mod template;

use gitlab_operator::GitLab;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::Path;

/// Read a GitLab resource from a YAML manifest
pub fn load_resource(path: &Path) -> Result<GitLab> {
    let content = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;

    serde_yaml::from_str(&content)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a GitLab resource", path.display()))
}
