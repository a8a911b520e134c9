//! GitLab Operator - deploys GitLab from its Helm chart
//!
//! The operator reads a `GitLab` custom resource, renders the requested chart
//! version with the resource's values, applies the result and prunes objects
//! the chart no longer produces:
//! - `resource`: the `apps.gitlab.com/v1beta1` GitLab resource
//! - `adapter`: chart selection, values, features and status for one resource
//! - `reconcile`: render, apply and prune
//! - `settings`: process-wide configuration from flags and environment

pub mod adapter;
pub mod error;
pub mod reconcile;
pub mod resource;
pub mod settings;

pub use adapter::GitLabAdapter;
pub use error::{OperatorError, Result};
pub use reconcile::{ReconcileSummary, Reconciler, render};
pub use resource::{GitLab, GitLabChartSpec, GitLabSpec, GitLabStatus};
pub use settings::OperatorSettings;
