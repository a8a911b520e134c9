//! Operator error types

use gitlab_operator_core::CoreError;
use gitlab_operator_engine::EngineError;
use gitlab_operator_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum OperatorError {
    #[error("invalid version format {version}")]
    #[diagnostic(
        code(gitlab_operator::version),
        help("spec.chart.version must be a semantic version such as 7.2.0")
    )]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("{name} chart version {version} not found; use one of {available}")]
    #[diagnostic(code(gitlab_operator::chart_not_found))]
    ChartNotFound {
        name: String,
        version: String,
        available: String,
    },

    #[error("failed to render: {template}")]
    #[diagnostic(code(gitlab_operator::values))]
    ValuesTemplate {
        template: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("can not merge values from: {template}")]
    #[diagnostic(code(gitlab_operator::values))]
    ValuesMerge {
        template: &'static str,
        #[source]
        source: CoreError,
    },

    #[error("failed to edit rendered objects: {0}")]
    #[diagnostic(code(gitlab_operator::edit))]
    Edit(String),

    #[error("{0}")]
    #[diagnostic(code(gitlab_operator::resource))]
    Resource(String),

    #[error(transparent)]
    #[diagnostic(code(gitlab_operator::core))]
    Core(#[from] CoreError),

    #[error(transparent)]
    #[diagnostic(code(gitlab_operator::engine))]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(code(gitlab_operator::kube))]
    Kube(#[from] KubeError),
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = OperatorError::ChartNotFound {
            name: "gitlab".to_string(),
            version: "1.2.3".to_string(),
            available: "7.0.0, 7.1.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gitlab chart version 1.2.3 not found; use one of 7.0.0, 7.1.0"
        );

        let source = semver::Version::parse("not-a-version").unwrap_err();
        let err = OperatorError::InvalidVersion {
            version: "not-a-version".to_string(),
            source,
        };
        assert_eq!(err.to_string(), "invalid version format not-a-version");
    }
}
