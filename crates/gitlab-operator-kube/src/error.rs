//! Error types for gitlab-operator-kube

use gitlab_operator_core::CoreError;
use thiserror::Error;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Required configuration is missing
    #[error("{0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The patch would change the identity of the object
    #[error("at least one of apiVersion, kind and name was changed: {object}")]
    PreconditionFailed { object: String },

    /// The patch overwrites a change made on the server
    #[error("conflict detected on {object}: {message}")]
    Conflict { object: String, message: String },

    /// The server does not serve the resource type
    #[error("unknown resource type: {0}")]
    UnknownResource(String),

    /// A cluster call failed for a specific object
    #[error("{action}: {object}: {source}")]
    Object {
        action: &'static str,
        object: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Object model error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Attach the failed action and the object it was running on
    pub fn for_object(self, action: &'static str, object: impl Into<String>) -> Self {
        KubeError::Object {
            action,
            object: object.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::Object { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a conflict, either from the server (409) or from
    /// patch computation
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            KubeError::Conflict { .. } => true,
            KubeError::Object { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_classification_looks_through_context() {
        assert!(api_error(404).is_not_found());
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_not_found());

        let wrapped = api_error(404).for_object("failed to obtain current configuration", "gitlab/web");
        assert!(wrapped.is_not_found());
        assert!(wrapped.to_string().starts_with("failed to obtain current configuration: gitlab/web:"));
    }
}
