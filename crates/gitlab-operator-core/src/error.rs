//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart {chart}: {message}")]
    InvalidChart { chart: String, message: String },

    #[error("Dependency cycle detected: {chain}")]
    DependencyCycle { chain: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("{message}")]
    ValueLookup { message: String },

    #[error("Failed to read values from {file}: {message}")]
    ValuesFile { file: String, message: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("unable to find any charts in search paths")]
    NoChartsFound,

    #[error("catalog is not empty")]
    CatalogNotEmpty,

    #[error("invalid object: {message}")]
    InvalidObject { message: String },

    #[error("{message}")]
    Operation { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
