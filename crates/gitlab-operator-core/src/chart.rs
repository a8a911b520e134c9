//! Chart definition and loading
//!
//! A chart is loaded either from a directory holding `Chart.yaml` or from a
//! gzipped archive. Both go through the same in-memory file map so they
//! produce identical charts.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::archive::{self, ChartFiles};
use crate::error::{CoreError, Result};
use crate::values::Values;

/// Name of the chart metadata file
pub const CHART_FILE: &str = "Chart.yaml";
/// Name of the default values file
pub const VALUES_FILE: &str = "values.yaml";

const TEMPLATES_DIR: &str = "templates/";
const CHARTS_DIR: &str = "charts/";

/// Chart metadata (`Chart.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,

    pub name: String,

    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub kube_version: Option<String>,

    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Dependency entry of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    /// Dot path evaluated against the parent values, e.g. `redis.install`
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,
}

impl ChartDependency {
    /// Name under which the sub-chart sees its values
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A template file of a chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartTemplate {
    /// Path relative to the chart root, e.g. `templates/deployment.yaml`
    pub name: String,
    pub data: String,
}

impl ChartTemplate {
    /// Helpers (`_helpers.tpl`) are never rendered on their own
    pub fn is_helper(&self) -> bool {
        self.name
            .rsplit('/')
            .next()
            .is_some_and(|file| file.starts_with('_'))
    }
}

/// A versioned chart with its default values, templates and sub-charts
///
/// Cloning copies metadata, values and sub-charts but shares the template
/// sources.
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub values: Values,
    templates: Arc<[ChartTemplate]>,
    dependencies: Vec<Chart>,
}

impl Chart {
    /// Assemble a chart from parts
    pub fn new(
        metadata: ChartMetadata,
        values: Values,
        templates: Vec<ChartTemplate>,
        dependencies: Vec<Chart>,
    ) -> Self {
        Self {
            metadata,
            values,
            templates: templates.into(),
            dependencies,
        }
    }

    /// Load a chart from a directory or an archive
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_dir(path)
        } else if path.is_file() {
            Self::load_archive(path)
        } else {
            Err(CoreError::ChartNotFound {
                path: path.display().to_string(),
            })
        }
    }

    /// Load a chart from an unpacked directory
    pub fn load_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !is_chart_dir(path) {
            return Err(CoreError::ChartNotFound {
                path: path.display().to_string(),
            });
        }
        let files = archive::read_directory(path)?;
        Self::from_files(files, &path.display().to_string(), &[])
    }

    /// Load a chart from a gzipped archive
    pub fn load_archive<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let files = archive::read_archive_file(path)?;
        Self::from_files(files, &path.display().to_string(), &[])
    }

    fn from_files(files: ChartFiles, origin: &str, ancestors: &[String]) -> Result<Self> {
        let invalid = |message: String| CoreError::InvalidChart {
            chart: origin.to_string(),
            message,
        };

        let raw_metadata = files
            .get(CHART_FILE)
            .ok_or_else(|| invalid(format!("missing {}", CHART_FILE)))?;
        let metadata: ChartMetadata = serde_yaml::from_slice(raw_metadata)
            .map_err(|e| invalid(format!("cannot parse {}: {}", CHART_FILE, e)))?;

        if metadata.name.is_empty() {
            return Err(invalid("chart name is required".to_string()));
        }
        semver::Version::parse(&metadata.version)
            .map_err(|e| invalid(format!("version '{}' is not semantic: {}", metadata.version, e)))?;

        if ancestors.contains(&metadata.name) {
            let mut chain = ancestors.to_vec();
            chain.push(metadata.name.clone());
            return Err(CoreError::DependencyCycle {
                chain: chain.join(" -> "),
            });
        }

        let values = match files.get(VALUES_FILE) {
            Some(raw) => {
                let text = String::from_utf8_lossy(raw);
                Values::from_yaml(&text).map_err(|e| invalid(e.to_string()))?
            }
            None => Values::new(),
        };

        let mut templates = Vec::new();
        for (name, raw) in files.range(TEMPLATES_DIR.to_string()..) {
            if !name.starts_with(TEMPLATES_DIR) {
                break;
            }
            let data = String::from_utf8(raw.clone())
                .map_err(|_| invalid(format!("{} is not valid UTF-8", name)))?;
            templates.push(ChartTemplate {
                name: name.clone(),
                data,
            });
        }

        let mut lineage = ancestors.to_vec();
        lineage.push(metadata.name.clone());

        let mut unpacked: BTreeMap<String, ChartFiles> = BTreeMap::new();
        let mut dependencies = Vec::new();
        for (name, raw) in files.range(CHARTS_DIR.to_string()..) {
            let Some(rest) = name.strip_prefix(CHARTS_DIR) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, inner)) => {
                    unpacked
                        .entry(dir.to_string())
                        .or_default()
                        .insert(inner.to_string(), raw.clone());
                }
                None if rest.ends_with(".tgz") || rest.ends_with(".tar.gz") => {
                    let nested = archive::read_archive(raw.as_slice())?;
                    let origin = format!("{}/{}", origin, name);
                    dependencies.push(Self::from_files(nested, &origin, &lineage)?);
                }
                None => {}
            }
        }

        for (dir, sub_files) in unpacked {
            if !sub_files.contains_key(CHART_FILE) {
                continue;
            }
            let origin = format!("{}/{}{}", origin, CHARTS_DIR, dir);
            dependencies.push(Self::from_files(sub_files, &origin, &lineage)?);
        }

        Ok(Self::new(metadata, values, templates, dependencies))
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn app_version(&self) -> Option<&str> {
        self.metadata.app_version.as_deref()
    }

    pub fn templates(&self) -> &[ChartTemplate] {
        &self.templates
    }

    pub fn dependencies(&self) -> &[Chart] {
        &self.dependencies
    }

    /// Whether both charts point at the same template sources
    pub fn shares_templates_with(&self, other: &Chart) -> bool {
        Arc::ptr_eq(&self.templates, &other.templates)
    }

    /// Dependency declaration for a bundled sub-chart, if `Chart.yaml` has one
    pub fn dependency_for(&self, subchart: &Chart) -> Option<&ChartDependency> {
        self.metadata
            .dependencies
            .iter()
            .find(|d| d.name == subchart.name())
    }
}

/// Whether `path` is a directory containing a chart metadata file
pub fn is_chart_dir(path: &Path) -> bool {
    path.is_dir() && path.join(CHART_FILE).is_file()
}

/// Evaluate a dependency condition such as `redis.install` against values
///
/// Several comma-separated paths may be given; the first one that resolves
/// to a boolean decides. Unresolved conditions leave the dependency enabled.
pub fn evaluate_condition(condition: &str, values: &Values) -> bool {
    for path in condition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(serde_json::Value::Bool(enabled)) = values.get(path) {
            return *enabled;
        }
    }
    true
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, got {:?}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {:?}",
            other
        ))),
    }
}
