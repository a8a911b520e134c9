//! Chart catalog
//!
//! The catalog is populated once, at process start, by walking a set of
//! search paths. Afterwards it is only read. Queries return deep copies so
//! that rendering can never alter the catalog.

use glob::Pattern;
use indexmap::IndexSet;
use once_cell::sync::{Lazy, OnceCell};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chart::{self, Chart};
use crate::error::{CoreError, Result};

/// A predicate over charts used by [`Catalog::query`]
#[derive(Clone)]
pub struct Criterion(Arc<dyn Fn(&Chart) -> bool + Send + Sync>);

impl Criterion {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Chart) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn matches(&self, chart: &Chart) -> bool {
        (self.0)(chart)
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Criterion")
    }
}

/// Charts named `name`
pub fn with_name(name: impl Into<String>) -> Criterion {
    let name = name.into();
    Criterion::new(move |c| c.name() == name)
}

/// Charts with exactly this version
pub fn with_version(version: impl Into<String>) -> Criterion {
    let version = version.into();
    Criterion::new(move |c| c.version() == version)
}

/// Charts with exactly this appVersion
pub fn with_app_version(app_version: impl Into<String>) -> Criterion {
    let app_version = app_version.into();
    Criterion::new(move |c| c.app_version() == Some(app_version.as_str()))
}

/// Matches when every criterion matches
pub fn all(criteria: Vec<Criterion>) -> Criterion {
    Criterion::new(move |c| criteria.iter().all(|k| k.matches(c)))
}

/// Matches when at least one criterion matches
pub fn any(criteria: Vec<Criterion>) -> Criterion {
    Criterion::new(move |c| criteria.iter().any(|k| k.matches(c)))
}

/// Matches when no criterion matches
pub fn none(criteria: Vec<Criterion>) -> Criterion {
    Criterion::new(move |c| !criteria.iter().any(|k| k.matches(c)))
}

/// Where and how to look for charts
#[derive(Debug, Clone)]
pub struct PopulateConfig {
    /// Directories walked depth-first (default: current directory)
    pub search_paths: Vec<PathBuf>,
    /// File name globs tried as chart archives (default: `*.tgz`)
    pub file_patterns: Vec<String>,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))],
            file_patterns: vec!["*.tgz".to_string()],
        }
    }
}

impl PopulateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn file_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered collection of charts, unique by (name, version)
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    charts: Vec<Chart>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    /// True when the catalog holds no charts
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn first(&self) -> Option<&Chart> {
        self.charts.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chart> {
        self.charts.iter()
    }

    /// Add a chart unless it lacks metadata or duplicates (name, version)
    ///
    /// Returns whether the chart was added.
    pub fn append(&mut self, chart: Chart) -> bool {
        if chart.name().is_empty() || chart.version().is_empty() {
            return false;
        }
        if self
            .charts
            .iter()
            .any(|c| c.name() == chart.name() && c.version() == chart.version())
        {
            return false;
        }
        self.charts.push(chart);
        true
    }

    /// Charts matching all criteria, deep-copied
    ///
    /// Without criteria the result is empty.
    pub fn query(&self, criteria: &[Criterion]) -> Catalog {
        if criteria.is_empty() {
            return Catalog::new();
        }

        Catalog {
            charts: self
                .charts
                .iter()
                .filter(|c| criteria.iter().all(|k| k.matches(c)))
                .cloned()
                .collect(),
        }
    }

    /// Distinct chart names in catalog order
    pub fn names(&self) -> Vec<String> {
        self.charts
            .iter()
            .map(|c| c.name().to_string())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct versions of the named chart
    pub fn versions(&self, name: &str) -> Vec<String> {
        self.charts
            .iter()
            .filter(|c| c.name() == name)
            .map(|c| c.version().to_string())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct appVersions of the named chart
    pub fn app_versions(&self, name: &str) -> Vec<String> {
        self.charts
            .iter()
            .filter(|c| c.name() == name)
            .filter_map(|c| c.app_version().map(str::to_string))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Walk the search paths and load every chart found
    ///
    /// Entries that fail to load are logged and skipped. Fails only when the
    /// catalog is still empty afterwards.
    pub fn populate(&mut self, config: &PopulateConfig) -> Result<usize> {
        let patterns = config
            .file_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| CoreError::InvalidPath {
                    path: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let before = self.charts.len();

        for root in &config.search_paths {
            let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();

            while let Some(entry) = walker.next() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!(path = %root.display(), "skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                let path = entry.path();

                if entry.file_type().is_dir() {
                    if chart::is_chart_dir(path) {
                        self.append_loaded(Chart::load_dir(path), path);
                        walker.skip_current_dir();
                    }
                    continue;
                }

                let file_name = entry.file_name().to_string_lossy();
                if entry.file_type().is_file() && patterns.iter().any(|p| p.matches(&file_name)) {
                    self.append_loaded(Chart::load_archive(path), path);
                }
            }
        }

        if self.charts.is_empty() {
            return Err(CoreError::NoChartsFound);
        }

        Ok(self.charts.len() - before)
    }

    fn append_loaded(&mut self, loaded: Result<Chart>, path: &std::path::Path) {
        match loaded {
            Ok(chart) => {
                let (name, version) = (chart.name().to_string(), chart.version().to_string());
                if self.append(chart) {
                    debug!(chart = %name, version = %version, path = %path.display(), "loaded chart");
                } else {
                    debug!(chart = %name, version = %version, "ignoring duplicate chart");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), "unable to load chart: {}", e);
            }
        }
    }
}

static GLOBAL_CATALOG: OnceCell<Catalog> = OnceCell::new();
static EMPTY_CATALOG: Lazy<Catalog> = Lazy::new(Catalog::new);
static POPULATE_LOCK: Mutex<()> = Mutex::new(());

/// Populate the process-wide catalog, exactly once
pub fn populate_global(config: &PopulateConfig) -> Result<&'static Catalog> {
    let _guard = POPULATE_LOCK.lock().map_err(|_| CoreError::Operation {
        message: "catalog lock poisoned".to_string(),
    })?;

    if GLOBAL_CATALOG.get().is_some() {
        return Err(CoreError::CatalogNotEmpty);
    }

    let mut catalog = Catalog::new();
    catalog.populate(config)?;

    GLOBAL_CATALOG
        .set(catalog)
        .map_err(|_| CoreError::CatalogNotEmpty)?;
    GLOBAL_CATALOG.get().ok_or(CoreError::CatalogNotEmpty)
}

/// The process-wide catalog; empty until [`populate_global`] succeeds
pub fn global_catalog() -> &'static Catalog {
    GLOBAL_CATALOG.get().unwrap_or(&EMPTY_CATALOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack_directory;
    use crate::chart::{ChartMetadata, ChartTemplate};
    use crate::values::Values;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn chart(name: &str, version: &str, app_version: &str) -> Chart {
        let metadata: ChartMetadata = serde_yaml::from_str(&format!(
            "name: {}\nversion: {}\nappVersion: \"{}\"\n",
            name, version, app_version
        ))
        .unwrap();
        Chart::new(
            metadata,
            Values::from_yaml("global:\n  edition: ee\n").unwrap(),
            vec![ChartTemplate {
                name: "templates/cm.yaml".to_string(),
                data: "kind: ConfigMap".to_string(),
            }],
            vec![],
        )
    }

    fn sample() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.append(chart("gitlab", "5.9.0", "14.9.0"));
        catalog.append(chart("gitlab", "6.0.0", "15.0.0"));
        catalog.append(chart("gitlab", "6.0.1", "15.0.0"));
        catalog.append(chart("gitlab-runner", "0.40.0", "15.0.0"));
        catalog
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// chart-1 (with a sub-chart), more-charts/chart-2, two archives and a non-chart
    fn scaffold(root: &Path) {
        write(root, "chart-1/Chart.yaml", "name: chart-1\nversion: 0.1.0\nappVersion: 1.0.0\n");
        write(root, "chart-1/templates/cm.yaml", "kind: ConfigMap\n");
        write(root, "chart-1/charts/sub-chart/Chart.yaml", "name: sub-chart\nversion: 0.1.0\n");
        write(root, "more-charts/chart-2/Chart.yaml", "name: chart-2\nversion: 0.2.0\nappVersion: 2.0.0\n");
        write(root, "not-chart/README.md", "nothing to see\n");

        let staging = TempDir::new().unwrap();
        write(staging.path(), "c1/Chart.yaml", "name: chart-1\nversion: 0.2.0\nappVersion: 1.1.0\n");
        write(staging.path(), "c2/Chart.yaml", "name: chart-2\nversion: 0.1.0\nappVersion: 2.0.0\n");
        fs::create_dir_all(root.join("tgz")).unwrap();
        pack_directory(&staging.path().join("c1"), "chart-1", &root.join("tgz/chart-1-0.2.0.tgz")).unwrap();
        pack_directory(&staging.path().join("c2"), "chart-2", &root.join("tgz/chart-2-0.1.0.tar.gz")).unwrap();
        write(root, "tgz/broken.tgz", "not an archive");
    }

    #[test]
    fn test_append_rejects_duplicates_and_missing_metadata() {
        let mut catalog = sample();
        assert_eq!(catalog.len(), 4);

        assert!(!catalog.append(chart("gitlab", "6.0.0", "15.0.0")));
        assert!(!catalog.append(chart("", "1.0.0", "1.0.0")));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_query_without_criteria_is_empty() {
        assert!(sample().query(&[]).is_empty());
    }

    #[test]
    fn test_query_by_name_and_version() {
        let catalog = sample();

        let result = catalog.query(&[with_name("gitlab"), with_version("6.0.0")]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.first().unwrap().app_version(), Some("15.0.0"));

        let result = catalog.query(&[with_app_version("15.0.0")]);
        assert_eq!(result.len(), 3);

        assert!(catalog.query(&[with_name("gitlab"), with_version("0.0.0")]).is_empty());
    }

    #[test]
    fn test_combinators() {
        let catalog = sample();

        let either = catalog.query(&[any(vec![with_version("5.9.0"), with_version("0.40.0")])]);
        assert_eq!(either.len(), 2);

        let not_runner = catalog.query(&[none(vec![with_name("gitlab-runner")])]);
        assert_eq!(not_runner.names(), vec!["gitlab"]);

        let both = catalog.query(&[all(vec![with_name("gitlab"), with_app_version("15.0.0")])]);
        assert_eq!(both.versions("gitlab"), vec!["6.0.0", "6.0.1"]);
    }

    #[test]
    fn test_query_returns_deep_copies() {
        let catalog = sample();
        let mut result = catalog.query(&[with_name("gitlab"), with_version("6.0.0")]);

        let original = catalog.query(&[with_version("6.0.0")]);
        assert_eq!(result.first().unwrap().values, original.first().unwrap().values);

        result.charts[0].values.set_value("global.edition", "ce").unwrap();

        let again = catalog.query(&[with_version("6.0.0")]);
        assert_eq!(again.first().unwrap().values.get("global.edition").unwrap(), "ee");
        assert!(result.charts[0].shares_templates_with(again.first().unwrap()));
    }

    #[test]
    fn test_readers_are_distinct() {
        let catalog = sample();

        assert_eq!(catalog.names(), vec!["gitlab", "gitlab-runner"]);
        assert_eq!(catalog.versions("gitlab"), vec!["5.9.0", "6.0.0", "6.0.1"]);
        assert_eq!(catalog.app_versions("gitlab"), vec!["14.9.0", "15.0.0"]);
        assert!(catalog.versions("unknown").is_empty());
    }

    #[test]
    fn test_populate_walks_search_paths() {
        let root = TempDir::new().unwrap();
        scaffold(root.path());

        let mut catalog = Catalog::new();
        let config = PopulateConfig::new()
            .search_paths([root.path()])
            .file_patterns(["*.tgz", "*.tar.gz"]);
        let added = catalog.populate(&config).unwrap();

        assert_eq!(added, 4);
        assert_eq!(catalog.names(), vec!["chart-1", "chart-2"]);
        assert_eq!(catalog.versions("chart-1"), vec!["0.1.0", "0.2.0"]);
        // sub-charts are part of their parent, not catalog entries
        assert!(catalog.query(&[with_name("sub-chart")]).is_empty());
    }

    #[test]
    fn test_populate_default_pattern() {
        let root = TempDir::new().unwrap();
        scaffold(root.path());

        let mut catalog = Catalog::new();
        catalog
            .populate(&PopulateConfig::new().search_paths([root.path()]))
            .unwrap();

        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_populate_fails_when_nothing_found() {
        let root = TempDir::new().unwrap();
        write(root.path(), "not-chart/README.md", "nothing\n");

        let mut catalog = Catalog::new();
        let err = catalog
            .populate(&PopulateConfig::new().search_paths([root.path()]))
            .unwrap_err();

        assert_eq!(err.to_string(), "unable to find any charts in search paths");
    }

    #[test]
    fn test_global_catalog_is_populated_once() {
        let root = TempDir::new().unwrap();
        scaffold(root.path());
        let config = PopulateConfig::new().search_paths([root.path()]);

        let catalog = populate_global(&config).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(global_catalog().len(), 3);

        let err = populate_global(&config).unwrap_err();
        assert!(matches!(err, CoreError::CatalogNotEmpty));
    }
}
