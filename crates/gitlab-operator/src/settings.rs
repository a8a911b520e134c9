//! Process settings
//!
//! Every setting has a flag, an environment variable and a default, so the
//! operator runs unconfigured inside its container image and library code can
//! use [`OperatorSettings::default`].

use clap::Args;
use gitlab_operator_core::PopulateConfig;
use gitlab_operator_core::objects::split_api_version;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_CHARTS_DIR: &str = "/charts";
pub const DEFAULT_CHART_PATTERN: &str = "*.tgz";
pub const DEFAULT_MANAGER_SERVICE_ACCOUNT: &str = "gitlab-manager";
pub const DEFAULT_APP_ANYUID_SERVICE_ACCOUNT: &str = "gitlab-app-anyuid";
pub const DEFAULT_APP_NONROOT_SERVICE_ACCOUNT: &str = "gitlab-app-nonroot";
pub const DEFAULT_NGINX_SERVICE_ACCOUNT: &str = "gitlab-nginx-ingress";
pub const DEFAULT_PROMETHEUS_SERVICE_ACCOUNT: &str = "gitlab-prometheus-server";
pub const DEFAULT_CERTMANAGER_ISSUER_EMAIL: &str = "admin@example.com";

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct OperatorSettings {
    /// Directory holding the bundled charts
    #[arg(long, env = "HELM_CHARTS", default_value = DEFAULT_CHARTS_DIR, global = true)]
    pub charts_dir: PathBuf,

    /// File name globs of chart archives
    #[arg(
        long,
        env = "GITLAB_OPERATOR_CHART_PATTERNS",
        value_delimiter = ',',
        default_value = DEFAULT_CHART_PATTERN,
        global = true
    )]
    pub chart_patterns: Vec<String>,

    /// ServiceAccount of the operator itself
    #[arg(long, env = "GITLAB_MANAGER_SERVICE_ACCOUNT", default_value = DEFAULT_MANAGER_SERVICE_ACCOUNT, global = true)]
    pub manager_service_account: String,

    /// ServiceAccount for components that run under the anyuid constraint
    #[arg(long, env = "GITLAB_APP_ANYUID_SERVICE_ACCOUNT", default_value = DEFAULT_APP_ANYUID_SERVICE_ACCOUNT, global = true)]
    pub app_anyuid_service_account: String,

    /// ServiceAccount for components that run under the nonroot constraint
    #[arg(long, env = "GITLAB_APP_NONROOT_SERVICE_ACCOUNT", default_value = DEFAULT_APP_NONROOT_SERVICE_ACCOUNT, global = true)]
    pub app_nonroot_service_account: String,

    #[arg(long, env = "NGINX_SERVICE_ACCOUNT", default_value = DEFAULT_NGINX_SERVICE_ACCOUNT, global = true)]
    pub nginx_service_account: String,

    #[arg(long, env = "PROMETHEUS_SERVICE_ACCOUNT", default_value = DEFAULT_PROMETHEUS_SERVICE_ACCOUNT, global = true)]
    pub prometheus_service_account: String,

    /// Contact address of the ACME issuer created for cert-manager
    #[arg(
        long,
        env = "GITLAB_OPERATOR_CERTMANAGER_ISSUER_EMAIL",
        default_value = DEFAULT_CERTMANAGER_ISSUER_EMAIL,
        global = true
    )]
    pub certmanager_issuer_email: String,

    /// Kubernetes version reported to chart templates, e.g. v1.29.4
    #[arg(long, env = "GITLAB_OPERATOR_KUBERNETES_VERSION", global = true)]
    pub kube_version: Option<String>,

    /// Group/versions the cluster serves; empty means all of them
    #[arg(
        long,
        env = "GITLAB_OPERATOR_KUBERNETES_API_VERSIONS",
        value_delimiter = ',',
        global = true
    )]
    pub kube_api_versions: Vec<String>,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
            chart_patterns: vec![DEFAULT_CHART_PATTERN.to_string()],
            manager_service_account: DEFAULT_MANAGER_SERVICE_ACCOUNT.to_string(),
            app_anyuid_service_account: DEFAULT_APP_ANYUID_SERVICE_ACCOUNT.to_string(),
            app_nonroot_service_account: DEFAULT_APP_NONROOT_SERVICE_ACCOUNT.to_string(),
            nginx_service_account: DEFAULT_NGINX_SERVICE_ACCOUNT.to_string(),
            prometheus_service_account: DEFAULT_PROMETHEUS_SERVICE_ACCOUNT.to_string(),
            certmanager_issuer_email: DEFAULT_CERTMANAGER_ISSUER_EMAIL.to_string(),
            kube_version: None,
            kube_api_versions: Vec::new(),
        }
    }
}

impl OperatorSettings {
    /// Names exposed to the operator values templates as `settings`
    pub fn settings_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("AppAnyUIDServiceAccount", self.app_anyuid_service_account.clone()),
            ("AppNonRootServiceAccount", self.app_nonroot_service_account.clone()),
            ("CertmanagerIssuerEmail", self.certmanager_issuer_email.clone()),
            ("ManagerServiceAccount", self.manager_service_account.clone()),
            ("NginxServiceAccount", self.nginx_service_account.clone()),
            ("PrometheusServiceAccount", self.prometheus_service_account.clone()),
        ])
    }

    /// Whether the cluster serves `group/version`
    ///
    /// Entries may also name a kind (`apps/v1/Deployment`); only their
    /// group/version is compared.
    pub fn is_group_version_supported(&self, group: &str, version: &str) -> bool {
        if self.kube_api_versions.is_empty() {
            return true;
        }

        self.kube_api_versions.iter().any(|entry| {
            let entry = entry.trim();
            let group_version = match entry.matches('/').count() {
                0 | 1 => entry,
                _ => entry.rsplit_once('/').map_or(entry, |(gv, _)| gv),
            };
            split_api_version(group_version) == (group, version)
        })
    }

    /// Where the catalog looks for charts
    pub fn populate_config(&self) -> PopulateConfig {
        PopulateConfig::new()
            .search_paths([self.charts_dir.clone()])
            .file_patterns(self.chart_patterns.iter().cloned())
    }
}
