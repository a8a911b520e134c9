//! Features and components switched on by chart values

use gitlab_operator_core::Values;
use std::fmt;

/// A feature is wanted when every key is true in the values
///
/// Keys missing from the values count as `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureCheck {
    keys: &'static [&'static str],
    default: bool,
}

impl FeatureCheck {
    pub const fn enabled(keys: &'static [&'static str]) -> Self {
        Self { keys, default: false }
    }

    pub const fn enabled_with_default(default: bool, keys: &'static [&'static str]) -> Self {
        Self { keys, default }
    }

    pub fn check(&self, values: &Values) -> bool {
        self.keys.iter().all(|key| values.get_bool(key, self.default))
    }
}

pub const BACKUP_CRON_JOB: FeatureCheck = FeatureCheck::enabled(&["gitlab.toolbox.backups.cron.enabled"]);

pub const BACKUP_CRON_JOB_PERSISTENCE: FeatureCheck =
    FeatureCheck::enabled(&["gitlab.toolbox.backups.cron.persistence.enabled"]);

pub const CONFIGURE_CERT_MANAGER: FeatureCheck =
    FeatureCheck::enabled_with_default(true, &["global.ingress.configureCertmanager"]);

pub const REPLACE_GITALY_WITH_PRAEFECT: FeatureCheck =
    FeatureCheck::enabled(&["global.praefect.enabled", "global.praefect.replaceInternalGitaly"]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    GitLab,
    Gitaly,
    GitLabExporter,
    GitLabPages,
    GitLabShell,
    GitLabKas,
    Mailroom,
    Migrations,
    MinIO,
    NginxIngress,
    PostgreSQL,
    Praefect,
    Prometheus,
    Redis,
    Registry,
    SharedSecrets,
    Sidekiq,
    Spamcheck,
    Toolbox,
    Webservice,
}

/// Components every instance depends on
pub const CORE: &[Component] = &[Component::PostgreSQL, Component::Redis, Component::Gitaly];

/// Components that keep data
pub const STATEFUL: &[Component] = &[
    Component::PostgreSQL,
    Component::Redis,
    Component::Gitaly,
    Component::MinIO,
];

pub const ALL: &[Component] = &[
    Component::Gitaly,
    Component::GitLabExporter,
    Component::GitLabPages,
    Component::GitLabShell,
    Component::GitLabKas,
    Component::Mailroom,
    Component::Migrations,
    Component::MinIO,
    Component::NginxIngress,
    Component::PostgreSQL,
    Component::Redis,
    Component::Registry,
    Component::SharedSecrets,
    Component::Sidekiq,
    Component::Webservice,
];

impl Component {
    /// Name used in chart values, labels and the catalog
    pub fn name(&self) -> &'static str {
        match self {
            Component::GitLab => "gitlab",
            Component::Gitaly => "gitaly",
            Component::GitLabExporter => "gitlab-exporter",
            Component::GitLabPages => "gitlab-pages",
            Component::GitLabShell => "gitlab-shell",
            Component::GitLabKas => "kas",
            Component::Mailroom => "mailroom",
            Component::Migrations => "migrations",
            Component::MinIO => "minio",
            Component::NginxIngress => "nginx-ingress",
            Component::PostgreSQL => "postgresql",
            Component::Praefect => "praefect",
            Component::Prometheus => "prometheus",
            Component::Redis => "redis",
            Component::Registry => "registry",
            Component::SharedSecrets => "shared-secrets",
            Component::Sidekiq => "sidekiq",
            Component::Spamcheck => "spamcheck",
            Component::Toolbox => "toolbox",
            Component::Webservice => "webservice",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Component::GitLab, Component::Praefect, Component::Prometheus, Component::Spamcheck, Component::Toolbox]
            .into_iter()
            .chain(ALL.iter().copied())
            .find(|c| c.name() == name)
    }

    /// The values check that decides whether the component is deployed
    ///
    /// Components without a check, such as shared secrets, are never wanted.
    pub fn enabled_check(&self) -> Option<FeatureCheck> {
        let keys: &'static [&'static str] = match self {
            Component::Gitaly => &["global.gitaly.enabled"],
            Component::GitLabExporter => &["gitlab.gitlab-exporter.enabled"],
            Component::GitLabPages => &["global.pages.enabled"],
            Component::GitLabShell => &["gitlab.gitlab-shell.enabled"],
            Component::GitLabKas => &["global.kas.enabled"],
            Component::Mailroom => &["gitlab.mailroom.enabled", "global.appConfig.incomingEmail.enabled"],
            Component::Migrations => &["gitlab.migrations.enabled"],
            Component::MinIO => &["global.minio.enabled"],
            Component::NginxIngress => &["nginx-ingress.enabled"],
            Component::PostgreSQL => &["postgresql.install"],
            Component::Praefect => &["global.praefect.enabled"],
            Component::Prometheus => &["prometheus.install"],
            Component::Redis => &["redis.install"],
            Component::Registry => &["registry.enabled"],
            Component::Sidekiq => &["gitlab.sidekiq.enabled"],
            Component::Spamcheck => &["global.spamcheck.enabled"],
            Component::Toolbox => &["gitlab.toolbox.enabled"],
            Component::Webservice => &["gitlab.webservice.enabled"],
            Component::GitLab | Component::SharedSecrets => return None,
        };
        Some(FeatureCheck::enabled(keys))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names of the components, in order
pub fn names(components: &[Component]) -> Vec<&'static str> {
    components.iter().map(Component::name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(yaml: &str) -> Values {
        Values::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_feature_defaults() {
        let empty = Values::new();
        assert!(CONFIGURE_CERT_MANAGER.check(&empty));
        assert!(!BACKUP_CRON_JOB.check(&empty));

        let off = values("global:\n  ingress:\n    configureCertmanager: false\n");
        assert!(!CONFIGURE_CERT_MANAGER.check(&off));
    }

    #[test]
    fn test_every_key_must_be_true() {
        let partial = values("global:\n  praefect:\n    enabled: true\n");
        assert!(!REPLACE_GITALY_WITH_PRAEFECT.check(&partial));

        let full = values("global:\n  praefect:\n    enabled: true\n    replaceInternalGitaly: true\n");
        assert!(REPLACE_GITALY_WITH_PRAEFECT.check(&full));
    }

    #[test]
    fn test_component_checks() {
        let with_checks = [ALL, &[Component::Praefect, Component::Prometheus, Component::Spamcheck, Component::Toolbox]]
            .concat()
            .into_iter()
            .filter(|c| c.enabled_check().is_some())
            .count();
        assert_eq!(with_checks, 18);

        assert!(Component::SharedSecrets.enabled_check().is_none());
        assert_eq!(Component::from_name("kas"), Some(Component::GitLabKas));
        assert_eq!(Component::from_name("unknown"), None);
    }

    #[test]
    fn test_component_lists() {
        assert_eq!(names(CORE), vec!["postgresql", "redis", "gitaly"]);
        assert!(STATEFUL.contains(&Component::MinIO));
        assert_eq!(ALL.len(), 15);
    }
}
