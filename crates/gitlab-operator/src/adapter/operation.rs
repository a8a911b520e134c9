//! Install, upgrade and downgrade detection

use semver::Version;
use std::cmp::Ordering;

use super::GitLabAdapter;

impl GitLabAdapter {
    /// No version has been recorded yet
    pub fn is_install(&self) -> bool {
        self.current_version().is_empty()
    }

    pub fn is_upgrade(&self) -> bool {
        !self.is_install() && self.compare_versions() == Ordering::Greater
    }

    pub fn is_downgrade(&self) -> bool {
        !self.is_install() && self.compare_versions() == Ordering::Less
    }

    /// Version recorded in the status by the last successful reconcile
    pub fn current_version(&self) -> &str {
        self.resource
            .status
            .as_ref()
            .map_or("", |status| status.version.as_str())
    }

    /// Version requested in `spec.chart.version`
    pub fn desired_version(&self) -> &str {
        &self.resource.spec.chart.version
    }

    /// Desired against current; unparsable versions compare equal
    fn compare_versions(&self) -> Ordering {
        match (
            Version::parse(self.desired_version()),
            Version::parse(self.current_version()),
        ) {
            (Ok(desired), Ok(current)) => desired.cmp_precedence(&current),
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{adapter, gitlab};

    #[test]
    fn test_install_without_recorded_version() {
        let a = adapter(gitlab("7.1.0", None));
        assert!(a.is_install());
        assert!(!a.is_upgrade());
        assert!(!a.is_downgrade());
        assert_eq!(a.desired_version(), "7.1.0");
    }

    #[test]
    fn test_upgrade_and_downgrade() {
        let a = adapter(gitlab("7.1.0", Some("7.0.0")));
        assert!(!a.is_install());
        assert!(a.is_upgrade());
        assert!(!a.is_downgrade());

        let a = adapter(gitlab("7.0.0", Some("7.1.0")));
        assert!(a.is_downgrade());

        let a = adapter(gitlab("7.1.0", Some("7.1.0")));
        assert!(!a.is_upgrade() && !a.is_downgrade());
    }

    #[test]
    fn test_unparsable_status_version_is_neither() {
        let a = adapter(gitlab("7.1.0", Some("latest")));
        assert!(!a.is_install());
        assert!(!a.is_upgrade());
        assert!(!a.is_downgrade());
    }
}
