//! Chart values of a GitLab resource
//!
//! Values are layered in a fixed order: operator defaults, then the values of
//! the resource, then operator overrides, and finally the defaults of each
//! chart for whatever is still unset.

use gitlab_operator_core::Values;
use gitlab_operator_engine::Engine;
use minijinja::{Value, context};
use tracing::debug;

use super::GitLabAdapter;
use super::features::CONFIGURE_CERT_MANAGER;
use crate::error::{OperatorError, Result};
use crate::resource::ChartConsumer;

const DEFAULT_VALUES_TEMPLATE: &str = "default-values";
const DEFAULT_VALUES_SOURCE: &str = include_str!("templates/default-values.yaml");

const OVERRIDE_VALUES_TEMPLATE: &str = "override-values";
const OVERRIDE_VALUES_SOURCE: &str = include_str!("templates/override-values.yaml");

impl GitLabAdapter {
    pub(super) fn populate_values(&mut self) -> Result<()> {
        self.apply_operator_default_values()?;
        self.apply_user_defined_values()?;
        self.apply_operator_override_values()?;
        self.apply_chart_default_values();
        Ok(())
    }

    fn apply_operator_default_values(&mut self) -> Result<()> {
        self.load_values_from_template(DEFAULT_VALUES_TEMPLATE, DEFAULT_VALUES_SOURCE)
    }

    fn apply_user_defined_values(&mut self) -> Result<()> {
        let user_values = Values::from_json_value(self.resource.spec.chart.values.clone())
            .map_err(|e| OperatorError::Resource(format!("failed to merge user defined values: {}", e)))?;
        self.values.merge(&user_values);
        Ok(())
    }

    fn apply_operator_override_values(&mut self) -> Result<()> {
        self.load_values_from_template(OVERRIDE_VALUES_TEMPLATE, OVERRIDE_VALUES_SOURCE)
    }

    fn apply_chart_default_values(&mut self) {
        for chart in self.charts.iter() {
            debug!(chart = %chart.name(), version = %chart.version(), "coalescing chart values");
            self.values.coalesce_with(&chart.values);
        }
    }

    fn load_values_from_template(&mut self, name: &'static str, source: &str) -> Result<()> {
        let rendered = Engine::default()
            .render_string(source, name, &self.template_parameters())
            .map_err(|source| OperatorError::ValuesTemplate { template: name, source })?;

        self.values
            .add_from_yaml(&rendered)
            .map_err(|source| OperatorError::ValuesMerge { template: name, source })
    }

    fn template_parameters(&self) -> Value {
        context! {
            release_name => self.release_name(),
            use_cert_manager => self.wants_feature(CONFIGURE_CERT_MANAGER),
            external_ip => self.values.get_string("global.hosts.externalIP", ""),
            settings => Value::from_serialize(self.settings.settings_map()),
        }
    }
}
