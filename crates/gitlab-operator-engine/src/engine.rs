//! Template engine based on MiniJinja

use gitlab_operator_core::ChartTemplate;
use minijinja::{Environment, UndefinedBehavior, Value, context};

use crate::error::{Result, TemplateError};
use crate::{filters, functions};

/// A rendered chart file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Path including the chart prefix, e.g. `gitlab/charts/gitaly/templates/statefulset.yaml`
    pub path: String,
    pub content: String,
}

pub struct EngineBuilder {
    strict: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Fail on undefined variables instead of rendering them empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict: self.strict,
        }
    }
}

/// The template engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    strict: bool,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64enc", filters::b64enc);
        env.add_filter("b64dec", filters::b64dec);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("sha256sum", filters::sha256sum);
        env.add_filter("semvercompare", filters::semvercompare);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);

        env
    }

    /// Render a standalone template
    pub fn render_string(&self, source: &str, name: &str, ctx: &Value) -> Result<String> {
        let mut env = self.environment();
        env.add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, name, source))?;

        let template = env
            .get_template(name)
            .map_err(|e| TemplateError::from_minijinja(e, name, source))?;

        Ok(template
            .render(ctx)
            .map_err(|e| TemplateError::from_minijinja(e, name, source))?)
    }

    /// Render the templates of one chart
    ///
    /// All templates are loaded so helpers can be imported by name; helpers
    /// (`_*`) and `NOTES.txt` are not emitted. Output keeps template order
    /// and is prefixed with `base_path`.
    pub fn render_templates(
        &self,
        templates: &[ChartTemplate],
        base_path: &str,
        ctx: &Value,
    ) -> Result<Vec<RenderedFile>> {
        let mut env = self.environment();

        for template in templates {
            env.add_template_owned(template.name.clone(), template.data.clone())
                .map_err(|e| TemplateError::from_minijinja(e, &template.name, &template.data))?;
        }

        let mut rendered = Vec::new();
        for template in templates {
            if template.is_helper() || template.name.ends_with("NOTES.txt") {
                continue;
            }

            let path = format!("{}/{}", base_path, template.name);
            let compiled = env
                .get_template(&template.name)
                .map_err(|e| TemplateError::from_minijinja(e, &path, &template.data))?;

            let template_ctx = context! {
                template => context! { name => &path, basePath => format!("{}/templates", base_path) },
                ..ctx.clone()
            };

            let content = compiled
                .render(template_ctx)
                .map_err(|e| TemplateError::from_minijinja(e, &path, &template.data))?;

            rendered.push(RenderedFile { path, content });
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn template(name: &str, data: &str) -> ChartTemplate {
        ChartTemplate {
            name: name.to_string(),
            data: data.to_string(),
        }
    }

    fn ctx() -> Value {
        context! {
            values => context! { replicas => 3, image => context! { repository => "registry.gitlab.com/gitlab-org/build/cng", tag => "v15.0.0" } },
            release => context! { name => "gitlab", namespace => "default" },
        }
    }

    #[test]
    fn test_render_string() {
        let out = Engine::default()
            .render_string("replicas: {{ values.replicas }}", "inline", &ctx())
            .unwrap();
        assert_eq!(out, "replicas: 3");
    }

    #[test]
    fn test_render_with_filters() {
        let out = Engine::default()
            .render_string("image:{{ values.image | toyaml | nindent(2) }}", "inline", &ctx())
            .unwrap();
        assert_eq!(
            out,
            "image:\n  repository: registry.gitlab.com/gitlab-org/build/cng\n  tag: v15.0.0"
        );
    }

    #[test]
    fn test_lenient_and_strict_undefined() {
        let lenient = Engine::default()
            .render_string("x: {{ values.missing }}", "inline", &ctx())
            .unwrap();
        assert_eq!(lenient, "x: ");

        let strict = Engine::builder()
            .strict(true)
            .build()
            .render_string("x: {{ values.missing.deeper }}", "inline", &ctx());
        assert!(matches!(strict, Err(EngineError::Template(_))));
    }

    #[test]
    fn test_render_templates_skips_helpers_and_notes() {
        let templates = vec![
            template("templates/_helpers.tpl", "{% macro fullname(name) %}{{ name }}-app{% endmacro %}"),
            template(
                "templates/cm.yaml",
                "{% import \"templates/_helpers.tpl\" as h %}name: {{ h.fullname(release.name) }}\nsource: {{ template.name }}\n",
            ),
            template("templates/NOTES.txt", "thanks"),
        ];

        let files = Engine::default()
            .render_templates(&templates, "gitlab", &ctx())
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "gitlab/templates/cm.yaml");
        assert_eq!(
            files[0].content,
            "name: gitlab-app\nsource: gitlab/templates/cm.yaml\n"
        );
    }

    #[test]
    fn test_render_error_names_template() {
        let templates = vec![template("templates/bad.yaml", "{{ fail(\"no database\") }}")];
        let err = Engine::default()
            .render_templates(&templates, "gitlab", &ctx())
            .unwrap_err();

        let EngineError::Template(err) = err else {
            panic!("expected a template error");
        };
        assert!(err.message.contains("gitlab/templates/bad.yaml"));
        assert!(err.message.contains("no database"));
    }
}
