//! Engine error types

use gitlab_operator_core::CoreError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid kubernetes version '{version}'")]
    InvalidKubeVersion { version: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl From<minijinja::ErrorKind> for TemplateErrorKind {
    fn from(kind: minijinja::ErrorKind) -> Self {
        match kind {
            minijinja::ErrorKind::UndefinedError => Self::UndefinedVariable,
            minijinja::ErrorKind::UnknownFilter => Self::UnknownFilter,
            minijinja::ErrorKind::UnknownFunction => Self::UnknownFunction,
            minijinja::ErrorKind::SyntaxError => Self::SyntaxError,
            minijinja::ErrorKind::InvalidOperation => Self::InvalidOperation,
            minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => Self::TypeError,
            _ => Self::Other,
        }
    }
}

/// A chart template failed to parse or render
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(gitlab_operator::chart::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, source: &str) -> Self {
        let kind = TemplateErrorKind::from(err.kind());
        let span = err.line().and_then(|line| line_span(source, line));
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", template_name, detail),
            None => format!("{}: {}", template_name, err),
        };

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, source.to_string()),
            span,
            suggestion: suggestion_for(kind),
        }
    }

    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            suggestion: None,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn suggestion_for(kind: TemplateErrorKind) -> Option<String> {
    let hint = match kind {
        TemplateErrorKind::UndefinedVariable => {
            "check the key exists in the chart values or guard it with `is defined`"
        }
        TemplateErrorKind::UnknownFilter => {
            "available filters include toyaml, tojson, b64enc, quote, nindent, required"
        }
        TemplateErrorKind::UnknownFunction => {
            "available functions are fail, dict, list, coalesce, ternary"
        }
        TemplateErrorKind::SyntaxError => "check for unbalanced `{{ }}` or `{% %}` blocks",
        _ => return None,
    };
    Some(hint.to_string())
}

/// Byte span of a 1-based line
fn line_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, text) in source.split('\n').enumerate() {
        if index + 1 == line {
            return Some(SourceSpan::new(offset.into(), text.len()));
        }
        offset += text.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_span() {
        let source = "a: 1\nbb: {{ x }}\nc: 3";
        let span = line_span(source, 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 11);
        assert!(line_span(source, 9).is_none());
    }

    #[test]
    fn test_from_minijinja_keeps_source() {
        let mut env = minijinja::Environment::new();
        let source = "a: {{ 1 +  }}";
        let err = env.add_template("broken.yaml", source).unwrap_err();

        let err = TemplateError::from_minijinja(err, "templates/broken.yaml", source);
        assert_eq!(err.kind(), TemplateErrorKind::SyntaxError);
        assert!(err.message.starts_with("templates/broken.yaml"));
        assert!(err.suggestion.is_some());
    }
}
