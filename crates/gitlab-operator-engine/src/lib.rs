//! GitLab Operator Engine - chart rendering and object queries
//!
//! This crate renders charts into Kubernetes objects:
//! - `Engine`: MiniJinja environment with Helm-flavoured filters
//! - `Builder`: client-side dry-run install of a chart and its sub-charts
//! - `RenderedTemplate`: the ordered objects and warnings of one render
//! - `Query`: cached lookups by kind, name, labels and component

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod query;
pub mod renderer;
pub mod template;

pub use engine::{Engine, EngineBuilder, RenderedFile};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use query::Query;
pub use renderer::Builder;
pub use template::{RenderWarning, RenderedTemplate};
