//! GitLab Operator Core - values, charts and the Kubernetes object model
//!
//! This crate holds the parts of the operator that never talk to a cluster:
//! - `Values`: Helm-style values tree with dotted-path assignment and coalescing
//! - `Chart`: chart loading from directories and `.tgz` archives
//! - `Catalog`: the searchable set of charts available to the operator
//! - `objects`: selectors, editors and collections over dynamic objects

pub mod archive;
pub mod catalog;
pub mod chart;
pub mod error;
pub mod hash;
pub mod objects;
pub mod operation;
pub mod values;

pub use catalog::{Catalog, Criterion, PopulateConfig};
pub use chart::{Chart, ChartDependency, ChartMetadata, ChartTemplate};
pub use error::{CoreError, Result};
pub use hash::{name_with_hash_suffix, simple_object_hash};
pub use objects::{Collection, DynamicObject, EditError, Editor, KindArg, ObjectExt, Selector};
pub use operation::ChainedOperation;
pub use values::Values;

/// The process-wide catalog
pub mod global {
    pub use crate::catalog::{global_catalog as catalog, populate_global as populate};
}
