//! GitLab Operator Kube - cluster operations for the GitLab operator
//!
//! This crate provides:
//! - **Object client**: the small set of cluster calls the operator makes,
//!   backed by the API server or by an in-memory mock
//! - **Three-way apply**: `kubectl apply` semantics with strategic merge for
//!   built-in kinds and JSON merge for everything else
//! - **Managed-object discovery**: the objects a custom resource owns,
//!   found through owner references

pub mod apply;
pub mod client;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod patch;
pub mod scheme;

pub use apply::{Applier, ApplierBuilder, ApplyOutcome, LAST_APPLIED_CONFIG_ANNOTATION};
pub use client::{KubeObjectClient, ObjectClient, ObjectPatch, PatchKind};
pub use discovery::{
    DiscoveryConfig, OwnerIdentity, SUPPORTED_RESOURCES, discover_managed_objects,
    supported_resources,
};
pub use error::{KubeError, Result};
pub use mock::{MockObjectClient, OperationCounts};
pub use scheme::{PatchMeta, Scheme};
