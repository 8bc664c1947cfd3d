//! Provisioning and reconciliation of application bundles: correlated groups
//! of Kubernetes objects (a single-replica deployment, an optional persistent
//! volume claim and a NodePort service) that together make up one sandboxed
//! Linux environment.
//!
//! The bundle itself is virtual. Its objects are tied together by a shared
//! label set carrying the sandbox kind and a per-bundle correlation id; the
//! volume claim is the one exception, addressed by the deterministic name
//! `<bundle>-pvc` (it outlives teardown by default).

pub mod config;
pub mod controllers;
pub mod models;
pub mod platform;
pub mod utils;

pub use config::BundleConfig;
pub use controllers::bundle::BundleController;
pub use models::bundle::{BundleHandle, BundleSummary, EditableBundle, InstanceStatus};
pub use models::catalog::{Catalog, SandboxKind};
pub use models::resources::BundleResources;
pub use utils::error::Error;
