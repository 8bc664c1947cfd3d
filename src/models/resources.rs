use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::utils::error::Error;
use crate::utils::quantity::split_quantity;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";

/// The user-facing resource declaration for a bundle. `cpu`, `memory` and
/// `storage` are the per-dimension ceilings; `volume_size` (with its required
/// companion `storage_class`) asks for a persistent volume mounted at each of
/// `mount_paths`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BundleResources {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    #[serde(default)]
    pub volume_size: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub mount_paths: Vec<String>,
}

impl BundleResources {
    /// The requested persistent volume size, treating an empty string the
    /// same as an absent field.
    pub fn volume_size(&self) -> Option<&str> {
        self.volume_size.as_deref().filter(|size| !size.is_empty())
    }

    pub fn storage_class(&self) -> Option<&str> {
        self.storage_class
            .as_deref()
            .filter(|class| !class.is_empty())
    }
}

/// The compute dimensions of a bundle split into a guaranteed floor
/// (requests) and the user-declared ceiling (limits), keyed the way the
/// container spec expects them.
#[derive(Clone, Debug)]
pub struct ResourceSplit {
    pub requests: BTreeMap<String, Quantity>,
    pub limits: BTreeMap<String, Quantity>,
}

/// Validates and splits every compute dimension of the resource form. Fails
/// before anything is created on the cluster, so a malformed quantity has no
/// side effects.
pub fn split_resources(resources: &BundleResources, divisor: i64) -> Result<ResourceSplit, Error> {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    for (dimension, limit) in &[
        (CPU, &resources.cpu),
        (MEMORY, &resources.memory),
        (EPHEMERAL_STORAGE, &resources.storage),
    ] {
        let request = split_quantity(limit, divisor)?;
        requests.insert(dimension.to_string(), Quantity(request));
        limits.insert(dimension.to_string(), Quantity(limit.to_string()));
    }

    Ok(ResourceSplit { requests, limits })
}
