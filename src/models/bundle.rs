use serde::{Deserialize, Serialize};

use crate::models::resources::BundleResources;

/// Deterministic name of a bundle's persistent volume claim. The claim is
/// addressed by this name rather than by the selector, so it survives even
/// when the labeled objects are gone.
pub fn claim_name(bundle_name: &str) -> String {
    format!("{}-pvc", bundle_name)
}

/// Deterministic name of a bundle's service.
pub fn service_name(bundle_name: &str) -> String {
    format!("{}-service", bundle_name)
}

/// Returned by a successful create: enough identity to address the bundle
/// later, including the correlation id stamped onto its objects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BundleHandle {
    pub name: String,
    pub namespace: String,
    pub correlation_id: String,
}

/// A bundle's current configuration in editable form, as returned by the
/// get-before-update path.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EditableBundle {
    pub name: String,
    pub namespace: String,
    pub resources: BundleResources,
}

/// One running instance of a bundle's workload.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub ready: bool,
    pub phase: String,
    pub node_ip: Option<String>,
}

/// The normalized listing view of one bundle: its instances and the
/// externally reachable endpoints of its service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BundleSummary {
    pub name: String,
    pub correlation_id: Option<String>,
    pub instances: Vec<InstanceStatus>,
    pub endpoints: Vec<String>,
}
