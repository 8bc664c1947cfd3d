use std::time::Duration;

use crate::models::catalog::Catalog;

/// Tunables for the bundle operations, passed explicitly into the controller
/// instead of living in process-global state.
#[derive(Clone, Debug)]
pub struct BundleConfig {
    /// Requests are derived as `limit / request_divisor` per dimension.
    pub request_divisor: i64,

    /// The kind catalog used to build workload containers.
    pub catalog: Catalog,

    /// Whether teardown also deletes the bundle's volume claim. Defaults to
    /// false: user data on the volume survives deleting the bundle.
    pub delete_volume_on_teardown: bool,

    /// Deadline applied to every individual platform call.
    pub platform_timeout: Duration,

    /// Access modes requested for newly created volume claims.
    pub access_modes: Vec<String>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            request_divisor: 2,
            catalog: Catalog::default(),
            delete_volume_on_teardown: false,
            platform_timeout: Duration::from_secs(30),
            access_modes: vec!["ReadWriteOnce".to_string()],
        }
    }
}
