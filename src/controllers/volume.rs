use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use log::debug;

use crate::models::resources::BundleResources;
use crate::platform::Platform;
use crate::utils::error::Error;
use crate::utils::quantity::compare_quantities;

const STORAGE: &str = "storage";

/// Creates and grows the persistent volume claim backing a bundle. A bundle
/// has at most one claim; every requested mount path references that single
/// claim.
pub struct VolumeProvisioner {
    platform: Arc<dyn Platform>,
}

impl VolumeProvisioner {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        VolumeProvisioner { platform }
    }

    /// Creates the claim for a new bundle when a volume size was requested,
    /// returning the pod volumes and container mounts to wire into the
    /// workload. With no size requested nothing is created and both lists
    /// are empty.
    ///
    /// Validation runs before the claim is created, so a rejected request
    /// leaves nothing behind on the cluster.
    pub async fn provision(
        &self,
        namespace: &str,
        claim_name: &str,
        resources: &BundleResources,
        labels: &BTreeMap<String, String>,
        access_modes: &[String],
    ) -> Result<(Vec<Volume>, Vec<VolumeMount>), Error> {
        let size = match resources.volume_size() {
            Some(size) => size,
            None => return Ok((Vec::new(), Vec::new())),
        };

        let storage_class = resources.storage_class().ok_or_else(|| {
            Error::Validation("volume size requires a storage class".to_string())
        })?;

        let claim = build_claim(namespace, claim_name, storage_class, size, labels, access_modes);
        self.platform.create_claim(namespace, claim).await?;
        debug!("created claim {}/{} ({})", namespace, claim_name, size);

        Ok(mounts_for(claim_name, &resources.mount_paths))
    }

    /// Grows an existing claim, or creates it when the bundle was originally
    /// provisioned without one. Shrinking is rejected before any platform
    /// call since the cluster will refuse it anyway.
    pub async fn ensure_capacity(
        &self,
        namespace: &str,
        claim_name: &str,
        resources: &BundleResources,
        labels: &BTreeMap<String, String>,
        access_modes: &[String],
    ) -> Result<(), Error> {
        let size = match resources.volume_size() {
            Some(size) => size,
            None => return Ok(()),
        };

        match self.platform.get_claim(namespace, claim_name).await {
            Ok(claim) => self.resize(namespace, claim_name, claim, size).await,
            Err(Error::PlatformNotFound { .. }) => {
                let storage_class = resources.storage_class().ok_or_else(|| {
                    Error::Validation("volume size requires a storage class".to_string())
                })?;
                let claim =
                    build_claim(namespace, claim_name, storage_class, size, labels, access_modes);
                self.platform.create_claim(namespace, claim).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn resize(
        &self,
        namespace: &str,
        claim_name: &str,
        claim: PersistentVolumeClaim,
        new_size: &str,
    ) -> Result<(), Error> {
        let current = current_size(&claim).ok_or_else(|| {
            Error::Validation(format!(
                "claim {}/{} has no storage request to resize",
                namespace, claim_name
            ))
        })?;

        if compare_quantities(new_size, &current)? != Ordering::Greater {
            return Err(Error::Validation(format!(
                "claim {}/{} may only grow: current size {}, requested {}",
                namespace, claim_name, current, new_size
            )));
        }

        // Derive a new claim value instead of mutating the fetched one.
        let mut updated = claim;
        let spec = updated.spec.get_or_insert_with(PersistentVolumeClaimSpec::default);
        let requests = spec
            .resources
            .get_or_insert_with(ResourceRequirements::default)
            .requests
            .get_or_insert_with(BTreeMap::new);
        requests.insert(STORAGE.to_string(), Quantity(new_size.to_string()));

        self.platform
            .replace_claim(namespace, claim_name, updated)
            .await?;
        debug!("resized claim {}/{} to {}", namespace, claim_name, new_size);
        Ok(())
    }
}

fn current_size(claim: &PersistentVolumeClaim) -> Option<String> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get(STORAGE)
        .map(|quantity| quantity.0.clone())
}

fn build_claim(
    namespace: &str,
    claim_name: &str,
    storage_class: &str,
    size: &str,
    labels: &BTreeMap<String, String>,
    access_modes: &[String],
) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert(STORAGE.to_string(), Quantity(size.to_string()));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(claim_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes.to_vec()),
            storage_class_name: Some(storage_class.to_string()),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..ResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

/// One pod volume for the claim, and one container mount per requested path,
/// all referencing that same claim.
pub fn mounts_for(claim_name: &str, mount_paths: &[String]) -> (Vec<Volume>, Vec<VolumeMount>) {
    if mount_paths.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let volume = Volume {
        name: claim_name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            read_only: None,
        }),
        ..Volume::default()
    };

    let mounts = mount_paths
        .iter()
        .map(|path| VolumeMount {
            name: claim_name.to_string(),
            mount_path: path.clone(),
            ..VolumeMount::default()
        })
        .collect();

    (vec![volume], mounts)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::{mounts_for, VolumeProvisioner};
    use crate::models::resources::BundleResources;
    use crate::platform::fake::FakePlatform;
    use crate::platform::Platform;
    use crate::utils::error::Error;

    fn provisioner() -> (Arc<FakePlatform>, VolumeProvisioner) {
        let platform = Arc::new(FakePlatform::default());
        let provisioner = VolumeProvisioner::new(platform.clone());
        (platform, provisioner)
    }

    fn volume_request(size: &str, class: &str) -> BundleResources {
        BundleResources {
            volume_size: Some(size.to_string()),
            storage_class: Some(class.to_string()),
            mount_paths: vec!["/data".to_string(), "/backup".to_string()],
            ..BundleResources::default()
        }
    }

    #[test]
    fn all_mounts_share_the_single_claim() {
        let paths = vec!["/data".to_string(), "/backup".to_string()];
        let (volumes, mounts) = mounts_for("box1-pvc", &paths);

        assert_eq!(volumes.len(), 1);
        assert_eq!(mounts.len(), 2);
        for mount in &mounts {
            assert_eq!(mount.name, "box1-pvc");
        }
        assert_eq!(
            volumes[0]
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "box1-pvc"
        );
    }

    #[test]
    fn size_without_class_is_rejected_before_any_create() {
        let (platform, provisioner) = provisioner();
        let mut resources = volume_request("10Gi", "");
        resources.storage_class = None;

        let result = tokio_test::block_on(provisioner.provision(
            "ns1",
            "box1-pvc",
            &resources,
            &BTreeMap::new(),
            &["ReadWriteOnce".to_string()],
        ));

        assert!(matches!(result, Err(Error::Validation(_))));
        let claim = tokio_test::block_on(platform.get_claim("ns1", "box1-pvc"));
        assert!(matches!(claim, Err(Error::PlatformNotFound { .. })));
    }

    #[test]
    fn no_size_means_no_claim_and_no_mounts() {
        let (_, provisioner) = provisioner();
        let resources = BundleResources::default();

        let (volumes, mounts) = tokio_test::block_on(provisioner.provision(
            "ns1",
            "box1-pvc",
            &resources,
            &BTreeMap::new(),
            &[],
        ))
        .unwrap();

        assert!(volumes.is_empty());
        assert!(mounts.is_empty());
    }

    #[test]
    fn capacity_only_grows() {
        let (_, provisioner) = provisioner();
        let labels = BTreeMap::new();
        let modes = vec!["ReadWriteOnce".to_string()];

        tokio_test::block_on(provisioner.provision(
            "ns1",
            "box1-pvc",
            &volume_request("10Gi", "standard"),
            &labels,
            &modes,
        ))
        .unwrap();

        let grow = tokio_test::block_on(provisioner.ensure_capacity(
            "ns1",
            "box1-pvc",
            &volume_request("20Gi", "standard"),
            &labels,
            &modes,
        ));
        assert!(grow.is_ok());

        let shrink = tokio_test::block_on(provisioner.ensure_capacity(
            "ns1",
            "box1-pvc",
            &volume_request("5Gi", "standard"),
            &labels,
            &modes,
        ));
        assert!(matches!(shrink, Err(Error::Validation(_))));
    }
}
