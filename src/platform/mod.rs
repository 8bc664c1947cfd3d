use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};

use crate::utils::error::Error;

pub mod fake;
pub mod kube;

/// The slice of the orchestration control plane the bundle operations need:
/// CRUD plus label-selector listing over the three object kinds a bundle is
/// made of, and pod listing for the status view.
///
/// Deletes are idempotent: deleting an already-absent object succeeds.
/// Implementations map concurrent-modification rejections to
/// `Error::PlatformConflict` and absent objects to `Error::PlatformNotFound`.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error>;
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error>;
    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error>;
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error>;
    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, Error>;

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), Error>;
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>, Error>;

    async fn create_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error>;
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, Error>;
    async fn replace_claim(
        &self,
        namespace: &str,
        name: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error>;
    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error>;
}
