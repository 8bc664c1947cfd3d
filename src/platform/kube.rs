use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use crate::platform::Platform;
use crate::utils::error::Error;

/// Production platform backed by a `kube::Client`. Every call runs under a
/// bounded deadline; an exceeded deadline surfaces as transient
/// `PlatformUnavailable` so callers can retry.
pub struct KubePlatform {
    client: Client,
    timeout: Duration,
}

impl KubePlatform {
    pub fn new(client: Client, timeout: Duration) -> Self {
        KubePlatform { client, timeout }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(
        &self,
        object_kind: &str,
        name: &str,
        namespace: &str,
        call: F,
    ) -> Result<T, Error>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
        T: Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => {
                result.map_err(|err| map_platform_error(err, object_kind, name, namespace))
            }
            Err(_) => Err(Error::PlatformUnavailable {
                object_kind: object_kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                reason: format!("no response within {:?}", self.timeout),
            }),
        }
    }

    async fn idempotent_delete<T, F>(
        &self,
        object_kind: &str,
        name: &str,
        namespace: &str,
        call: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
        T: Send,
    {
        match self.bounded(object_kind, name, namespace, call).await {
            Ok(_) => Ok(()),
            Err(Error::PlatformNotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Translates a `kube::Error` into the bundle error taxonomy, attaching the
/// identity of the object involved.
fn map_platform_error(err: kube::Error, object_kind: &str, name: &str, namespace: &str) -> Error {
    let object_kind = object_kind.to_string();
    let name = name.to_string();
    let namespace = namespace.to_string();

    match err {
        kube::Error::Api(response) if response.code == 404 => Error::PlatformNotFound {
            object_kind,
            name,
            namespace,
        },
        kube::Error::Api(response) if response.code == 409 => Error::PlatformConflict {
            object_kind,
            name,
            namespace,
        },
        source => Error::Platform {
            object_kind,
            name,
            namespace,
            source,
        },
    }
}

fn name_of(metadata: &kube::api::ObjectMeta) -> String {
    metadata.name.clone().unwrap_or_default()
}

#[async_trait]
impl Platform for KubePlatform {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error> {
        let name = name_of(&deployment.metadata);
        let api = self.deployments(namespace);
        self.bounded(
            "Deployment",
            &name,
            namespace,
            api.create(&PostParams::default(), &deployment),
        )
        .await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        let api = self.deployments(namespace);
        self.bounded("Deployment", name, namespace, api.get(name)).await
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error> {
        let api = self.deployments(namespace);
        self.bounded(
            "Deployment",
            name,
            namespace,
            api.replace(name, &PostParams::default(), &deployment),
        )
        .await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.deployments(namespace);
        self.idempotent_delete(
            "Deployment",
            name,
            namespace,
            api.delete(name, &DeleteParams::default()),
        )
        .await
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, Error> {
        let api = self.deployments(namespace);
        let params = ListParams::default().labels(selector);
        let list = self
            .bounded("Deployment", selector, namespace, api.list(&params))
            .await?;
        Ok(list.items)
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error> {
        let name = name_of(&service.metadata);
        let api = self.services(namespace);
        self.bounded(
            "Service",
            &name,
            namespace,
            api.create(&PostParams::default(), &service),
        )
        .await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.services(namespace);
        self.idempotent_delete(
            "Service",
            name,
            namespace,
            api.delete(name, &DeleteParams::default()),
        )
        .await
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>, Error> {
        let api = self.services(namespace);
        let params = ListParams::default().labels(selector);
        let list = self
            .bounded("Service", selector, namespace, api.list(&params))
            .await?;
        Ok(list.items)
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        let name = name_of(&claim.metadata);
        let api = self.claims(namespace);
        self.bounded(
            "PersistentVolumeClaim",
            &name,
            namespace,
            api.create(&PostParams::default(), &claim),
        )
        .await
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, Error> {
        let api = self.claims(namespace);
        self.bounded("PersistentVolumeClaim", name, namespace, api.get(name))
            .await
    }

    async fn replace_claim(
        &self,
        namespace: &str,
        name: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        let api = self.claims(namespace);
        self.bounded(
            "PersistentVolumeClaim",
            name,
            namespace,
            api.replace(name, &PostParams::default(), &claim),
        )
        .await
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.claims(namespace);
        self.idempotent_delete(
            "PersistentVolumeClaim",
            name,
            namespace,
            api.delete(name, &DeleteParams::default()),
        )
        .await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        let api = self.pods(namespace);
        let params = ListParams::default().labels(selector);
        let list = self
            .bounded("Pod", selector, namespace, api.list(&params))
            .await?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;

    use super::map_platform_error;
    use crate::utils::error::Error;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "test".to_string(),
            code,
        })
    }

    #[test]
    fn missing_objects_map_to_not_found() {
        let err = map_platform_error(api_error(404), "Deployment", "box1", "ns1");
        match err {
            Error::PlatformNotFound {
                object_kind,
                name,
                namespace,
            } => {
                assert_eq!(object_kind, "Deployment");
                assert_eq!(name, "box1");
                assert_eq!(namespace, "ns1");
            }
            other => panic!("expected PlatformNotFound, got {:?}", other),
        }
    }

    #[test]
    fn concurrent_modifications_map_to_conflict() {
        let err = map_platform_error(api_error(409), "Deployment", "box1", "ns1");
        assert!(matches!(err, Error::PlatformConflict { .. }));
    }

    #[test]
    fn other_api_errors_keep_their_source() {
        let err = map_platform_error(api_error(500), "Service", "box1-service", "ns1");
        assert!(matches!(err, Error::Platform { .. }));
        assert!(err.to_string().contains("box1-service"));
    }
}
