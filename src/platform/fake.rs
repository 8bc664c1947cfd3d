//! In-memory stand-in for the cluster, used by the test suite. It keeps the
//! created objects keyed by namespace and name, mimics the deployment
//! controller by materializing one pod per single-replica deployment, and can
//! inject failures to exercise the partial-failure paths.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, Pod, PodCondition, PodStatus, Service,
};
use kube::api::ObjectMeta;

use crate::platform::Platform;
use crate::utils::error::Error;

const FAKE_NODE_IP: &str = "10.0.0.1";

#[derive(Default)]
struct FakeState {
    deployments: BTreeMap<(String, String), Deployment>,
    services: BTreeMap<(String, String), Service>,
    claims: BTreeMap<(String, String), PersistentVolumeClaim>,
    pods: BTreeMap<(String, String), Pod>,
    fail_service_create: bool,
    fail_deployment_delete: bool,
    next_node_port: i32,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    /// Makes every subsequent service create fail, simulating a control
    /// plane that dies between the workload and service steps.
    pub fn fail_service_creates(&self) {
        self.lock().fail_service_create = true;
    }

    /// Makes every subsequent deployment delete fail, so compensating
    /// cleanup can be driven into its orphan path.
    pub fn fail_deployment_deletes(&self) {
        self.lock().fail_deployment_delete = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake platform state poisoned")
    }
}

fn key(namespace: &str, meta: &ObjectMeta) -> (String, String) {
    (
        namespace.to_string(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn not_found(object_kind: &str, name: &str, namespace: &str) -> Error {
    Error::PlatformNotFound {
        object_kind: object_kind.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

fn already_exists(object_kind: &str, name: &str, namespace: &str) -> Error {
    Error::PlatformConflict {
        object_kind: object_kind.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

fn injected_failure(object_kind: &str, name: &str, namespace: &str) -> Error {
    Error::PlatformUnavailable {
        object_kind: object_kind.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        reason: "injected failure".to_string(),
    }
}

/// Matches a `key=value,key=value` equality selector against an object's
/// labels. The empty selector matches everything.
fn selector_matches(selector: &str, meta: &ObjectMeta) -> bool {
    if selector.is_empty() {
        return true;
    }

    let labels = match &meta.labels {
        Some(labels) => labels,
        None => return false,
    };

    selector.split(',').all(|requirement| {
        match requirement.split_once('=') {
            Some((label, value)) => labels.get(label).map(String::as_str) == Some(value),
            None => false,
        }
    })
}

/// One synthetic running pod for a deployment, carrying the deployment's
/// labels so selector-based lookups find it.
fn pod_for(namespace: &str, deployment: &Deployment) -> Pod {
    let deployment_name = deployment.metadata.name.clone().unwrap_or_default();

    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-0", deployment_name)),
            namespace: Some(namespace.to_string()),
            labels: deployment.metadata.labels.clone(),
            ..ObjectMeta::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            host_ip: Some(FAKE_NODE_IP.to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..PodCondition::default()
            }]),
            ..PodStatus::default()
        }),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error> {
        let mut state = self.lock();
        let key = key(namespace, &deployment.metadata);
        if state.deployments.contains_key(&key) {
            return Err(already_exists("Deployment", &key.1, namespace));
        }

        let pod = pod_for(namespace, &deployment);
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        state.pods.insert((key.0.clone(), pod_name), pod);
        state.deployments.insert(key, deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        self.lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("Deployment", name, namespace))
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: Deployment,
    ) -> Result<Deployment, Error> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        if !state.deployments.contains_key(&key) {
            return Err(not_found("Deployment", name, namespace));
        }

        state.deployments.insert(key, deployment.clone());
        Ok(deployment)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.lock();
        if state.fail_deployment_delete {
            return Err(injected_failure("Deployment", name, namespace));
        }

        let key = (namespace.to_string(), name.to_string());
        if let Some(deployment) = state.deployments.remove(&key) {
            // Garbage-collect the deployment's pods, as the platform would.
            let selector = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.selector.match_labels.as_ref())
                .map(crate::models::labels::selector_from)
                .unwrap_or_default();
            if !selector.is_empty() {
                state
                    .pods
                    .retain(|_, pod| !selector_matches(&selector, &pod.metadata));
            }
        }
        Ok(())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, Error> {
        Ok(self
            .lock()
            .deployments
            .iter()
            .filter(|((ns, _), deployment)| {
                ns == namespace && selector_matches(selector, &deployment.metadata)
            })
            .map(|(_, deployment)| deployment.clone())
            .collect())
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, Error> {
        let mut state = self.lock();
        let key = key(namespace, &service.metadata);
        if state.fail_service_create {
            return Err(injected_failure("Service", &key.1, namespace));
        }
        if state.services.contains_key(&key) {
            return Err(already_exists("Service", &key.1, namespace));
        }

        // The platform allocates an external port per service port.
        let mut service = service;
        if let Some(spec) = service.spec.as_mut() {
            if let Some(ports) = spec.ports.as_mut() {
                for port in ports.iter_mut() {
                    if port.node_port.is_none() {
                        port.node_port = Some(30000 + state.next_node_port);
                        state.next_node_port += 1;
                    }
                }
            }
        }

        state.services.insert(key, service.clone());
        Ok(service)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.lock()
            .services
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>, Error> {
        Ok(self
            .lock()
            .services
            .iter()
            .filter(|((ns, _), service)| {
                ns == namespace && selector_matches(selector, &service.metadata)
            })
            .map(|(_, service)| service.clone())
            .collect())
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        let mut state = self.lock();
        let key = key(namespace, &claim.metadata);
        if state.claims.contains_key(&key) {
            return Err(already_exists("PersistentVolumeClaim", &key.1, namespace));
        }

        state.claims.insert(key, claim.clone());
        Ok(claim)
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, Error> {
        self.lock()
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("PersistentVolumeClaim", name, namespace))
    }

    async fn replace_claim(
        &self,
        namespace: &str,
        name: &str,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        if !state.claims.contains_key(&key) {
            return Err(not_found("PersistentVolumeClaim", name, namespace));
        }

        state.claims.insert(key, claim.clone());
        Ok(claim)
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.lock()
            .claims
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        Ok(self
            .lock()
            .pods
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && selector_matches(selector, &pod.metadata))
            .map(|(_, pod)| pod.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::api::ObjectMeta;

    use super::selector_matches;

    fn meta_with(labels: &[(&str, &str)]) -> ObjectMeta {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        ObjectMeta {
            labels: Some(labels),
            ..ObjectMeta::default()
        }
    }

    #[test]
    fn selector_requires_every_requirement() {
        let meta = meta_with(&[("kind", "centos"), ("correlation", "abc")]);

        assert!(selector_matches("kind=centos", &meta));
        assert!(selector_matches("kind=centos,correlation=abc", &meta));
        assert!(!selector_matches("kind=centos,correlation=other", &meta));
        assert!(!selector_matches("missing=label", &meta));
    }

    #[test]
    fn empty_selector_matches_unlabeled_objects() {
        assert!(selector_matches("", &ObjectMeta::default()));
        assert!(!selector_matches("kind=centos", &ObjectMeta::default()));
    }
}
