use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Client;
use log::{debug, error, warn};

use crate::config::BundleConfig;
use crate::controllers::volume::{mounts_for, VolumeProvisioner};
use crate::models::bundle::{
    claim_name, service_name, BundleHandle, BundleSummary, EditableBundle, InstanceStatus,
};
use crate::models::catalog::{KindSpec, SandboxKind};
use crate::models::labels::{kind_selector, BundleLabels, CORRELATION_LABEL};
use crate::models::resources::{
    split_resources, BundleResources, ResourceSplit, CPU, EPHEMERAL_STORAGE, MEMORY,
};
use crate::platform::kube::KubePlatform;
use crate::platform::Platform;
use crate::utils::error::Error;

/// Provisions, reconciles, lists and tears down application bundles: the
/// deployment, optional volume claim and service that together make up one
/// sandbox environment.
pub struct BundleController {
    platform: Arc<dyn Platform>,
    volumes: VolumeProvisioner,
    config: BundleConfig,
}

impl BundleController {
    pub fn new(platform: Arc<dyn Platform>, config: BundleConfig) -> Self {
        let volumes = VolumeProvisioner::new(platform.clone());

        BundleController {
            platform,
            volumes,
            config,
        }
    }

    /// Convenience constructor for production use against a real cluster.
    pub fn with_client(client: Client, config: BundleConfig) -> Self {
        let platform = Arc::new(KubePlatform::new(client, config.platform_timeout));
        BundleController::new(platform, config)
    }

    /// Creates a new bundle: splits the declared resource ceilings into
    /// guaranteed floors, generates the correlation identity, provisions the
    /// optional volume claim, then creates the workload and its service.
    ///
    /// The steps are not transactional. Validation failures happen before
    /// anything is created. If the service create fails after the workload
    /// succeeded, the workload is deleted again and the original error is
    /// returned; if that compensating delete fails too, the returned
    /// `Error::Orphan` names the leftover workload.
    pub async fn create_bundle(
        &self,
        name: &str,
        namespace: &str,
        kind: SandboxKind,
        resources: &BundleResources,
    ) -> Result<BundleHandle, Error> {
        debug!("create_bundle {}/{} ({:?})", namespace, name, kind);

        let kind_spec = self.config.catalog.get(kind)?.clone();
        let split = split_resources(resources, self.config.request_divisor)?;
        let labels = BundleLabels::new(kind);

        let (volumes, mounts) = self
            .volumes
            .provision(
                namespace,
                &claim_name(name),
                resources,
                labels.as_map(),
                &self.config.access_modes,
            )
            .await?;

        let deployment = build_deployment(
            name,
            namespace,
            kind,
            &kind_spec,
            labels.as_map(),
            &split,
            volumes,
            mounts,
        );
        self.platform.create_deployment(namespace, deployment).await?;

        let service = build_service(name, namespace, &kind_spec, labels.as_map());
        if let Err(create_err) = self.platform.create_service(namespace, service).await {
            warn!(
                "service create for bundle {}/{} failed, deleting its workload: {}",
                namespace, name, create_err
            );

            if let Err(cleanup_err) = self.platform.delete_deployment(namespace, name).await {
                error!(
                    "compensating delete of deployment {}/{} failed: {}",
                    namespace, name, cleanup_err
                );
                return Err(Error::Orphan {
                    object_kind: "Deployment".to_string(),
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    source: Box::new(create_err),
                });
            }

            return Err(create_err);
        }

        Ok(BundleHandle {
            name: name.to_string(),
            namespace: namespace.to_string(),
            correlation_id: labels.correlation_id().to_string(),
        })
    }

    /// Fetches a bundle's current configuration for editing. A missing
    /// volume claim is normal (the bundle may have been created without
    /// one); a missing workload means there is no bundle to edit.
    pub async fn get_bundle_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<EditableBundle, Error> {
        let claim = match self.platform.get_claim(namespace, &claim_name(name)).await {
            Ok(claim) => Some(claim),
            Err(Error::PlatformNotFound { .. }) => {
                debug!("bundle {}/{} has no volume claim", namespace, name);
                None
            }
            Err(err) => return Err(err),
        };

        let deployment = self.platform.get_deployment(namespace, name).await?;
        let container = first_container(&deployment, name, namespace)?;

        let mount_paths = container
            .volume_mounts
            .as_ref()
            .map(|mounts| mounts.iter().map(|mount| mount.mount_path.clone()).collect())
            .unwrap_or_default();

        let volume_size = claim.as_ref().and_then(|claim| {
            claim
                .spec
                .as_ref()?
                .resources
                .as_ref()?
                .requests
                .as_ref()?
                .get("storage")
                .map(|quantity| quantity.0.clone())
        });
        let storage_class = claim
            .as_ref()
            .and_then(|claim| claim.spec.as_ref()?.storage_class_name.clone());

        Ok(EditableBundle {
            name: name.to_string(),
            namespace: namespace.to_string(),
            resources: BundleResources {
                cpu: limit_of(container, CPU),
                memory: limit_of(container, MEMORY),
                storage: limit_of(container, EPHEMERAL_STORAGE),
                volume_size,
                storage_class,
                mount_paths,
            },
        })
    }

    /// Applies new resource ceilings (and optionally a grown volume) to an
    /// existing bundle. Only the container's requests/limits and the volume
    /// wiring are replaced; image, command, ports, labels and replica count
    /// stay untouched. A concurrent modification surfaces as
    /// `Error::PlatformConflict` and is the caller's to retry after a fresh
    /// get.
    pub async fn update_bundle(
        &self,
        name: &str,
        namespace: &str,
        resources: &BundleResources,
    ) -> Result<(), Error> {
        debug!("update_bundle {}/{}", namespace, name);

        let split = split_resources(resources, self.config.request_divisor)?;
        let deployment = self.platform.get_deployment(namespace, name).await?;

        let (volumes, mounts) = if resources.volume_size().is_some() {
            let labels = deployment.metadata.labels.clone().unwrap_or_default();
            self.volumes
                .ensure_capacity(
                    namespace,
                    &claim_name(name),
                    resources,
                    &labels,
                    &self.config.access_modes,
                )
                .await?;
            mounts_for(&claim_name(name), &resources.mount_paths)
        } else {
            (Vec::new(), Vec::new())
        };

        let updated = merge_bundle_resources(&deployment, name, namespace, &split, volumes, mounts)?;
        self.platform
            .replace_deployment(namespace, name, updated)
            .await?;
        Ok(())
    }

    /// Deletes a bundle's workload and service. Already-absent objects count
    /// as deleted. The volume claim is kept unless the configuration says
    /// otherwise, so user data survives teardown by default.
    pub async fn delete_bundle(&self, name: &str, namespace: &str) -> Result<(), Error> {
        debug!("delete_bundle {}/{}", namespace, name);

        self.platform.delete_deployment(namespace, name).await?;
        self.platform
            .delete_service(namespace, &service_name(name))
            .await?;

        if self.config.delete_volume_on_teardown {
            self.platform
                .delete_claim(namespace, &claim_name(name))
                .await?;
        }

        Ok(())
    }

    /// Lists every bundle of the given kind in a namespace, joining each
    /// workload with its pods and service by correlation id into a summary
    /// view.
    pub async fn list_bundles(
        &self,
        namespace: &str,
        kind: SandboxKind,
    ) -> Result<Vec<BundleSummary>, Error> {
        let selector = kind_selector(kind);

        let deployments = self.platform.list_deployments(namespace, &selector).await?;
        let pods = self.platform.list_pods(namespace, &selector).await?;
        let services = self.platform.list_services(namespace, &selector).await?;

        let summaries = deployments
            .iter()
            .map(|deployment| summarize(deployment, &pods, &services))
            .collect();

        Ok(summaries)
    }
}

fn correlation_of(metadata: &ObjectMeta) -> Option<&String> {
    metadata.labels.as_ref()?.get(CORRELATION_LABEL)
}

fn summarize(deployment: &Deployment, pods: &[Pod], services: &[Service]) -> BundleSummary {
    let correlation = correlation_of(&deployment.metadata);

    let instances: Vec<InstanceStatus> = pods
        .iter()
        .filter(|pod| correlation_of(&pod.metadata) == correlation)
        .map(instance_status)
        .collect();

    let node_ports: Vec<i32> = services
        .iter()
        .filter(|service| correlation_of(&service.metadata) == correlation)
        .flat_map(|service| {
            service
                .spec
                .iter()
                .flat_map(|spec| spec.ports.iter().flatten())
                .filter_map(|port| port.node_port)
        })
        .collect();

    let endpoints = instances
        .iter()
        .filter_map(|instance| instance.node_ip.as_deref())
        .flat_map(|ip| {
            node_ports
                .iter()
                .map(move |port| format!("{}:{}", ip, port))
        })
        .collect();

    BundleSummary {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        correlation_id: correlation.cloned(),
        instances,
        endpoints,
    }
}

fn instance_status(pod: &Pod) -> InstanceStatus {
    let status = pod.status.as_ref();

    let ready = status
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
        .unwrap_or(false);

    InstanceStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        ready,
        phase: status
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        node_ip: status.and_then(|status| status.host_ip.clone()),
    }
}

fn first_container<'a>(
    deployment: &'a Deployment,
    name: &str,
    namespace: &str,
) -> Result<&'a Container, Error> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod_spec| pod_spec.containers.first())
        .ok_or_else(|| {
            Error::Validation(format!(
                "deployment {}/{} has no containers",
                namespace, name
            ))
        })
}

fn limit_of(container: &Container, dimension: &str) -> String {
    container
        .resources
        .as_ref()
        .and_then(|resources| resources.limits.as_ref())
        .and_then(|limits| limits.get(dimension))
        .map(|quantity| quantity.0.clone())
        .unwrap_or_default()
}

fn build_deployment(
    name: &str,
    namespace: &str,
    kind: SandboxKind,
    kind_spec: &KindSpec,
    labels: &BTreeMap<String, String>,
    split: &ResourceSplit,
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
) -> Deployment {
    let container = Container {
        name: kind.key().to_string(),
        image: Some(kind_spec.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(kind_spec.command.clone()),
        security_context: Some(SecurityContext {
            privileged: Some(kind_spec.privileged),
            ..SecurityContext::default()
        }),
        ports: Some(
            kind_spec
                .ports
                .iter()
                .map(|port| ContainerPort {
                    container_port: port.port,
                    ..ContainerPort::default()
                })
                .collect(),
        ),
        resources: Some(ResourceRequirements {
            requests: Some(split.requests.clone()),
            limits: Some(split.limits.clone()),
            ..ResourceRequirements::default()
        }),
        volume_mounts: if mounts.is_empty() { None } else { Some(mounts) },
        ..Container::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Always".to_string()),
                    volumes: if volumes.is_empty() { None } else { Some(volumes) },
                    containers: vec![container],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

fn build_service(
    name: &str,
    namespace: &str,
    kind_spec: &KindSpec,
    labels: &BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(labels.clone()),
            ports: Some(
                kind_spec
                    .ports
                    .iter()
                    .map(|port| ServicePort {
                        name: Some(port.name.clone()),
                        port: port.port,
                        target_port: Some(IntOrString::Int(port.port)),
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Derives the updated workload spec from a freshly fetched one, replacing
/// only the resource requirements and volume wiring. Everything else (image,
/// command, ports, labels, replicas) is carried over from the fetched value.
fn merge_bundle_resources(
    deployment: &Deployment,
    name: &str,
    namespace: &str,
    split: &ResourceSplit,
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
) -> Result<Deployment, Error> {
    let mut updated = deployment.clone();

    let pod_spec = updated
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| {
            Error::Validation(format!(
                "deployment {}/{} has no pod template",
                namespace, name
            ))
        })?;

    pod_spec.volumes = if volumes.is_empty() { None } else { Some(volumes) };

    let container = pod_spec.containers.first_mut().ok_or_else(|| {
        Error::Validation(format!(
            "deployment {}/{} has no containers",
            namespace, name
        ))
    })?;

    container.resources = Some(ResourceRequirements {
        requests: Some(split.requests.clone()),
        limits: Some(split.limits.clone()),
        ..ResourceRequirements::default()
    });
    container.volume_mounts = if mounts.is_empty() { None } else { Some(mounts) };

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{build_deployment, build_service, merge_bundle_resources};
    use crate::controllers::volume::mounts_for;
    use crate::models::catalog::{Catalog, SandboxKind};
    use crate::models::resources::{split_resources, BundleResources, CPU, MEMORY};

    fn labels() -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("bundle.example.com/kind".to_string(), "centos".to_string());
        labels.insert(
            "bundle.example.com/correlation".to_string(),
            "11111111-2222-3333-4444-555555555555".to_string(),
        );
        labels
    }

    fn resources() -> BundleResources {
        BundleResources {
            cpu: "2".to_string(),
            memory: "4Gi".to_string(),
            storage: "10Gi".to_string(),
            ..BundleResources::default()
        }
    }

    #[test]
    fn workload_and_service_share_the_selector() {
        let catalog = Catalog::default();
        let kind_spec = catalog.get(SandboxKind::Centos).unwrap();
        let split = split_resources(&resources(), 2).unwrap();
        let labels = labels();

        let deployment = build_deployment(
            "box1",
            "ns1",
            SandboxKind::Centos,
            kind_spec,
            &labels,
            &split,
            Vec::new(),
            Vec::new(),
        );
        let service = build_service("box1", "ns1", kind_spec, &labels);

        let deployment_selector = deployment
            .spec
            .as_ref()
            .unwrap()
            .selector
            .match_labels
            .as_ref()
            .unwrap();
        let service_selector = service.spec.as_ref().unwrap().selector.as_ref().unwrap();
        assert_eq!(deployment_selector, service_selector);
        assert_eq!(service.metadata.name.as_deref(), Some("box1-service"));
    }

    #[test]
    fn workload_is_a_single_always_restarting_replica() {
        let catalog = Catalog::default();
        let kind_spec = catalog.get(SandboxKind::Centos).unwrap();
        let split = split_resources(&resources(), 2).unwrap();

        let deployment = build_deployment(
            "box1",
            "ns1",
            SandboxKind::Centos,
            kind_spec,
            &labels(),
            &split,
            Vec::new(),
            Vec::new(),
        );

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));

        let pod_spec = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Always"));
        assert_eq!(pod_spec.containers.len(), 1);

        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("centos:7"));
        assert_eq!(
            container
                .security_context
                .as_ref()
                .unwrap()
                .privileged,
            Some(true)
        );

        let container_resources = container.resources.as_ref().unwrap();
        let requests = container_resources.requests.as_ref().unwrap();
        let limits = container_resources.limits.as_ref().unwrap();
        assert_eq!(requests[CPU].0, "1");
        assert_eq!(limits[CPU].0, "2");
    }

    #[test]
    fn merge_replaces_resources_and_leaves_the_rest_alone() {
        let catalog = Catalog::default();
        let kind_spec = catalog.get(SandboxKind::Ubuntu).unwrap();
        let original_split = split_resources(&resources(), 2).unwrap();

        let deployment = build_deployment(
            "box1",
            "ns1",
            SandboxKind::Ubuntu,
            kind_spec,
            &labels(),
            &original_split,
            Vec::new(),
            Vec::new(),
        );

        let mut new_resources = resources();
        new_resources.memory = "8Gi".to_string();
        let new_split = split_resources(&new_resources, 2).unwrap();
        let (volumes, mounts) = mounts_for("box1-pvc", &["/data".to_string()]);

        let merged =
            merge_bundle_resources(&deployment, "box1", "ns1", &new_split, volumes, mounts)
                .unwrap();

        let pod_spec = merged.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let container = &pod_spec.containers[0];

        assert_eq!(container.image.as_deref(), Some("ubuntu:20.04"));
        assert_eq!(container.command, Some(vec!["/init.sh".to_string()]));
        assert_eq!(
            container.resources.as_ref().unwrap().limits.as_ref().unwrap()[MEMORY].0,
            "8Gi"
        );
        assert_eq!(
            container.volume_mounts.as_ref().unwrap()[0].mount_path,
            "/data"
        );
        assert_eq!(pod_spec.volumes.as_ref().unwrap().len(), 1);
        assert_eq!(merged.metadata.labels, deployment.metadata.labels);
    }

    #[test]
    fn merge_rejects_a_workload_without_containers() {
        let deployment = k8s_openapi::api::apps::v1::Deployment::default();
        let split = split_resources(&resources(), 2).unwrap();

        let result =
            merge_bundle_resources(&deployment, "box1", "ns1", &split, Vec::new(), Vec::new());
        assert!(result.is_err());
    }
}
