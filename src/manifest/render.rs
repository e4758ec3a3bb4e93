//! Kubernetes YAML rendering for a [`Manifest`]

use std::collections::BTreeMap;

use serde::Serialize;

use super::{DeployableUnit, ExposureSpec, Manifest, ManifestError, GPU_RESOURCE};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: DeploymentSpec,
}

#[derive(Debug, Serialize)]
struct ObjectMeta {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSpec {
    replicas: u32,
    selector: LabelSelector,
    template: PodTemplate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PodTemplate {
    metadata: PodMeta,
    spec: PodSpec,
}

#[derive(Debug, Serialize)]
struct PodMeta {
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Debug, Serialize)]
struct Container {
    name: String,
    image: String,
    ports: Vec<ContainerPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<Resources>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPort {
    container_port: u16,
}

#[derive(Debug, Serialize)]
struct EnvVar {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct Resources {
    limits: BTreeMap<String, u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Service {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: ServiceSpec,
}

#[derive(Debug, Serialize)]
struct ServiceSpec {
    #[serde(rename = "type")]
    service_type: &'static str,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    port: u16,
    target_port: u16,
}

fn app_label(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

fn deployment(unit: &DeployableUnit) -> Deployment {
    Deployment {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: ObjectMeta {
            name: unit.name.clone(),
            namespace: None,
        },
        spec: DeploymentSpec {
            replicas: 1,
            selector: LabelSelector {
                match_labels: app_label(&unit.name),
            },
            template: PodTemplate {
                metadata: PodMeta {
                    labels: app_label(&unit.name),
                },
                spec: PodSpec {
                    containers: vec![Container {
                        name: unit.name.clone(),
                        image: unit.image.clone(),
                        ports: unit
                            .ports
                            .iter()
                            .map(|&container_port| ContainerPort { container_port })
                            .collect(),
                        env: unit
                            .env
                            .iter()
                            .map(|(name, value)| EnvVar {
                                name: name.clone(),
                                value: value.clone(),
                            })
                            .collect(),
                        resources: unit.gpu_limit.map(|count| Resources {
                            limits: BTreeMap::from([(GPU_RESOURCE.to_string(), count)]),
                        }),
                    }],
                },
            },
        },
    }
}

fn service(exposure: &ExposureSpec) -> Service {
    Service {
        api_version: "v1",
        kind: "Service",
        metadata: ObjectMeta {
            name: exposure.name.clone(),
            namespace: None,
        },
        spec: ServiceSpec {
            service_type: "LoadBalancer",
            selector: app_label(&exposure.target_app),
            ports: vec![ServicePort {
                port: exposure.port,
                target_port: exposure.port,
            }],
        },
    }
}

impl Manifest {
    /// Render deployments then services as `---`-separated YAML documents
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        let mut docs = Vec::with_capacity(self.units.len() + self.exposures.len());
        for unit in &self.units {
            docs.push(serde_yaml::to_string(&deployment(unit))?);
        }
        for exposure in &self.exposures {
            docs.push(serde_yaml::to_string(&service(exposure))?);
        }
        Ok(docs.join("---\n"))
    }
}
