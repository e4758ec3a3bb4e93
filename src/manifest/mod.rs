//! Workload manifests
//!
//! Turns a [`ServiceTopology`] into deployable units and LoadBalancer
//! exposures. Building is a pure data transform; rendering produces the
//! multi-document YAML handed to `kubectl apply`.

pub mod render;
pub mod topology;

pub use topology::{ServiceEntry, ServiceTopology};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

/// Primary application deployment name (also its `app` label)
pub const PRIMARY_APP: &str = "agixt";
pub const PRIMARY_IMAGE: &str = "joshxt/agixt:latest";

/// GPU sidecar deployment name (also its `app` label)
pub const SIDECAR_APP: &str = "ezlocalai";
pub const SIDECAR_IMAGE: &str = "ezlocalai/ezlocalai:latest";

/// Extended resource name advertised by the NVIDIA device plugin
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// File the rendered manifest is written to before applying
pub const DEPLOYMENT_FILE: &str = "agixt-deployment.yaml";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Service '{0}' must have a non-zero port")]
    InvalidPort(String),

    #[error("Service '{0}' is declared twice")]
    DuplicateService(String),

    #[error("Exposure '{name}' targets port {port}, which no deployment declares")]
    UndeclaredPort { name: String, port: u16 },

    #[error("Failed to render manifest: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// A single-container deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployableUnit {
    pub name: String,
    pub image: String,
    pub ports: Vec<u16>,
    /// Number of GPUs claimed, if any
    pub gpu_limit: Option<u32>,
    pub env: Vec<(String, String)>,
}

/// A LoadBalancer service routing `port` to the unit named `target_app`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSpec {
    pub name: String,
    pub target_app: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub units: Vec<DeployableUnit>,
    pub exposures: Vec<ExposureSpec>,
}

impl Manifest {
    pub fn unit(&self, name: &str) -> Option<&DeployableUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Every exposure must point at a port its target unit declares
    pub fn validate(&self) -> Result<(), ManifestError> {
        for exposure in &self.exposures {
            let declared = self
                .unit(&exposure.target_app)
                .is_some_and(|u| u.ports.contains(&exposure.port));
            if !declared {
                return Err(ManifestError::UndeclaredPort {
                    name: exposure.name.clone(),
                    port: exposure.port,
                });
            }
        }
        Ok(())
    }

    /// Exposure names grouped by a port that more than one exposure publishes.
    ///
    /// A single-node service load balancer binds each host port once, so all
    /// but the first exposure on a shared port may never get an address.
    pub fn shared_ports(&self) -> Vec<(u16, Vec<&str>)> {
        let mut by_port: IndexMap<u16, Vec<&str>> = IndexMap::new();
        for exposure in &self.exposures {
            by_port
                .entry(exposure.port)
                .or_default()
                .push(exposure.name.as_str());
        }
        by_port
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .collect()
    }
}

/// Name of the exposure for a service
pub fn exposure_name(service: &str) -> String {
    format!("{}-service", service.replace('_', "-"))
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Build the manifest for `topology`.
///
/// The primary unit exposes every non-sidecar port. With the sidecar enabled
/// a second unit exposes the accelerated ports, claims one GPU, and gets
/// `gpu_tier` as its layer count. Each topology entry yields one exposure
/// aimed at whichever unit declares its port.
pub fn build(topology: &ServiceTopology, gpu_tier: i32, sidecar_enabled: bool) -> Manifest {
    let mut primary_ports = Vec::new();
    let mut sidecar_ports = Vec::new();

    for (name, entry) in topology.iter() {
        let ports = if !entry.accelerated {
            &mut primary_ports
        } else if sidecar_enabled {
            &mut sidecar_ports
        } else {
            warn!("Skipping accelerated service '{}': sidecar is disabled", name);
            continue;
        };
        if !ports.contains(&entry.port) {
            ports.push(entry.port);
        }
    }

    let mut units = vec![DeployableUnit {
        name: PRIMARY_APP.to_string(),
        image: PRIMARY_IMAGE.to_string(),
        ports: primary_ports.clone(),
        gpu_limit: None,
        env: Vec::new(),
    }];

    if sidecar_enabled {
        units.push(DeployableUnit {
            name: SIDECAR_APP.to_string(),
            image: SIDECAR_IMAGE.to_string(),
            ports: sidecar_ports.clone(),
            gpu_limit: Some(1),
            env: vec![("GPU_LAYERS".to_string(), gpu_tier.to_string())],
        });
    }

    let exposures = topology
        .iter()
        .filter_map(|(name, entry)| {
            let target = if sidecar_ports.contains(&entry.port) {
                SIDECAR_APP
            } else if primary_ports.contains(&entry.port) {
                PRIMARY_APP
            } else {
                return None;
            };
            Some(ExposureSpec {
                name: exposure_name(name),
                target_app: target.to_string(),
                port: entry.port,
            })
        })
        .collect();

    Manifest { units, exposures }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_service_topology() -> ServiceTopology {
        ServiceTopology::new()
            .with_service("api", 7437)
            .and_then(|t| t.with_service("gui", 8501))
            .unwrap()
    }

    #[test]
    fn test_single_unit_without_sidecar() {
        let manifest = build(&two_service_topology(), 0, false);

        assert_eq!(manifest.units.len(), 1);
        assert_eq!(manifest.units[0].name, PRIMARY_APP);
        assert_eq!(manifest.units[0].ports, vec![7437, 8501]);
        assert_eq!(manifest.units[0].gpu_limit, None);

        assert_eq!(manifest.exposures.len(), 2);
        assert!(manifest.exposures.iter().all(|e| e.target_app == PRIMARY_APP));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_standard_topology_without_sidecar() {
        let topology = ServiceTopology::standard(false);
        let manifest = build(&topology, 0, false);

        assert_eq!(manifest.units.len(), 1);
        assert_eq!(manifest.exposures.len(), topology.len());
        assert!(manifest.exposures.iter().all(|e| e.target_app == PRIMARY_APP));
    }

    #[test]
    fn test_sidecar_unit_claims_one_gpu() {
        let manifest = build(&ServiceTopology::standard(true), 16, true);

        assert_eq!(manifest.units.len(), 2);
        let primary = manifest.unit(PRIMARY_APP).unwrap();
        let sidecar = manifest.unit(SIDECAR_APP).unwrap();

        assert_eq!(primary.gpu_limit, None);
        assert_eq!(primary.ports, vec![7437, 8501]);
        assert_eq!(sidecar.gpu_limit, Some(1));
        assert_eq!(sidecar.ports, vec![8091, 8502]);
        assert_eq!(sidecar.env, vec![("GPU_LAYERS".to_string(), "16".to_string())]);
    }

    #[test]
    fn test_exposures_target_declaring_unit() {
        let topology = ServiceTopology::standard(true);
        let manifest = build(&topology, 8, true);

        assert_eq!(manifest.exposures.len(), topology.len());
        for exposure in &manifest.exposures {
            let unit = manifest.unit(&exposure.target_app).unwrap();
            assert!(unit.ports.contains(&exposure.port));
        }
        let gui = manifest
            .exposures
            .iter()
            .find(|e| e.name == "ezlocalai-gui-service")
            .unwrap();
        assert_eq!(gui.target_app, SIDECAR_APP);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_accelerated_entries_skipped_when_sidecar_disabled() {
        let manifest = build(&ServiceTopology::standard(true), 8, false);

        assert_eq!(manifest.units.len(), 1);
        assert_eq!(manifest.exposures.len(), 3);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_undeclared_port() {
        let mut manifest = build(&two_service_topology(), 0, false);
        manifest.exposures.push(ExposureSpec {
            name: "ghost-service".to_string(),
            target_app: PRIMARY_APP.to_string(),
            port: 9999,
        });
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::UndeclaredPort { port: 9999, .. })
        ));
    }

    #[test]
    fn test_shared_ports() {
        let manifest = build(&ServiceTopology::standard(true), 0, true);
        assert_eq!(
            manifest.shared_ports(),
            vec![(7437, vec!["agixt-service", "api-service"])]
        );
        assert!(build(&two_service_topology(), 0, false).shared_ports().is_empty());
    }

    #[test]
    fn test_exposure_name_is_dns_safe() {
        assert_eq!(exposure_name("api"), "api-service");
        assert_eq!(exposure_name("ezlocalai_api"), "ezlocalai-api-service");
    }
}
