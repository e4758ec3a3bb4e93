//! End-to-end deployment
//!
//! The [`Orchestrator`] wires configuration, GPU probing, cluster role,
//! manifests, exposure and convergence together in a single pass and
//! reports where each service ended up.
//!
//! ```text
//!   ConfigStore ──> GpuProbe ──> ConfigStore (sidecar hand-off)
//!        │
//!        ├── standalone ──> compose stack ──> sidecar stack
//!        │
//!        └── cluster ──> role bootstrap ──> add-ons ──> manifest apply
//!                              ──> exposure ──> auto-start ──> convergence
//! ```

pub mod compose;
pub mod orchestrator;
pub mod sidecar;

pub use orchestrator::Orchestrator;

use std::fmt;

use thiserror::Error;

use crate::cluster::{ClusterError, ClusterRole, ConvergenceError, JoinCredentials};
use crate::config::ConfigError;
use crate::exposure::ExposureError;
use crate::manifest::ManifestError;
use crate::system::PollPolicy;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Elevated permissions required")]
    ElevationRequired,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Exposure(ExposureError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ExposureError> for DeployError {
    fn from(e: ExposureError) -> Self {
        match e {
            ExposureError::ElevationRequired => DeployError::ElevationRequired,
            other => DeployError::Exposure(other),
        }
    }
}

/// What a single run should do
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub role: ClusterRole,
    pub persistent: bool,
    pub auto_start: bool,
    pub with_sidecar: bool,
    pub poll: PollPolicy,
}

impl RunOptions {
    pub fn new(role: ClusterRole) -> Self {
        Self {
            role,
            persistent: false,
            auto_start: false,
            with_sidecar: false,
            poll: PollPolicy::default(),
        }
    }

    /// Whether the run touches host state that needs elevated privilege
    pub fn needs_elevation(&self) -> bool {
        self.persistent || self.auto_start || self.role.is_cluster()
    }
}

/// How far an endpoint is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// This host only
    Local,
    /// Through the node's public address
    Node,
    /// Through the cluster load balancer
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => write!(f, "local"),
            Scope::Node => write!(f, "node"),
            Scope::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub service: String,
    pub url: String,
    pub scope: Scope,
}

impl Endpoint {
    pub fn new(service: &str, host: &str, port: u16, scope: Scope) -> Self {
        Self {
            service: service.to_string(),
            url: format!("http://{}:{}", host, port),
            scope,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub endpoints: Vec<Endpoint>,
    /// Credentials for workers, present when this node became the master
    pub join: Option<JoinCredentials>,
}

impl DeploymentReport {
    pub fn endpoints_with(&self, scope: Scope) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(move |e| e.scope == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_elevation() {
        assert!(!RunOptions::new(ClusterRole::Standalone).needs_elevation());
        assert!(RunOptions::new(ClusterRole::Master).needs_elevation());

        let mut opts = RunOptions::new(ClusterRole::Standalone);
        opts.persistent = true;
        assert!(opts.needs_elevation());

        let mut opts = RunOptions::new(ClusterRole::Standalone);
        opts.auto_start = true;
        assert!(opts.needs_elevation());
    }

    #[test]
    fn test_exposure_elevation_maps_to_deploy_elevation() {
        let err: DeployError = ExposureError::ElevationRequired.into();
        assert!(matches!(err, DeployError::ElevationRequired));
    }

    #[test]
    fn test_endpoint_url() {
        let e = Endpoint::new("agixt", "203.0.113.7", 7437, Scope::Node);
        assert_eq!(e.url, "http://203.0.113.7:7437");
        assert_eq!(e.scope.to_string(), "node");
    }
}
