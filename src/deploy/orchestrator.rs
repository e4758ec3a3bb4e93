//! The deployment run

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, warn};

use super::compose::{compose_file, sidecar_command, stack_update_command};
use super::sidecar::{
    self, checkout_command, handoff_overrides, render_sidecar_env, rewrite_sidecar_env, SIDECAR_DIR,
};
use super::{DeployError, DeploymentReport, Endpoint, RunOptions, Scope};
use crate::cluster::addons::{
    apply_device_plugin, apply_file, apply_load_balancer, LOAD_BALANCER_FILE,
};
use crate::cluster::{ClusterRole, ClusterRoleController, ConvergencePoller};
use crate::config::{default_settings, keys, ConfigStore, Configuration};
use crate::exposure::{AutoStart, ExposureConfigurer};
use crate::gpu::{parse_requested_tier, tier_for, GpuProbe};
use crate::manifest::{self, ServiceTopology, DEPLOYMENT_FILE};
use crate::system::{
    is_elevated, AddressResolver, CommandRunner, HostPlatform, Sleeper, Workspace, LOOPBACK_HOST,
};

/// Runs one deployment against the injected host seams
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    workspace: Arc<dyn Workspace>,
    sleeper: Arc<dyn Sleeper>,
    resolver: Arc<dyn AddressResolver>,
    platform: HostPlatform,
    env: HashMap<String, String>,
    cwd: PathBuf,
    native_gpu: bool,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: Arc<dyn Workspace>,
        sleeper: Arc<dyn Sleeper>,
        resolver: Arc<dyn AddressResolver>,
        platform: HostPlatform,
    ) -> Self {
        Self {
            runner,
            workspace,
            sleeper,
            resolver,
            platform,
            env: HashMap::new(),
            cwd: PathBuf::from("."),
            native_gpu: false,
        }
    }

    /// Live environment layer for configuration resolution
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Directory the default working directory is derived from
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_native_gpu(mut self, enabled: bool) -> Self {
        self.native_gpu = enabled;
        self
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<DeploymentReport, DeployError> {
        if opts.needs_elevation() && !is_elevated(self.runner.as_ref(), self.platform).await {
            return Err(DeployError::ElevationRequired);
        }

        let public_address = self.resolver.public_address().await;
        let store = self.config_store(&public_address);
        let config = store.resolve(&IndexMap::new())?;
        let topology = ServiceTopology::standard(opts.with_sidecar);
        let gpu = GpuProbe::new(self.runner.clone(), self.platform).with_native_probe(self.native_gpu);

        info!("Deploying as {} node", opts.role.name());
        match opts.role {
            ClusterRole::Standalone => {
                self.run_standalone(opts, &store, &config, &topology, &gpu)
                    .await
            }
            _ => {
                self.run_cluster(opts, &config, &topology, &gpu, &public_address)
                    .await
            }
        }
    }

    fn config_store(&self, public_address: &str) -> ConfigStore {
        let timezone = self.env.get(keys::TZ).map(String::as_str);
        let defaults = default_settings(public_address, &self.cwd, timezone);
        ConfigStore::new(self.workspace.clone(), defaults).with_env(self.env.clone())
    }

    // ------------------------------------------------------------------------
    // Standalone
    // ------------------------------------------------------------------------

    async fn run_standalone(
        &self,
        opts: &RunOptions,
        store: &ConfigStore,
        config: &Configuration,
        topology: &ServiceTopology,
        gpu: &GpuProbe,
    ) -> Result<DeploymentReport, DeployError> {
        let file = compose_file(config.value(keys::BRANCH));
        info!("Starting container stack from {}", file);
        self.run_logged(&stack_update_command(file, config.flag(keys::AUTO_UPDATE)))
            .await;

        if opts.with_sidecar {
            self.start_sidecar(store, config, gpu).await?;
        }

        let endpoints = topology
            .iter()
            .map(|(name, entry)| Endpoint::new(name, LOOPBACK_HOST, entry.port, Scope::Local))
            .collect();
        Ok(DeploymentReport {
            endpoints,
            join: None,
        })
    }

    async fn start_sidecar(
        &self,
        store: &ConfigStore,
        config: &Configuration,
        gpu: &GpuProbe,
    ) -> Result<(), DeployError> {
        let present = self.workspace.exists(Path::new(SIDECAR_DIR));
        self.run_logged(&checkout_command(present)).await;

        let memory = gpu.memory_info().await;
        let tier = tier_for(memory.free_mib, parse_requested_tier(config.value(keys::GPU_LAYERS)));
        info!(
            "GPU memory {} MiB total, {} MiB free, offloading {} layer(s)",
            memory.total_mib, memory.free_mib, tier
        );

        let overrides = handoff_overrides(config, tier);
        let env_path = sidecar::env_path();
        let content = match self.workspace.read(&env_path) {
            Ok(Some(existing)) => rewrite_sidecar_env(&existing, &overrides),
            Ok(None) => {
                warn!("{} not found, writing a fresh one", env_path.display());
                render_sidecar_env(&overrides)
            }
            Err(source) => return Err(io_error(&env_path, source)),
        };
        self.workspace
            .write(&env_path, &content)
            .map_err(|source| io_error(&env_path, source))?;

        // The tier is derived from free memory on every run; only the sidecar keeps it
        let mut shared = overrides;
        shared.shift_remove(keys::GPU_LAYERS);
        store.resolve(&shared)?;

        let cuda = memory.has_memory() && gpu.detect().await;
        info!("Starting sidecar{}", if cuda { " with CUDA" } else { "" });
        self.run_logged(&sidecar_command(SIDECAR_DIR, cuda)).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Cluster
    // ------------------------------------------------------------------------

    async fn run_cluster(
        &self,
        opts: &RunOptions,
        config: &Configuration,
        topology: &ServiceTopology,
        gpu: &GpuProbe,
        public_address: &str,
    ) -> Result<DeploymentReport, DeployError> {
        let controller =
            ClusterRoleController::new(self.runner.clone(), self.sleeper.clone(), public_address)
                .with_policy(opts.poll);
        let join = controller.bootstrap(&opts.role).await?;

        if opts.role == ClusterRole::Master {
            apply_load_balancer(self.runner.as_ref(), self.workspace.as_ref())
                .await
                .map_err(|source| io_error(Path::new(LOAD_BALANCER_FILE), source))?;
        }

        let mut tier = 0;
        if opts.with_sidecar && gpu.detect().await {
            apply_device_plugin(self.runner.as_ref()).await;
            let memory = gpu.memory_info().await;
            tier = tier_for(memory.free_mib, parse_requested_tier(config.value(keys::GPU_LAYERS)));
        }

        let manifest = manifest::build(topology, tier, opts.with_sidecar);
        manifest.validate()?;
        let yaml = manifest.to_yaml()?;
        apply_file(self.runner.as_ref(), self.workspace.as_ref(), DEPLOYMENT_FILE, &yaml)
            .await
            .map_err(|source| io_error(Path::new(DEPLOYMENT_FILE), source))?;
        info!(
            "Deployed {} unit(s) with {} exposure(s)",
            manifest.units.len(),
            manifest.exposures.len()
        );

        ExposureConfigurer::new(self.runner.clone(), self.workspace.clone(), self.platform)
            .cluster_mode(true)
            .configure(topology, opts.persistent)
            .await?;

        if opts.auto_start {
            AutoStart::new(self.runner.clone(), self.workspace.clone(), self.platform)
                .register()
                .await?;
        }

        let mut endpoints: Vec<Endpoint> = topology
            .iter()
            .map(|(name, entry)| Endpoint::new(name, public_address, entry.port, Scope::Node))
            .collect();

        for (port, names) in manifest.shared_ports() {
            warn!(
                "Port {} is published by {}; on a single-node cluster only one may get an address{}",
                port,
                names.join(", "),
                if opts.poll.max_attempts.is_none() {
                    " (use --poll-attempts to bound the wait)"
                } else {
                    ""
                }
            );
        }

        info!("Waiting for LoadBalancer to be assigned...");
        let poller =
            ConvergencePoller::new(self.runner.clone(), self.sleeper.clone()).with_policy(opts.poll);
        for (name, entry) in topology.iter() {
            let address = poller.await_external_address(name).await?;
            endpoints.push(Endpoint::new(name, &address, entry.port, Scope::Global));
        }

        Ok(DeploymentReport { endpoints, join })
    }

    /// Run a step whose failure degrades the result but does not stop the run
    async fn run_logged(&self, command: &str) {
        match self.runner.run(command).await {
            Ok(out) if out.success => {}
            Ok(out) => warn!(
                "`{}` exited with code {}: {}",
                command,
                out.code.unwrap_or(-1),
                out.stderr.trim()
            ),
            Err(e) => warn!("{}", e),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DeployError {
    DeployError::Io {
        path: path.display().to_string(),
        source,
    }
}
