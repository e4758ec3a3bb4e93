//! Command-line interface for stackup

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::cluster::{ClusterRole, RoleError};
use crate::deploy::RunOptions;
use crate::system::PollPolicy;

mod display;

pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "stackup")]
#[command(about = "Set up the AGiXT stack on Docker or a k3s cluster")]
#[command(version)]
pub struct Args {
    /// Use Kubernetes (k3s) instead of standalone Docker
    #[arg(long)]
    pub use_kubernetes: bool,

    /// Set up this host as the Kubernetes master node
    #[arg(long)]
    pub master: bool,

    /// Master node URL (required for worker setup)
    #[arg(long, value_name = "URL", env = "STACKUP_MASTER_URL")]
    pub master_url: Option<String>,

    /// Node token (required for worker setup)
    #[arg(long, value_name = "TOKEN", env = "STACKUP_NODE_TOKEN", hide_env_values = true)]
    pub node_token: Option<String>,

    /// Keep port forwarding across reboots
    #[arg(long)]
    pub persistent: bool,

    /// Start the cluster automatically on boot
    #[arg(long)]
    pub auto_start: bool,

    /// Include the ezlocalai inference sidecar
    #[arg(long)]
    pub with_ezlocalai: bool,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to a .env file loaded into the environment before resolving settings
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Give up polling after this many attempts (default: poll until ready).
    /// Bounds the wait when a LoadBalancer service can never get an address,
    /// e.g. two services sharing a port on a single-node cluster.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub poll_attempts: Option<u32>,

    /// Seconds between poll attempts
    #[arg(long, value_name = "SECS", default_value = "5")]
    pub poll_interval: u64,
}

impl Args {
    /// Cluster role implied by the flags
    pub fn role(&self) -> Result<ClusterRole, RoleError> {
        ClusterRole::from_flags(
            self.use_kubernetes,
            self.master,
            self.master_url.as_deref(),
            self.node_token.as_deref(),
        )
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let policy = PollPolicy::unbounded().with_interval(Duration::from_secs(self.poll_interval));
        match self.poll_attempts {
            Some(n) => policy.with_max_attempts(n),
            None => policy,
        }
    }

    pub fn run_options(&self) -> Result<RunOptions, RoleError> {
        Ok(RunOptions {
            role: self.role()?,
            persistent: self.persistent,
            auto_start: self.auto_start,
            with_sidecar: self.with_ezlocalai,
            poll: self.poll_policy(),
        })
    }
}
