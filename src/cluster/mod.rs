//! # k3s cluster bootstrap
//!
//! A node takes exactly one role per run:
//!
//! - **Standalone**: no cluster; the compose stack is managed directly.
//! - **Master**: installs k3s as a server, then hands out join credentials
//!   (URL + token) for workers.
//! - **Worker**: installs k3s as an agent joined to an existing master.
//!
//! ```text
//!   ┌──────────────┐   join URL + token   ┌──────────────┐
//!   │   Master     │ ───────────────────▶ │   Worker     │
//!   │ k3s server   │                      │  k3s agent   │
//!   │ :6443        │ ◀─────────────────── │              │
//!   └──────────────┘       register       └──────────────┘
//! ```
//!
//! After bootstrap both roles wait for the node to report Ready. Once the
//! workload manifest is applied, [`ConvergencePoller`] waits for each
//! LoadBalancer service to get an external address.

pub mod addons;
pub mod controller;
pub mod convergence;
pub mod role;

pub use controller::{count_ready_nodes, install_command, ClusterError, ClusterRoleController};
pub use convergence::{ConvergenceError, ConvergencePoller};
pub use role::{ClusterRole, JoinCredentials, RoleError};

/// k3s install script
pub const K3S_INSTALL_URL: &str = "https://get.k3s.io";

/// Port the k3s API server listens on
pub const CLUSTER_API_PORT: u16 = 6443;

/// Where the k3s server writes the token workers join with
pub const NODE_TOKEN_PATH: &str = "/var/lib/rancher/k3s/server/node-token";

/// kubectl bundled with k3s
pub const KUBECTL: &str = "k3s kubectl";
