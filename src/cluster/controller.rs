//! One-shot bootstrap for the chosen [`ClusterRole`]

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::role::{ClusterRole, JoinCredentials, RoleError};
use super::{CLUSTER_API_PORT, K3S_INSTALL_URL, KUBECTL, NODE_TOKEN_PATH};
use crate::system::{run_checked, CommandRunner, ExecError, PollPolicy, Sleeper};

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error(transparent)]
    Role(#[from] RoleError),

    #[error("Failed to read join token from {path}: {source}")]
    JoinToken {
        path: &'static str,
        #[source]
        source: ExecError,
    },

    #[error("Join token at {0} is empty")]
    EmptyJoinToken(&'static str),

    #[error("No node became Ready after {attempts} attempts")]
    NodeNotReady { attempts: u32 },
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Installer command line, joining an existing master when credentials are given
pub fn install_command(join: Option<&JoinCredentials>) -> String {
    match join {
        Some(creds) => format!(
            "curl -sfL {} | K3S_URL={} K3S_TOKEN={} sh -",
            K3S_INSTALL_URL, creds.url, creds.token
        ),
        None => format!("curl -sfL {} | sh -", K3S_INSTALL_URL),
    }
}

/// Count nodes whose STATUS column is exactly `Ready` in `kubectl get node` output
pub fn count_ready_nodes(output: &str) -> usize {
    output
        .lines()
        .skip_while(|l| l.trim().is_empty())
        .skip(1)
        .filter(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|status| status.split(',').any(|s| s == "Ready"))
        })
        .count()
}

/// Join URL advertised by a master reachable at `public_address`
pub fn join_url(public_address: &str) -> String {
    format!("https://{}:{}", public_address, CLUSTER_API_PORT)
}

// ============================================================================
// SBIO: Controller with I/O (uses CommandRunner + Sleeper)
// ============================================================================

pub struct ClusterRoleController {
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    policy: PollPolicy,
    public_address: String,
}

impl ClusterRoleController {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sleeper: Arc<dyn Sleeper>,
        public_address: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            sleeper,
            policy: PollPolicy::default(),
            public_address: public_address.into(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Perform the bootstrap/join action for `role`.
    ///
    /// Returns join credentials when acting as master.
    pub async fn bootstrap(&self, role: &ClusterRole) -> Result<Option<JoinCredentials>, ClusterError> {
        match role {
            ClusterRole::Standalone => {
                debug!("Standalone role, no cluster bootstrap");
                Ok(None)
            }
            ClusterRole::Master => {
                info!("Bootstrapping k3s master");
                self.install(None).await;
                // The server writes the token while it starts up
                self.await_node_ready().await?;
                let token = self.read_join_token().await?;
                Ok(Some(JoinCredentials {
                    url: join_url(&self.public_address),
                    token,
                }))
            }
            ClusterRole::Worker(creds) => {
                info!("Joining k3s cluster at {}", creds.url);
                self.install(Some(creds)).await;
                self.await_node_ready().await?;
                Ok(None)
            }
        }
    }

    /// Run the installer once; failures are logged, never retried
    async fn install(&self, join: Option<&JoinCredentials>) {
        let command = install_command(join);
        match self.runner.run(&command).await {
            Ok(out) if out.success => info!("k3s installer finished"),
            Ok(out) => error!(
                "k3s installer exited with code {}: {}",
                out.code.unwrap_or(-1),
                out.stderr.trim()
            ),
            Err(e) => error!("k3s installer could not run: {}", e),
        }
    }

    async fn read_join_token(&self) -> Result<String, ClusterError> {
        let token = run_checked(self.runner.as_ref(), &format!("cat {}", NODE_TOKEN_PATH))
            .await
            .map_err(|source| ClusterError::JoinToken {
                path: NODE_TOKEN_PATH,
                source,
            })?;
        if token.is_empty() {
            return Err(ClusterError::EmptyJoinToken(NODE_TOKEN_PATH));
        }
        Ok(token)
    }

    /// Poll until at least one node reports Ready
    pub async fn await_node_ready(&self) -> Result<usize, ClusterError> {
        let command = format!("{} get node", KUBECTL);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.runner.run(&command).await {
                Ok(out) if out.success => {
                    let ready = count_ready_nodes(&out.stdout);
                    if ready > 0 {
                        info!("{} node(s) Ready after {} attempt(s)", ready, attempt);
                        return Ok(ready);
                    }
                    debug!("No Ready node yet (attempt {})", attempt);
                }
                Ok(out) => debug!("Node query failed (attempt {}): {}", attempt, out.stderr.trim()),
                Err(e) => warn!("Node query could not run (attempt {}): {}", attempt, e),
            }

            if self.policy.exhausted(attempt) {
                error!("Cluster node not Ready after {} attempts", attempt);
                return Err(ClusterError::NodeNotReady { attempts: attempt });
            }
            self.sleeper.sleep(self.policy.interval).await;
        }
    }
}
