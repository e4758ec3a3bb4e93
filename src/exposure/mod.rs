//! Host-level port exposure
//!
//! Makes every service port reachable on all interfaces by redirecting it
//! to the same port on loopback, using the platform's own NAT facility:
//! iptables on Linux, pf on macOS, `netsh portproxy` on Windows.

pub mod autostart;

pub use autostart::{AutoStart, AUTOSTART_SERVICE};

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::ServiceTopology;
use crate::system::{is_elevated, CommandRunner, HostPlatform, Workspace};

/// Persistent iptables rule set read by `iptables-persistent`
pub const IPTABLES_RULES_FILE: &str = "/etc/iptables/rules.v4";

/// pf configuration loaded at boot
pub const PF_CONF_FILE: &str = "/etc/pf.conf";

/// Marker line preceding our block in `pf.conf`
pub const PF_MARKER: &str = "# stackup port forwarding";

const WINDOWS_RUN_KEY: &str = r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Run";

#[derive(Error, Debug)]
pub enum ExposureError {
    #[error("Elevated permissions required")]
    ElevationRequired,

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Redirect of `port` on every interface to `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureRule {
    pub port: u16,
    pub target: String,
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// One rule per distinct service port, in topology order
pub fn rules_for(topology: &ServiceTopology) -> Vec<ExposureRule> {
    topology
        .ports()
        .into_iter()
        .map(|port| ExposureRule {
            port,
            target: format!("127.0.0.1:{}", port),
        })
        .collect()
}

fn iptables_spec(rule: &ExposureRule) -> String {
    format!(
        "PREROUTING -p tcp --dport {} -j REDIRECT --to-port {}",
        rule.port, rule.port
    )
}

fn pf_rule(rule: &ExposureRule) -> String {
    format!(
        "rdr pass inet proto tcp from any to any port {} -> 127.0.0.1 port {}",
        rule.port, rule.port
    )
}

fn netsh_rule(rule: &ExposureRule) -> String {
    format!(
        "netsh interface portproxy add v4tov4 listenport={} listenaddress=0.0.0.0 connectport={} connectaddress=127.0.0.1",
        rule.port, rule.port
    )
}

/// `iptables-restore` input holding the NAT table with our redirects
pub fn iptables_rule_set(rules: &[ExposureRule]) -> String {
    let mut out = String::from(
        "*nat\n:PREROUTING ACCEPT [0:0]\n:INPUT ACCEPT [0:0]\n:OUTPUT ACCEPT [0:0]\n:POSTROUTING ACCEPT [0:0]\n",
    );
    for rule in rules {
        out.push_str(&format!("-A {}\n", iptables_spec(rule)));
    }
    out.push_str("COMMIT\n");
    out
}

/// pf redirect rules, one per line
pub fn pf_rules(rules: &[ExposureRule]) -> String {
    rules.iter().map(pf_rule).collect::<Vec<_>>().join("\n")
}

/// Logon command re-adding every portproxy rule, chained for `cmd /c`
pub fn windows_restore_command(rules: &[ExposureRule]) -> String {
    let chained = rules.iter().map(netsh_rule).collect::<Vec<_>>().join(" & ");
    format!("cmd /c {}", chained)
}

/// Commands applying `rules` for the current boot only.
/// `None` when the platform has no supported facility.
pub fn session_commands(platform: HostPlatform, rules: &[ExposureRule]) -> Option<Vec<String>> {
    match platform {
        // Check before appending so re-runs don't stack duplicate rules
        HostPlatform::Linux => Some(
            rules
                .iter()
                .map(|r| {
                    let spec = iptables_spec(r);
                    format!("iptables -t nat -C {spec} 2>/dev/null || iptables -t nat -A {spec}")
                })
                .collect(),
        ),
        // pfctl -f replaces the loaded ruleset, so every redirect goes in one load
        HostPlatform::MacOs => {
            let lines: Vec<String> = rules.iter().map(|r| format!("\"{}\"", pf_rule(r))).collect();
            Some(vec![format!("printf '%s\\n' {} | pfctl -ef -", lines.join(" "))])
        }
        HostPlatform::Windows => Some(rules.iter().map(netsh_rule).collect()),
        HostPlatform::Unsupported => None,
    }
}

// ============================================================================
// SBIO: Configurer with I/O
// ============================================================================

pub struct ExposureConfigurer {
    runner: Arc<dyn CommandRunner>,
    workspace: Arc<dyn Workspace>,
    platform: HostPlatform,
    cluster_mode: bool,
}

impl ExposureConfigurer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: Arc<dyn Workspace>,
        platform: HostPlatform,
    ) -> Self {
        Self {
            runner,
            workspace,
            platform,
            cluster_mode: false,
        }
    }

    /// Exposing a cluster deployment always needs elevated privilege
    pub fn cluster_mode(mut self, enabled: bool) -> Self {
        self.cluster_mode = enabled;
        self
    }

    /// Apply one redirect per topology port.
    ///
    /// With `persistent`, rules are also written to the platform's boot-time
    /// configuration. Returns the rules that were applied (none on an
    /// unsupported platform).
    pub async fn configure(
        &self,
        topology: &ServiceTopology,
        persistent: bool,
    ) -> Result<Vec<ExposureRule>, ExposureError> {
        if self.platform == HostPlatform::Unsupported {
            warn!("Unsupported operating system: {}", self.platform);
            return Ok(Vec::new());
        }
        if (persistent || self.cluster_mode) && !is_elevated(self.runner.as_ref(), self.platform).await {
            return Err(ExposureError::ElevationRequired);
        }

        let rules = rules_for(topology);

        if persistent {
            match self.platform {
                HostPlatform::Linux => self.persist_linux(&rules).await?,
                HostPlatform::MacOs => self.persist_macos(&rules).await?,
                HostPlatform::Windows => self.persist_windows(&rules).await,
                HostPlatform::Unsupported => {}
            }
        } else {
            let Some(commands) = session_commands(self.platform, &rules) else {
                warn!("Unsupported operating system: {}", self.platform);
                return Ok(Vec::new());
            };
            self.run_all(&commands).await;
        }

        info!(
            "Configured {} port redirect(s){}",
            rules.len(),
            if persistent { " (persistent)" } else { "" }
        );
        Ok(rules)
    }

    async fn persist_linux(&self, rules: &[ExposureRule]) -> Result<(), ExposureError> {
        self.write(IPTABLES_RULES_FILE, &iptables_rule_set(rules), false)?;
        self.run_all(&[
            format!("iptables-restore < {}", IPTABLES_RULES_FILE),
            "apt-get install -y iptables-persistent".to_string(),
        ])
        .await;
        Ok(())
    }

    async fn persist_macos(&self, rules: &[ExposureRule]) -> Result<(), ExposureError> {
        let existing = self
            .workspace
            .read(Path::new(PF_CONF_FILE))
            .ok()
            .flatten()
            .unwrap_or_default();
        if existing.contains(PF_MARKER) {
            info!("{} already carries our redirect rules", PF_CONF_FILE);
        } else {
            self.write(PF_CONF_FILE, &format!("\n{}\n{}\n", PF_MARKER, pf_rules(rules)), true)?;
        }
        self.run_all(&[format!("pfctl -ef {}", PF_CONF_FILE)]).await;
        Ok(())
    }

    async fn persist_windows(&self, rules: &[ExposureRule]) {
        let mut commands: Vec<String> = rules.iter().map(netsh_rule).collect();
        commands.push(format!(
            "reg add {} /v StackupPortForward /t REG_SZ /d \"{}\" /f",
            WINDOWS_RUN_KEY,
            windows_restore_command(rules)
        ));
        self.run_all(&commands).await;
    }

    fn write(&self, path: &str, contents: &str, append: bool) -> Result<(), ExposureError> {
        let p = Path::new(path);
        let result = if append {
            self.workspace.append(p, contents)
        } else {
            self.workspace.write(p, contents)
        };
        result.map_err(|source| ExposureError::Write {
            path: path.to_string(),
            source,
        })
    }

    async fn run_all(&self, commands: &[String]) {
        for command in commands {
            match self.runner.run(command).await {
                Ok(out) if out.success => {}
                Ok(out) => warn!("`{}` failed: {}", command, out.stderr.trim()),
                Err(e) => warn!("{}", e),
            }
        }
    }
}
