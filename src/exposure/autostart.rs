//! Registering the k3s server with the host init system so the cluster
//! comes back after a reboot

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::ExposureError;
use crate::system::{is_elevated, CommandRunner, HostPlatform, Workspace};

/// Name the service is registered under
pub const AUTOSTART_SERVICE: &str = "stackup-k3s";

pub const SYSTEMD_UNIT_FILE: &str = "/etc/systemd/system/stackup-k3s.service";
pub const LAUNCHD_PLIST_FILE: &str = "/Library/LaunchDaemons/com.stackup.k3s.plist";

const SYSTEMD_UNIT: &str = "[Unit]
Description=Stackup Kubernetes Cluster
After=network.target

[Service]
ExecStart=/usr/local/bin/k3s server
Restart=always

[Install]
WantedBy=multi-user.target
";

const LAUNCHD_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.stackup.k3s</string>
    <key>ProgramArguments</key>
    <array>
        <string>/usr/local/bin/k3s</string>
        <string>server</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>
"#;

pub struct AutoStart {
    runner: Arc<dyn CommandRunner>,
    workspace: Arc<dyn Workspace>,
    platform: HostPlatform,
}

impl AutoStart {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workspace: Arc<dyn Workspace>,
        platform: HostPlatform,
    ) -> Self {
        Self {
            runner,
            workspace,
            platform,
        }
    }

    /// Register and start the service. Returns false on an unsupported platform.
    pub async fn register(&self) -> Result<bool, ExposureError> {
        if self.platform == HostPlatform::Unsupported {
            warn!("Unsupported operating system: {}", self.platform);
            return Ok(false);
        }
        if !is_elevated(self.runner.as_ref(), self.platform).await {
            return Err(ExposureError::ElevationRequired);
        }

        let commands = match self.platform {
            HostPlatform::Linux => {
                self.write(SYSTEMD_UNIT_FILE, SYSTEMD_UNIT)?;
                vec![
                    format!("systemctl enable {}.service", AUTOSTART_SERVICE),
                    format!("systemctl start {}.service", AUTOSTART_SERVICE),
                ]
            }
            HostPlatform::MacOs => {
                self.write(LAUNCHD_PLIST_FILE, LAUNCHD_PLIST)?;
                vec![format!("launchctl load {}", LAUNCHD_PLIST_FILE)]
            }
            HostPlatform::Windows => vec![
                r#"sc create StackupK3s binpath= "C:\Program Files\k3s\k3s.exe server" start= auto"#
                    .to_string(),
                "sc start StackupK3s".to_string(),
            ],
            HostPlatform::Unsupported => return Ok(false),
        };

        for command in &commands {
            match self.runner.run(command).await {
                Ok(out) if out.success => {}
                Ok(out) => warn!("`{}` failed: {}", command, out.stderr.trim()),
                Err(e) => warn!("{}", e),
            }
        }

        info!("Registered {} to start on boot", AUTOSTART_SERVICE);
        Ok(true)
    }

    fn write(&self, path: &str, contents: &str) -> Result<(), ExposureError> {
        self.workspace
            .write(Path::new(path), contents)
            .map_err(|source| ExposureError::Write {
                path: path.to_string(),
                source,
            })
    }
}
