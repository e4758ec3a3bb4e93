//! Cluster add-ons applied around the workload: ingress load balancer and
//! the NVIDIA device plugin

use std::path::Path;

use tracing::{info, warn};

use super::KUBECTL;
use crate::system::{CommandRunner, Workspace};

/// File the load-balancer manifest is written to before applying
pub const LOAD_BALANCER_FILE: &str = "load-balancer.yaml";

/// Upstream device plugin manifest that advertises `nvidia.com/gpu`
pub const DEVICE_PLUGIN_URL: &str =
    "https://raw.githubusercontent.com/NVIDIA/k8s-device-plugin/v0.9.0/nvidia-device-plugin.yml";

pub const LOAD_BALANCER_MANIFEST: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: nginx-configuration
  namespace: ingress-nginx
data:
  proxy-body-size: "0"
  proxy-read-timeout: "600"
  proxy-send-timeout: "600"
---
apiVersion: v1
kind: Service
metadata:
  name: ingress-nginx
  namespace: ingress-nginx
spec:
  type: LoadBalancer
  ports:
    - name: http
      port: 80
      targetPort: 80
    - name: https
      port: 443
      targetPort: 443
  selector:
    app.kubernetes.io/name: ingress-nginx
    app.kubernetes.io/part-of: ingress-nginx
"#;

/// Write `contents` to `file` in the workspace and `kubectl apply` it.
///
/// Returns whether the apply succeeded; failures are logged.
pub async fn apply_file(
    runner: &dyn CommandRunner,
    workspace: &dyn Workspace,
    file: &str,
    contents: &str,
) -> std::io::Result<bool> {
    let path = Path::new(file);
    workspace.write(path, contents)?;

    let command = format!("{} apply -f {}", KUBECTL, workspace.locate(path).display());
    Ok(match runner.run(&command).await {
        Ok(out) if out.success => {
            info!("Applied {}", file);
            true
        }
        Ok(out) => {
            warn!("Applying {} failed: {}", file, out.stderr.trim());
            false
        }
        Err(e) => {
            warn!("Applying {} failed: {}", file, e);
            false
        }
    })
}

/// Install the ingress load balancer on a fresh master
pub async fn apply_load_balancer(
    runner: &dyn CommandRunner,
    workspace: &dyn Workspace,
) -> std::io::Result<bool> {
    apply_file(runner, workspace, LOAD_BALANCER_FILE, LOAD_BALANCER_MANIFEST).await
}

/// Install the NVIDIA device plugin so pods can claim GPUs
pub async fn apply_device_plugin(runner: &dyn CommandRunner) -> bool {
    info!("Setting up NVIDIA device plugin for Kubernetes...");
    match runner
        .run(&format!("{} create -f {}", KUBECTL, DEVICE_PLUGIN_URL))
        .await
    {
        Ok(out) if out.success => true,
        // A re-run after elevation finds the plugin already present
        Ok(out) if out.stderr.contains("AlreadyExists") => true,
        Ok(out) => {
            warn!("NVIDIA device plugin setup failed: {}", out.stderr.trim());
            false
        }
        Err(e) => {
            warn!("NVIDIA device plugin setup failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::{MemoryWorkspace, ScriptedRunner};
    use crate::system::CommandOutput;

    #[test]
    fn test_load_balancer_manifest_is_valid_yaml() {
        let docs: Vec<serde_yaml::Value> = LOAD_BALANCER_MANIFEST
            .split("---\n")
            .map(|d| serde_yaml::from_str(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["data"]["proxy-read-timeout"], "600");
        assert_eq!(docs[1]["spec"]["type"], "LoadBalancer");
        assert_eq!(docs[1]["spec"]["ports"][1]["port"], 443);
    }

    #[tokio::test]
    async fn test_apply_load_balancer_writes_then_applies() {
        let runner = ScriptedRunner::new();
        let ws = MemoryWorkspace::new();

        assert!(apply_load_balancer(&runner, &ws).await.unwrap());
        assert_eq!(ws.contents(LOAD_BALANCER_FILE).as_deref(), Some(LOAD_BALANCER_MANIFEST));
        assert_eq!(runner.calls(), vec!["k3s kubectl apply -f load-balancer.yaml"]);
    }

    #[tokio::test]
    async fn test_apply_failure_reported() {
        let runner = ScriptedRunner::new().on("apply", CommandOutput::failed(1, "unreachable"));
        let ws = MemoryWorkspace::new();
        assert!(!apply_file(&runner, &ws, "x.yaml", "kind: x\n").await.unwrap());
    }

    #[tokio::test]
    async fn test_device_plugin_already_present_counts_as_success() {
        let runner = ScriptedRunner::new().on(
            "nvidia-device-plugin",
            CommandOutput::failed(1, "Error from server (AlreadyExists): daemonsets.apps exists"),
        );
        assert!(apply_device_plugin(&runner).await);
    }
}
