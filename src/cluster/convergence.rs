//! Waiting for LoadBalancer services to get an external address

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::KUBECTL;
use crate::manifest::exposure_name;
use crate::system::{CommandRunner, PollPolicy, Sleeper};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvergenceError {
    #[error("Service '{service}' never received an external address after {attempts} attempts")]
    NotConverged { service: String, attempts: u32 },
}

/// `kubectl` query printing a service's first ingress IP
pub fn address_query(service: &str) -> String {
    format!(
        "{} get service {} --output=jsonpath=\"{{.status.loadBalancer.ingress[0].ip}}\"",
        KUBECTL,
        exposure_name(service)
    )
}

/// Extract the address from jsonpath output, which may come back quoted
pub fn parse_address(output: &str) -> Option<String> {
    let addr = output.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    (!addr.is_empty()).then(|| addr.to_string())
}

pub struct ConvergencePoller {
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    policy: PollPolicy,
}

impl ConvergencePoller {
    pub fn new(runner: Arc<dyn CommandRunner>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            runner,
            sleeper,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Block until `service` has an external address and return it
    pub async fn await_external_address(&self, service: &str) -> Result<String, ConvergenceError> {
        let command = address_query(service);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.runner.run(&command).await {
                Ok(out) if out.success => {
                    if let Some(addr) = parse_address(&out.stdout) {
                        info!("Service '{}' reachable at {}", service, addr);
                        return Ok(addr);
                    }
                    debug!("Service '{}' has no external address yet", service);
                }
                Ok(out) => debug!("Address query for '{}' failed: {}", service, out.stderr.trim()),
                Err(e) => warn!("Address query for '{}' could not run: {}", service, e),
            }

            if self.policy.exhausted(attempt) {
                return Err(ConvergenceError::NotConverged {
                    service: service.to_string(),
                    attempts: attempt,
                });
            }
            self.sleeper.sleep(self.policy.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::{RecordingSleeper, ScriptedRunner};
    use crate::system::CommandOutput;
    use std::time::Duration;

    #[test]
    fn test_address_query_uses_exposure_name() {
        let query = address_query("ezlocalai_api");
        assert!(query.starts_with("k3s kubectl get service ezlocalai-api-service "));
        assert!(query.contains("{.status.loadBalancer.ingress[0].ip}"));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("10.1.2.3\n"), Some("10.1.2.3".to_string()));
        assert_eq!(parse_address("\"10.1.2.3\""), Some("10.1.2.3".to_string()));
        assert_eq!(parse_address("\"\""), None);
        assert_eq!(parse_address("   "), None);
    }

    #[tokio::test]
    async fn test_waits_until_address_assigned() {
        let runner = Arc::new(ScriptedRunner::new().on_sequence(
            "api-service",
            vec![
                CommandOutput::ok(""),
                CommandOutput::ok("\"\""),
                CommandOutput::ok("192.168.1.240"),
            ],
        ));
        let sleeper = Arc::new(RecordingSleeper::new());

        let addr = ConvergencePoller::new(runner.clone(), sleeper.clone())
            .await_external_address("api")
            .await
            .unwrap();

        assert_eq!(addr, "192.168.1.240");
        assert_eq!(runner.count("api-service"), 3);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_ceiling_reports_not_converged() {
        let runner = Arc::new(ScriptedRunner::new().on("gui-service", CommandOutput::ok("")));
        let sleeper = Arc::new(RecordingSleeper::new());

        let result = ConvergencePoller::new(runner, sleeper)
            .with_policy(PollPolicy::unbounded().with_max_attempts(2))
            .await_external_address("gui")
            .await;

        assert_eq!(
            result,
            Err(ConvergenceError::NotConverged {
                service: "gui".to_string(),
                attempts: 2,
            })
        );
    }
}
