//! End-to-end runs of the orchestrator against scripted host seams
//!
//! Commands are answered by a `ScriptedRunner`; configuration and manifests
//! land in a real temporary directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tempfile::TempDir;

use stackup::cli::{format_report, Args};
use stackup::cluster::{RoleError, NODE_TOKEN_PATH};
use stackup::config::{parse_env_content, API_KEY_LENGTH, ENV_FILE};
use stackup::deploy::{DeploymentReport, Orchestrator, RunOptions, Scope};
use stackup::manifest::DEPLOYMENT_FILE;
use stackup::system::testing::{RecordingSleeper, ScriptedRunner, StaticResolver};
use stackup::system::{CommandOutput, DiskWorkspace, HostPlatform};

const READY: &str = "NAME STATUS ROLES AGE VERSION\nnode-a Ready control-plane,master 2m v1.29\n";

fn orchestrator(
    runner: Arc<ScriptedRunner>,
    dir: &Path,
    env: HashMap<String, String>,
) -> Orchestrator {
    Orchestrator::new(
        runner,
        Arc::new(DiskWorkspace::new(dir)),
        Arc::new(RecordingSleeper::new()),
        Arc::new(StaticResolver::new("198.51.100.20")),
        HostPlatform::Linux,
    )
    .with_env(env)
    .with_cwd(dir)
}

fn options(argv: &[&str]) -> RunOptions {
    let mut full = vec!["stackup"];
    full.extend_from_slice(argv);
    Args::parse_from(full).run_options().unwrap()
}

fn persisted(dir: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(dir.join(ENV_FILE)).unwrap();
    parse_env_content(&content).into_iter().collect()
}

async fn run(
    runner: Arc<ScriptedRunner>,
    dir: &Path,
    env: HashMap<String, String>,
    argv: &[&str],
) -> DeploymentReport {
    orchestrator(runner, dir, env)
        .run(&options(argv))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_standalone_rerun_keeps_generated_secret() {
    let dir = TempDir::new().unwrap();

    run(Arc::new(ScriptedRunner::new()), dir.path(), HashMap::new(), &[]).await;
    let first = persisted(dir.path());
    let key = first["AGIXT_API_KEY"].clone();
    assert_eq!(key.len(), API_KEY_LENGTH);
    assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));

    let env = HashMap::from([("AGIXT_AGENT".to_string(), "Helper".to_string())]);
    run(Arc::new(ScriptedRunner::new()), dir.path(), env, &[]).await;
    let second = persisted(dir.path());

    assert_eq!(second["AGIXT_API_KEY"], key);
    assert_eq!(second["AGIXT_AGENT"], "Helper");
}

#[tokio::test]
async fn test_unknown_environment_keys_are_not_persisted() {
    let dir = TempDir::new().unwrap();
    let env = HashMap::from([
        ("HOME".to_string(), "/root".to_string()),
        ("TZ".to_string(), "Europe/Berlin".to_string()),
    ]);

    run(Arc::new(ScriptedRunner::new()), dir.path(), env, &[]).await;
    let config = persisted(dir.path());

    assert!(!config.contains_key("HOME"));
    assert_eq!(config["TZ"], "Europe/Berlin");
    assert_eq!(config.len(), 13);
}

#[tokio::test]
async fn test_master_then_worker() {
    let master_dir = TempDir::new().unwrap();
    let master_runner = Arc::new(
        ScriptedRunner::new()
            .on("id -u", CommandOutput::ok("0"))
            .on(NODE_TOKEN_PATH, CommandOutput::ok("K10abc::server:def\n"))
            .on_sequence(
                "get node",
                vec![
                    CommandOutput::failed(1, "The connection to the server was refused"),
                    CommandOutput::ok(READY),
                ],
            )
            .on_sequence(
                "get service",
                vec![CommandOutput::ok(""), CommandOutput::ok("192.0.2.10")],
            ),
    );

    let report = run(
        master_runner.clone(),
        master_dir.path(),
        HashMap::new(),
        &["--use-kubernetes", "--master"],
    )
    .await;

    let join = report.join.clone().unwrap();
    assert_eq!(join.url, "https://198.51.100.20:6443");
    assert_eq!(join.token, "K10abc::server:def");
    assert!(master_dir.path().join("load-balancer.yaml").exists());
    assert!(master_dir.path().join(DEPLOYMENT_FILE).exists());
    assert_eq!(report.endpoints_with(Scope::Global).count(), 3);

    let printed = format_report(&report);
    assert!(printed.contains("Node Token: K10abc::server:def"));

    let worker_dir = TempDir::new().unwrap();
    let worker_runner = Arc::new(
        ScriptedRunner::new()
            .on("id -u", CommandOutput::ok("0"))
            .on("get node", CommandOutput::ok(READY))
            .on("get service", CommandOutput::ok("192.0.2.11")),
    );

    let report = run(
        worker_runner.clone(),
        worker_dir.path(),
        HashMap::new(),
        &[
            "--use-kubernetes",
            "--master-url",
            join.url.as_str(),
            "--node-token",
            join.token.as_str(),
        ],
    )
    .await;

    assert!(report.join.is_none());
    assert!(worker_runner.ran(
        "K3S_URL=https://198.51.100.20:6443 K3S_TOKEN=K10abc::server:def sh -"
    ));
    assert!(!worker_runner.ran(NODE_TOKEN_PATH));
    assert!(!worker_dir.path().join("load-balancer.yaml").exists());
}

#[test]
fn test_worker_flags_without_token_fail_before_any_action() {
    let args = Args::parse_from(["stackup", "--use-kubernetes", "--master-url", "https://x:6443"]);
    assert!(matches!(
        args.run_options(),
        Err(RoleError::MissingJoinCredentials(_))
    ));
}
