use std::process;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stackup::cli::{format_report, Args};
use stackup::deploy::{DeployError, Orchestrator};
use stackup::system::{
    reexec_elevated, DiskWorkspace, HostPlatform, PublicIpResolver, ShellRunner, TokioSleeper,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let opts = match args.run_options() {
        Ok(opts) => opts,
        Err(e) => Args::command()
            .error(ErrorKind::MissingRequiredArgument, e.to_string())
            .exit(),
    };

    let workspace = match DiskWorkspace::current_dir() {
        Ok(ws) => ws,
        Err(e) => {
            error!("Cannot determine the working directory: {}", e);
            process::exit(1);
        }
    };
    let cwd = workspace.root().to_path_buf();
    let platform = HostPlatform::current();
    info!("Running on {}", platform);

    let orchestrator = Orchestrator::new(
        Arc::new(ShellRunner::new()),
        Arc::new(workspace),
        Arc::new(TokioSleeper),
        Arc::new(PublicIpResolver::new()),
        platform,
    )
    .with_env(std::env::vars().collect())
    .with_cwd(cwd)
    .with_native_gpu(cfg!(feature = "gpu"));

    let result = tokio::select! {
        result = orchestrator.run(&opts) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            process::exit(130);
        }
    };

    match result {
        Ok(report) => {
            print!("{}", format_report(&report));
            println!("Environment setup complete.");
        }
        Err(DeployError::ElevationRequired) => {
            warn!("Elevated permissions required. Requesting admin privileges...");
            if let Err(e) = reexec_elevated() {
                error!("Failed to restart with elevated permissions: {}", e);
            }
            process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
