//! Compose command lines for the standalone stack and the sidecar

/// Branch whose images are published under the plain compose file
pub const STABLE_BRANCH: &str = "stable";

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEV_COMPOSE_FILE: &str = "docker-compose-dev.yml";
pub const CUDA_COMPOSE_FILE: &str = "docker-compose-cuda.yml";

/// Compose file for the configured branch
pub fn compose_file(branch: &str) -> &'static str {
    if branch == STABLE_BRANCH {
        COMPOSE_FILE
    } else {
        DEV_COMPOSE_FILE
    }
}

/// Stop, optionally pull, then start the stack described by `file`
pub fn stack_update_command(file: &str, auto_update: bool) -> String {
    let mut steps = vec![format!("docker-compose -f {} stop", file)];
    if auto_update {
        steps.push(format!("docker-compose -f {} pull", file));
    }
    steps.push(format!("docker-compose -f {} up -d", file));
    steps.join(" && ")
}

/// Rebuild and restart the sidecar from its checkout in `dir`
pub fn sidecar_command(dir: &str, cuda: bool) -> String {
    let compose = if cuda {
        format!("docker-compose -f {}", CUDA_COMPOSE_FILE)
    } else {
        "docker-compose".to_string()
    };
    format!(
        "cd {dir} && {compose} stop && {compose} build && {compose} up -d",
        dir = dir,
        compose = compose
    )
}
