use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoleError {
    #[error("Master URL and node token are required for worker setup (missing {0})")]
    MissingJoinCredentials(&'static str),
}

/// What a worker needs to attach to a master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredentials {
    pub url: String,
    pub token: String,
}

/// This node's part in the deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRole {
    Standalone,
    Master,
    Worker(JoinCredentials),
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ClusterRole {
    /// Worker role; both credentials must be present and non-empty
    pub fn worker(url: Option<&str>, token: Option<&str>) -> Result<Self, RoleError> {
        match (present(url), present(token)) {
            (Some(url), Some(token)) => Ok(ClusterRole::Worker(JoinCredentials {
                url: url.to_string(),
                token: token.to_string(),
            })),
            (None, Some(_)) => Err(RoleError::MissingJoinCredentials("master URL")),
            (Some(_), None) => Err(RoleError::MissingJoinCredentials("node token")),
            (None, None) => Err(RoleError::MissingJoinCredentials("master URL and node token")),
        }
    }

    /// Decide the role from invocation flags
    pub fn from_flags(
        use_cluster: bool,
        master: bool,
        url: Option<&str>,
        token: Option<&str>,
    ) -> Result<Self, RoleError> {
        match (use_cluster, master) {
            (false, _) => Ok(ClusterRole::Standalone),
            (true, true) => Ok(ClusterRole::Master),
            (true, false) => Self::worker(url, token),
        }
    }

    pub fn is_cluster(&self) -> bool {
        !matches!(self, ClusterRole::Standalone)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClusterRole::Standalone => "standalone",
            ClusterRole::Master => "master",
            ClusterRole::Worker(_) => "worker",
        }
    }
}
