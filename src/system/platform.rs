use std::fmt;

/// Host operating system families with platform-specific behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
    Unsupported,
}

impl HostPlatform {
    /// Platform of the running process
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name to a platform
    pub fn from_os(os: &str) -> Self {
        match os.to_lowercase().as_str() {
            "linux" => HostPlatform::Linux,
            "macos" | "darwin" => HostPlatform::MacOs,
            "windows" => HostPlatform::Windows,
            _ => HostPlatform::Unsupported,
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, HostPlatform::Linux | HostPlatform::MacOs)
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostPlatform::Linux => "linux",
            HostPlatform::MacOs => "macos",
            HostPlatform::Windows => "windows",
            HostPlatform::Unsupported => std::env::consts::OS,
        };
        f.write_str(name)
    }
}
