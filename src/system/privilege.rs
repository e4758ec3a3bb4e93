//! Elevated-privilege detection and re-execution
//!
//! Steps that touch the firewall, the init system, or the cluster installer
//! need root/Administrator. When the process is not elevated the caller
//! re-runs the whole command line elevated instead of continuing.

use std::convert::Infallible;
use std::io;
use std::path::Path;

use tracing::debug;

use super::exec::CommandRunner;
use super::platform::HostPlatform;

/// Whether the current process runs with elevated privilege.
///
/// Fails closed: any probing error reports "not elevated".
pub async fn is_elevated(runner: &dyn CommandRunner, platform: HostPlatform) -> bool {
    match platform {
        HostPlatform::Linux | HostPlatform::MacOs => unix_uid_is_root(runner).await,
        // `net session` only succeeds from an Administrator shell
        HostPlatform::Windows => runner
            .run("net session")
            .await
            .map(|out| out.success)
            .unwrap_or(false),
        HostPlatform::Unsupported => cfg!(unix) && unix_uid_is_root(runner).await,
    }
}

async fn unix_uid_is_root(runner: &dyn CommandRunner) -> bool {
    match runner.run("id -u").await {
        Ok(out) if out.success => out.text() == "0",
        Ok(_) => false,
        Err(e) => {
            debug!("Privilege probe failed: {}", e);
            false
        }
    }
}

/// Replace the current process with an elevated copy of itself.
///
/// On unix this `exec`s `sudo -E <exe> <args...>` and only returns on
/// failure. On Windows it launches an elevated copy through `runas` and
/// exits with that copy's status.
pub fn reexec_elevated() -> io::Result<Infallible> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    elevate(&exe, &args)
}

#[cfg(unix)]
fn elevate(exe: &Path, args: &[String]) -> io::Result<Infallible> {
    use std::os::unix::process::CommandExt;

    let err = std::process::Command::new("sudo")
        .arg("-E")
        .arg(exe)
        .args(args)
        .exec();
    Err(err)
}

#[cfg(windows)]
fn elevate(exe: &Path, args: &[String]) -> io::Result<Infallible> {
    let arg_list = args
        .iter()
        .map(|a| format!("'{}'", a.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",");
    let mut script = format!(
        "$p = Start-Process -FilePath '{}' -Verb RunAs -Wait -PassThru",
        exe.display()
    );
    if !arg_list.is_empty() {
        script.push_str(&format!(" -ArgumentList {}", arg_list));
    }
    script.push_str("; exit $p.ExitCode");

    let status = std::process::Command::new("powershell")
        .args(["-NoProfile", "-Command", &script])
        .status()?;
    std::process::exit(status.code().unwrap_or(1));
}

#[cfg(not(any(unix, windows)))]
fn elevate(_exe: &Path, _args: &[String]) -> io::Result<Infallible> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "privilege elevation is not supported on this platform",
    ))
}
