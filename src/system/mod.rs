//! Host seams
//!
//! Everything the orchestration core needs from the outside world goes
//! through the types in this module: shell commands, file writes, sleeping,
//! and public-address discovery. Production code wires the real
//! implementations; tests wire the doubles in [`testing`].

pub mod exec;
pub mod fs;
pub mod platform;
pub mod poll;
pub mod privilege;
pub mod public_ip;
pub mod testing;

pub use exec::{run_checked, CommandOutput, CommandRunner, ExecError, ShellRunner};
pub use fs::{DiskWorkspace, Workspace};
pub use platform::HostPlatform;
pub use poll::{PollPolicy, Sleeper, TokioSleeper, DEFAULT_POLL_INTERVAL};
pub use privilege::{is_elevated, reexec_elevated};
pub use public_ip::{AddressResolver, PublicIpResolver, LOOPBACK_HOST, PUBLIC_IP_URL};
