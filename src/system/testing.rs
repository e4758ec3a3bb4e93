//! In-memory doubles for the host seams
//!
//! Used by unit tests and by the integration tests under `tests/` to drive
//! the orchestration core without a shell, a filesystem, or real delays.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::exec::{CommandOutput, CommandRunner, ExecError};
use super::fs::Workspace;
use super::poll::Sleeper;
use super::public_ip::AddressResolver;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Script {
    pattern: String,
    responses: Vec<Result<CommandOutput, String>>,
}

/// Command runner that answers from a script and records every call.
///
/// A command matches the first rule whose pattern it contains. Each rule
/// replays its responses in order and then repeats the last one. Commands
/// with no matching rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<Vec<Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer commands containing `pattern` with `output`
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.on_sequence(pattern, vec![output])
    }

    /// Answer successive matching commands with `outputs` in order
    pub fn on_sequence(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        lock(&self.scripts).push(Script {
            pattern: pattern.to_string(),
            responses: outputs.into_iter().map(Ok).collect(),
        });
        self
    }

    /// Make commands containing `pattern` fail to spawn
    pub fn unavailable(self, pattern: &str) -> Self {
        lock(&self.scripts).push(Script {
            pattern: pattern.to_string(),
            responses: vec![Err(format!("{pattern}: command not found"))],
        });
        self
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of commands run that contain `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    /// Index of the first call containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        lock(&self.calls).push(command.to_string());

        let mut scripts = lock(&self.scripts);
        let Some(script) = scripts.iter_mut().find(|s| command.contains(&s.pattern)) else {
            return Ok(CommandOutput::ok(""));
        };

        let response = if script.responses.len() > 1 {
            script.responses.remove(0)
        } else {
            script
                .responses
                .first()
                .cloned()
                .unwrap_or_else(|| Ok(CommandOutput::ok("")))
        };

        response.map_err(|message| ExecError::Spawn {
            command: command.to_string(),
            message,
        })
    }
}

/// Workspace held entirely in memory
#[derive(Default)]
pub struct MemoryWorkspace {
    files: Mutex<HashMap<PathBuf, String>>,
    dirs: Mutex<Vec<PathBuf>>,
    read_only: Mutex<bool>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file
    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        lock(&self.files).insert(path.into(), contents.to_string());
        self
    }

    /// Seed a directory so `exists` reports it
    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        lock(&self.dirs).push(path.into());
        self
    }

    /// Make every write and append fail with `PermissionDenied`
    pub fn set_read_only(&self, read_only: bool) {
        *lock(&self.read_only) = read_only;
    }

    /// Current contents of a file
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.files).get(path.as_ref()).cloned()
    }

    fn check_writable(&self) -> io::Result<()> {
        if *lock(&self.read_only) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only workspace"))
        } else {
            Ok(())
        }
    }
}

impl Workspace for MemoryWorkspace {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(lock(&self.files).get(path).cloned())
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check_writable()?;
        lock(&self.files).insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check_writable()?;
        lock(&self.files)
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        lock(&self.files).keys().any(|f| f.starts_with(path))
            || lock(&self.dirs).iter().any(|d| d.starts_with(path))
    }

    fn locate(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Sleeper that returns immediately and records requested delays
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}

/// Resolver that always answers with a fixed address
#[derive(Debug, Clone)]
pub struct StaticResolver(pub String);

impl StaticResolver {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn public_address(&self) -> String {
        self.0.clone()
    }
}
