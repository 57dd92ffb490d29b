//! Host-level checks: `ping` and `assert`.

use crate::service::{ServiceError, ServiceResult};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reply to `ping` when no message is given.
pub const DEFAULT_PONG: &str = "pong";

/// Echo `message`, or `"pong"`.
pub fn ping(message: Option<String>) -> String {
    message.unwrap_or_else(|| DEFAULT_PONG.to_string())
}

/// Commands that must be installed on the host for the adapter to work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRequirements {
    commands: Vec<String>,
}

impl HostRequirements {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Fails with the first command not found on `PATH`.
    pub fn check(&self) -> ServiceResult<()> {
        let path = env::var_os("PATH").unwrap_or_default();
        self.check_in(env::split_paths(&path))
    }

    /// Like `check`, searching `dirs` instead of `PATH`.
    pub fn check_in<I>(&self, dirs: I) -> ServiceResult<()>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let dirs: Vec<PathBuf> = dirs.into_iter().collect();
        for command in &self.commands {
            match find_command(command, &dirs) {
                Some(found) => debug!(command = %command, path = %found.display(), "found required command"),
                None => return Err(ServiceError::MissingCommand(command.clone())),
            }
        }
        Ok(())
    }
}

fn find_command(command: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(command);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }
    dirs.iter()
        .flat_map(|dir| candidates(dir, command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    let exts = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    std::iter::once(dir.join(command))
        .chain(
            exts.split(';')
                .filter(|ext| !ext.is_empty())
                .map(|ext| dir.join(format!("{command}{ext}"))),
        )
        .collect()
}

#[cfg(not(windows))]
fn candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    vec![dir.join(command)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
