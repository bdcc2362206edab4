//! Locating and launching the daemon executable.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use camino::Utf8Path;
use onion_config::DEFAULT_TOR_BINARY;

use super::ProvisionError;

/// A launched daemon whose exit can be observed without blocking.
pub(crate) trait DaemonProcess: Send {
    /// Returns the exit status once the process has finished.
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Operating system process identifier, when known.
    fn id(&self) -> Option<u32>;
}

impl DaemonProcess for Child {
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        self.try_wait()
    }

    fn id(&self) -> Option<u32> {
        Some(Child::id(self))
    }
}

/// Starts the daemon with a configuration file.
pub(crate) trait DaemonLauncher {
    fn launch(&self, binary: &str, torrc: &Utf8Path)
    -> Result<Box<dyn DaemonProcess>, ProvisionError>;
}

/// Launches the real executable as `<binary> -f <torrc>`.
///
/// The daemon is left running when `onionctl` exits.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemLauncher;

impl DaemonLauncher for SystemLauncher {
    fn launch(
        &self,
        binary: &str,
        torrc: &Utf8Path,
    ) -> Result<Box<dyn DaemonProcess>, ProvisionError> {
        let executable = resolve_binary(binary)?;
        let child = Command::new(&executable)
            .arg("-f")
            .arg(torrc.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ProvisionError::Launch {
                binary: OsString::from(executable.as_os_str()),
                source,
            })?;
        Ok(Box::new(child))
    }
}

/// Install locations searched for bare names missing from `PATH`.
const FALLBACK_DIRS: &[&str] = &[
    "/opt/homebrew/bin",
    "/usr/local/bin",
    "/usr/bin",
    "/usr/sbin",
    "/snap/bin",
];

/// Resolves `binary` to an executable path.
///
/// Names containing a path separator are checked as given. Bare names are
/// searched for on `PATH`, then in common install locations. A blank name
/// stands for the default executable.
pub(crate) fn resolve_binary(binary: &str) -> Result<PathBuf, ProvisionError> {
    let fallback: Vec<&Path> = FALLBACK_DIRS.iter().map(Path::new).collect();
    resolve_binary_in(binary, env::var_os("PATH"), &fallback)
}

fn resolve_binary_in(
    binary: &str,
    search_path: Option<OsString>,
    fallback_dirs: &[&Path],
) -> Result<PathBuf, ProvisionError> {
    let name = match binary.trim() {
        "" => DEFAULT_TOR_BINARY,
        _ => binary,
    };
    let not_found = || ProvisionError::BinaryNotFound {
        binary: name.to_owned(),
    };
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate)
            .then(|| candidate.to_path_buf())
            .ok_or_else(not_found);
    }
    search_path
        .iter()
        .flat_map(env::split_paths)
        .chain(fallback_dirs.iter().map(|dir| dir.to_path_buf()))
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
        .ok_or_else(not_found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
