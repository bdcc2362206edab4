//! Bounded waits for the daemon's cookie file and control port.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::Dir;

use super::{DaemonProcess, ProvisionError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Reports whether something accepts TCP connections at `host:port`.
pub(crate) fn port_is_open(host: &str, port: u16) -> Result<bool, ProvisionError> {
    let probe = || -> io::Result<()> {
        let address = resolve_tcp(host, port)?;
        TcpStream::connect_timeout(&address, PROBE_TIMEOUT).map(|_| ())
    };
    match probe() {
        Ok(()) => Ok(true),
        Err(error) if is_socket_available(&error) => Ok(false),
        Err(source) => Err(ProvisionError::ProbeControlPort {
            endpoint: format!("{host}:{port}"),
            source,
        }),
    }
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

/// Errors that mean nothing is listening yet.
fn is_socket_available(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::TimedOut
    )
}

/// Deadline-bounded polling shared by the waits below.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Waiter {
    pub(crate) timeout: Duration,
    pub(crate) poll_interval: Duration,
}

impl Waiter {
    /// Polls `ready` until it reports true, the daemon exits, or the deadline
    /// passes. `ready` is always consulted at least once.
    fn run<F>(
        self,
        daemon: &mut Option<Box<dyn DaemonProcess>>,
        mut ready: F,
    ) -> Result<bool, ProvisionError>
    where
        F: FnMut() -> Result<bool, ProvisionError>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            if ready()? {
                return Ok(true);
            }
            if let Some(process) = daemon.as_mut()
                && let Some(status) = process
                    .poll_exit()
                    .map_err(|source| ProvisionError::MonitorChild { source })?
            {
                return Err(ProvisionError::DaemonExited {
                    exit_status: status.code(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            thread::sleep(self.poll_interval.min(remaining));
        }
    }
}

/// Waits until the cookie file exists and is non-empty.
pub(crate) fn wait_for_cookie(
    cookie_path: &Utf8Path,
    daemon: &mut Option<Box<dyn DaemonProcess>>,
    waiter: Waiter,
) -> Result<(), ProvisionError> {
    let ready = waiter.run(daemon, || cookie_present(cookie_path))?;
    if ready {
        Ok(())
    } else {
        Err(ProvisionError::CookieTimeout {
            path: cookie_path.to_path_buf(),
            timeout_ms: waiter.timeout.as_millis(),
        })
    }
}

/// Waits until the control port accepts TCP connections.
pub(crate) fn wait_for_control_port(
    host: &str,
    port: u16,
    daemon: &mut Option<Box<dyn DaemonProcess>>,
    waiter: Waiter,
) -> Result<(), ProvisionError> {
    let ready = waiter.run(daemon, || port_is_open(host, port))?;
    if ready {
        Ok(())
    } else {
        Err(ProvisionError::ControlPortTimeout {
            endpoint: format!("{host}:{port}"),
            timeout_ms: waiter.timeout.as_millis(),
        })
    }
}

fn cookie_present(cookie_path: &Utf8Path) -> Result<bool, ProvisionError> {
    let read_error = |source| ProvisionError::ReadCookie {
        path: cookie_path.to_path_buf(),
        source,
    };
    let (Some(parent), Some(name)) = (cookie_path.parent(), cookie_path.file_name()) else {
        return Ok(false);
    };
    let parent = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    let dir = match Dir::open_ambient_dir(parent.as_std_path(), ambient_authority()) {
        Ok(dir) => dir,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(read_error(error)),
    };
    match dir.metadata(name) {
        Ok(metadata) => Ok(metadata.is_file() && metadata.len() > 0),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(read_error(error)),
    }
}
