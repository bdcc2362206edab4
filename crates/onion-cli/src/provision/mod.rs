//! Preparing and starting the control daemon.
//!
//! The provisioner makes a local daemon usable by the control client: it
//! creates the data directory, makes sure the daemon configuration enables
//! the control port with cookie authentication, starts the daemon when the
//! control port is closed, and waits for the cookie and the control port.

mod binary;
mod error;
mod probe;
mod torrc;

use std::fmt;
use std::fs::DirBuilder;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use onion_config::Config;
use tracing::{debug, info};

pub(crate) use binary::{DaemonLauncher, DaemonProcess, SystemLauncher};
pub use error::ProvisionError;
pub(crate) use probe::Waiter;
pub use torrc::TorrcUpdate;

use torrc::{Directive, ensure_torrc};

const PROVISION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provision");
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const TORRC_FILE: &str = "torrc";

/// Resolved paths and limits for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProvisionPlan {
    pub(crate) tor_binary: String,
    pub(crate) torrc_path: Utf8PathBuf,
    pub(crate) data_dir: Utf8PathBuf,
    pub(crate) cookie_path: Utf8PathBuf,
    pub(crate) log_file: Option<Utf8PathBuf>,
    pub(crate) control_host: String,
    pub(crate) control_port: u16,
    pub(crate) cookie_timeout: Duration,
    pub(crate) control_timeout: Duration,
}

impl ProvisionPlan {
    /// Derives the plan from configuration.
    ///
    /// The data directory defaults to the cookie's directory and the
    /// configuration file defaults to `torrc` inside the data directory.
    pub(crate) fn from_config(config: &Config) -> Result<Self, ProvisionError> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => config
                .cookie_path
                .parent()
                .filter(|parent| !parent.as_str().is_empty())
                .map(Utf8Path::to_path_buf)
                .ok_or_else(|| ProvisionError::MissingDataDir {
                    path: config.cookie_path.clone(),
                })?,
        };
        let torrc_path = config
            .torrc_path
            .clone()
            .unwrap_or_else(|| data_dir.join(TORRC_FILE));
        Ok(Self {
            tor_binary: config.tor_binary.clone(),
            torrc_path,
            data_dir,
            cookie_path: config.cookie_path.clone(),
            log_file: config.tor_log_file.clone(),
            control_host: config.control_host.clone(),
            control_port: config.control_port,
            cookie_timeout: config.cookie_timeout(),
            control_timeout: config.control_timeout(),
        })
    }

    fn directives(&self) -> Vec<Directive> {
        let mut directives = vec![
            Directive::new("ControlPort", self.control_port.to_string()),
            Directive::new("CookieAuthentication", "1"),
            Directive::new("CookieAuthFile", self.cookie_path.as_str()),
            Directive::new("CookieAuthFileGroupReadable", "1"),
            Directive::new("DataDirectory", self.data_dir.as_str()),
        ];
        if let Some(log_file) = &self.log_file {
            directives.push(Directive::new("Log", format!("notices file {log_file}")));
        }
        directives
    }
}

/// What a provisioning run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Configuration file that was checked.
    pub torrc_path: Utf8PathBuf,
    /// Change made to the configuration file.
    pub torrc: TorrcUpdate,
    /// Whether a daemon was started.
    pub launched: bool,
    /// Process identifier of the started daemon.
    pub pid: Option<u32>,
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "torrc {}: {}; ", self.torrc_path, self.torrc)?;
        match (self.launched, self.pid) {
            (true, Some(pid)) => write!(formatter, "daemon started (pid {pid})"),
            (true, None) => formatter.write_str("daemon started"),
            (false, _) => formatter.write_str("daemon already running"),
        }
    }
}

/// Runs the provisioning steps in order.
pub(crate) struct Provisioner {
    plan: ProvisionPlan,
    launcher: Box<dyn DaemonLauncher>,
    poll_interval: Duration,
}

impl Provisioner {
    pub(crate) fn new(plan: ProvisionPlan) -> Self {
        Self::with_launcher(plan, Box::new(SystemLauncher))
    }

    pub(crate) fn with_launcher(plan: ProvisionPlan, launcher: Box<dyn DaemonLauncher>) -> Self {
        Self {
            plan,
            launcher,
            poll_interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub(crate) fn run(&self) -> Result<ProvisionReport, ProvisionError> {
        let plan = &self.plan;
        ensure_data_dir(&plan.data_dir)?;
        let torrc = ensure_torrc(&plan.torrc_path, &plan.directives())?;
        debug!(target: PROVISION_TARGET, path = %plan.torrc_path, %torrc, "daemon configuration checked");

        let mut daemon = if probe::port_is_open(&plan.control_host, plan.control_port)? {
            debug!(target: PROVISION_TARGET, port = plan.control_port, "control port already open");
            None
        } else {
            let process = self.launcher.launch(&plan.tor_binary, &plan.torrc_path)?;
            info!(
                target: PROVISION_TARGET,
                binary = %plan.tor_binary,
                pid = ?process.id(),
                "daemon started"
            );
            Some(process)
        };
        let pid = daemon.as_ref().and_then(|process| process.id());
        let launched = daemon.is_some();

        probe::wait_for_cookie(
            &plan.cookie_path,
            &mut daemon,
            Waiter {
                timeout: plan.cookie_timeout,
                poll_interval: self.poll_interval,
            },
        )?;
        probe::wait_for_control_port(
            &plan.control_host,
            plan.control_port,
            &mut daemon,
            Waiter {
                timeout: plan.control_timeout,
                poll_interval: self.poll_interval,
            },
        )?;
        info!(target: PROVISION_TARGET, port = plan.control_port, "daemon ready");

        Ok(ProvisionReport {
            torrc_path: plan.torrc_path.clone(),
            torrc,
            launched,
            pid,
        })
    }
}

fn ensure_data_dir(path: &Utf8Path) -> Result<(), ProvisionError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    if let Err(source) = builder.create(path.as_std_path())
        && source.kind() != std::io::ErrorKind::AlreadyExists
    {
        return Err(ProvisionError::CreateDataDir {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
