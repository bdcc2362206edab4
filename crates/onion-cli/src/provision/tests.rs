//! Tests for the provisioning sequence.

use std::fs;
use std::io;
use std::net::TcpListener;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct Running;

impl DaemonProcess for Running {
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(None)
    }

    fn id(&self) -> Option<u32> {
        Some(4242)
    }
}

/// Launcher that plays the daemon: it writes the cookie and opens the port.
#[derive(Clone, Default)]
struct FakeLauncher {
    launches: Arc<Mutex<Vec<(String, Utf8PathBuf)>>>,
    listener: Arc<Mutex<Option<TcpListener>>>,
    port: u16,
    cookie_path: Utf8PathBuf,
}

impl FakeLauncher {
    fn launches(&self) -> Vec<(String, Utf8PathBuf)> {
        self.launches.lock().expect("launch log").clone()
    }
}

impl DaemonLauncher for FakeLauncher {
    fn launch(
        &self,
        binary: &str,
        torrc: &Utf8Path,
    ) -> Result<Box<dyn DaemonProcess>, ProvisionError> {
        self.launches
            .lock()
            .expect("launch log")
            .push((binary.to_owned(), torrc.to_path_buf()));
        fs::write(&self.cookie_path, [0x5A; 32]).expect("write cookie");
        let listener =
            TcpListener::bind(("127.0.0.1", self.port)).expect("bind fake control port");
        *self.listener.lock().expect("listener slot") = Some(listener);
        Ok(Box::new(Running))
    }
}

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn plan(&self, control_port: u16) -> ProvisionPlan {
        let data_dir = self.root.join("tor-data");
        ProvisionPlan {
            tor_binary: String::from("tor"),
            torrc_path: data_dir.join("torrc"),
            cookie_path: data_dir.join("control.authcookie"),
            log_file: None,
            data_dir,
            control_host: String::from("127.0.0.1"),
            control_port,
            cookie_timeout: Duration::from_millis(200),
            control_timeout: Duration::from_millis(200),
        }
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp path");
    Workspace { _dir: dir, root }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn plan_defaults_follow_the_cookie_path() {
    let config = Config {
        cookie_path: Utf8PathBuf::from("/var/lib/tor/control.authcookie"),
        ..Config::default()
    };
    let plan = ProvisionPlan::from_config(&config).expect("derive plan");
    assert_eq!(plan.data_dir, Utf8PathBuf::from("/var/lib/tor"));
    assert_eq!(plan.torrc_path, Utf8PathBuf::from("/var/lib/tor/torrc"));
    assert_eq!(plan.control_port, config.control_port);
}

#[test]
fn explicit_paths_win_over_derived_ones() {
    let config = Config {
        data_dir: Some(Utf8PathBuf::from("/srv/tor")),
        torrc_path: Some(Utf8PathBuf::from("/etc/tor/torrc")),
        ..Config::default()
    };
    let plan = ProvisionPlan::from_config(&config).expect("derive plan");
    assert_eq!(plan.data_dir, Utf8PathBuf::from("/srv/tor"));
    assert_eq!(plan.torrc_path, Utf8PathBuf::from("/etc/tor/torrc"));
}

#[test]
fn notices_log_adds_a_log_directive() {
    let config = Config {
        tor_log_file: Some(Utf8PathBuf::from("/var/log/tor/notices.log")),
        ..Config::default()
    };
    let plan = ProvisionPlan::from_config(&config).expect("derive plan");
    let rendered: Vec<String> = plan.directives().iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered.last().map(String::as_str),
        Some("Log notices file /var/log/tor/notices.log")
    );
}

#[test]
fn no_log_directive_without_a_notices_log() {
    let plan = ProvisionPlan::from_config(&Config::default()).expect("derive plan");
    assert!(
        plan.directives()
            .iter()
            .all(|directive| !directive.to_string().starts_with("Log "))
    );
}

#[test]
fn bare_cookie_names_need_an_explicit_data_dir() {
    let config = Config {
        cookie_path: Utf8PathBuf::from("cookie"),
        ..Config::default()
    };
    let error = ProvisionPlan::from_config(&config).expect_err("no parent directory");
    assert!(matches!(error, ProvisionError::MissingDataDir { .. }), "{error}");
}

#[rstest]
fn a_closed_control_port_starts_the_daemon(workspace: Workspace) {
    let port = free_port();
    let mut plan = workspace.plan(port);
    plan.log_file = Some(workspace.root.join("notices.log"));
    let launcher = FakeLauncher {
        port,
        cookie_path: plan.cookie_path.clone(),
        ..FakeLauncher::default()
    };
    let provisioner = Provisioner::with_launcher(plan.clone(), Box::new(launcher.clone()))
        .with_poll_interval(Duration::from_millis(10));

    let report = provisioner.run().expect("provision daemon");

    assert!(report.launched);
    assert_eq!(report.pid, Some(4242));
    assert_eq!(report.torrc, TorrcUpdate::Created);
    assert_eq!(
        launcher.launches(),
        vec![(String::from("tor"), plan.torrc_path.clone())]
    );
    let torrc = fs::read_to_string(&plan.torrc_path).expect("read torrc");
    assert!(torrc.contains(&format!("ControlPort {port}\n")), "{torrc}");
    assert!(torrc.contains("CookieAuthentication 1\n"));
    assert!(torrc.contains(&format!("CookieAuthFile {}\n", plan.cookie_path)));
    assert!(torrc.contains("CookieAuthFileGroupReadable 1\n"));
    assert!(torrc.contains(&format!("DataDirectory {}\n", plan.data_dir)));
    assert!(torrc.contains(&format!("Log notices file {}/notices.log\n", workspace.root)));
}

#[rstest]
fn an_open_control_port_skips_the_launch(workspace: Workspace) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind control port");
    let port = listener.local_addr().expect("local addr").port();
    let plan = workspace.plan(port);
    fs::create_dir_all(&plan.data_dir).expect("create data dir");
    fs::write(&plan.cookie_path, [0x11; 32]).expect("write cookie");
    let launcher = FakeLauncher::default();
    let provisioner = Provisioner::with_launcher(plan, Box::new(launcher.clone()))
        .with_poll_interval(Duration::from_millis(10));

    let report = provisioner.run().expect("provision daemon");

    assert!(!report.launched);
    assert!(launcher.launches().is_empty());
    assert_eq!(report.to_string().split("; ").nth(1), Some("daemon already running"));
}

#[rstest]
fn a_missing_cookie_times_out(workspace: Workspace) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind control port");
    let port = listener.local_addr().expect("local addr").port();
    let plan = workspace.plan(port);
    let provisioner = Provisioner::with_launcher(plan, Box::new(FakeLauncher::default()))
        .with_poll_interval(Duration::from_millis(10));

    let error = provisioner.run().expect_err("cookie never appears");

    assert!(matches!(error, ProvisionError::CookieTimeout { .. }), "{error}");
}

#[cfg(unix)]
#[rstest]
fn data_directories_are_private(workspace: Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let path = workspace.root.join("private").join("data");
    ensure_data_dir(&path).expect("create data dir");
    ensure_data_dir(&path).expect("existing data dir is fine");

    let mode = fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}
