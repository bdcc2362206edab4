//! Step-by-step lifecycle checks behind `onionctl check`.
//!
//! One controller walks connect, authenticate, bootstrap, publish and
//! teardown, reporting each step. A second, fresh controller then runs the
//! whole round trip in one call. Once a step fails, the steps after it on the
//! same controller are skipped.

use std::fmt;
use std::io::{self, Write};

use onion_control::{ControlError, HiddenServiceController, ServiceConfig, TeardownOutcome};

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckStatus {
    Pass(Option<String>),
    Fail(String),
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckResult {
    pub(crate) name: &'static str,
    pub(crate) status: CheckStatus,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[check] {} : ", self.name)?;
        match &self.status {
            CheckStatus::Pass(None) => formatter.write_str("PASS"),
            CheckStatus::Pass(Some(detail)) => write!(formatter, "PASS ({detail})"),
            CheckStatus::Fail(reason) => write!(formatter, "FAIL ({reason})"),
            CheckStatus::Skip => formatter.write_str("SKIP"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CheckReport {
    results: Vec<CheckResult>,
}

impl CheckReport {
    pub(crate) fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub(crate) fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|result| matches!(result.status, CheckStatus::Fail(_)))
            .count()
    }

    pub(crate) fn total(&self) -> usize {
        self.results.len()
    }

    pub(crate) fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for result in self.results() {
            writeln!(out, "{result}")?;
        }
        out.flush()
    }

    fn record(&mut self, name: &'static str, status: CheckStatus) -> bool {
        let passed = matches!(status, CheckStatus::Pass(_));
        self.results.push(CheckResult { name, status });
        passed
    }

    fn outcome(&mut self, name: &'static str, result: Result<(), ControlError>) -> bool {
        let status = match result {
            Ok(()) => CheckStatus::Pass(None),
            Err(error) => CheckStatus::Fail(error.to_string()),
        };
        self.record(name, status)
    }
}

/// Runs every check, building controllers with `build`.
pub(crate) fn run_checks<F>(config: &ServiceConfig, build: F) -> CheckReport
where
    F: Fn(ServiceConfig) -> HiddenServiceController,
{
    let mut report = CheckReport::default();
    let mut controller = build(config.clone());
    let mut healthy = report.outcome("connect", controller.connect());
    healthy = if healthy {
        report.outcome("authenticate", controller.authenticate())
    } else {
        report.record("authenticate", CheckStatus::Skip)
    };

    if healthy {
        let status = if config.wait_for_bootstrap {
            match controller.await_bootstrap() {
                Ok(true) => CheckStatus::Pass(None),
                Ok(false) => CheckStatus::Fail(format!(
                    "not bootstrapped within {} ms",
                    config.bootstrap_timeout.as_millis()
                )),
                Err(error) => CheckStatus::Fail(error.to_string()),
            }
        } else {
            CheckStatus::Skip
        };
        healthy = !matches!(status, CheckStatus::Fail(_));
        report.record("bootstrap", status);
    } else {
        report.record("bootstrap", CheckStatus::Skip);
    }

    if healthy {
        let status = match controller.setup() {
            Ok(address) => CheckStatus::Pass(Some(address.to_string())),
            Err(error) => CheckStatus::Fail(error.to_string()),
        };
        report.record("publish", status);
        let status = match controller.teardown() {
            TeardownOutcome::Clean | TeardownOutcome::NoOp => CheckStatus::Pass(None),
            TeardownOutcome::Degraded { warnings } => CheckStatus::Fail(warnings.join("; ")),
        };
        report.record("teardown", status);
    } else {
        report.record("publish", CheckStatus::Skip);
        report.record("teardown", CheckStatus::Skip);
    }
    drop(controller);

    let mut fresh = build(config.clone());
    let status = match fresh.verify_round_trip() {
        Ok(address) => CheckStatus::Pass(Some(address.to_string())),
        Err(error) => CheckStatus::Fail(error.to_string()),
    };
    report.record("round_trip", status);
    report
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use onion_control::{ControlEndpoint, stub_service_id};
    use rstest::rstest;

    use super::*;

    fn names(report: &CheckReport) -> Vec<&'static str> {
        report.results().iter().map(|result| result.name).collect()
    }

    #[test]
    fn stub_mode_passes_every_check() {
        let config = ServiceConfig {
            stub_mode: true,
            ..ServiceConfig::default()
        };
        let report = run_checks(&config, HiddenServiceController::new);

        assert_eq!(
            names(&report),
            ["connect", "authenticate", "bootstrap", "publish", "teardown", "round_trip"]
        );
        assert_eq!(report.failed(), 0);
        let address = format!("{}.onion", stub_service_id("127.0.0.1", 5000, 12345));
        let publish = report
            .results()
            .iter()
            .find(|result| result.name == "publish")
            .expect("publish check");
        assert_eq!(publish.status, CheckStatus::Pass(Some(address)));
    }

    #[test]
    fn an_unreachable_daemon_skips_the_dependent_steps() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        let config = ServiceConfig {
            control: ControlEndpoint::new("127.0.0.1", port),
            ..ServiceConfig::default()
        };

        let report = run_checks(&config, HiddenServiceController::new);

        let rendered: Vec<String> = report.results().iter().map(ToString::to_string).collect();
        assert!(rendered[0].starts_with("[check] connect : FAIL ("), "{rendered:?}");
        assert_eq!(
            &rendered[1..5],
            [
                "[check] authenticate : SKIP",
                "[check] bootstrap : SKIP",
                "[check] publish : SKIP",
                "[check] teardown : SKIP",
            ]
        );
        assert!(rendered[5].starts_with("[check] round_trip : FAIL"));
        assert_eq!(report.failed(), 2);
        assert_eq!(report.total(), 6);
    }

    #[rstest]
    #[case(CheckStatus::Pass(None), "[check] connect : PASS")]
    #[case(CheckStatus::Fail(String::from("refused")), "[check] connect : FAIL (refused)")]
    #[case(CheckStatus::Skip, "[check] connect : SKIP")]
    fn results_render_one_line(#[case] status: CheckStatus, #[case] expected: &str) {
        let result = CheckResult {
            name: "connect",
            status,
        };
        assert_eq!(result.to_string(), expected);
    }
}
