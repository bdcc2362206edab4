//! Shared fixtures for behavioural tests.

mod fake_control;

pub(in crate::tests) use fake_control::{DaemonScript, FakeControlDaemon};
