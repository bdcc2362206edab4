//! Behavioural suites for the control client.

mod support;
