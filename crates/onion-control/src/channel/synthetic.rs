//! In-process channel used in stub mode.

use tracing::debug;

use super::{CommandChannel, Connector};
use crate::bootstrap::BOOTSTRAP_PHASE_KEY;
use crate::command::Command;
use crate::config::ControlEndpoint;
use crate::error::ControlError;
use crate::reply::ReplyBlock;

const SYNTHETIC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::synthetic");
const OK_LINE: &str = "250 OK";

/// Channel that answers every command locally.
///
/// Bootstrap queries report completion, service creation reports the
/// configured identifier, and everything else succeeds. No bytes leave the
/// process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticChannel {
    service_id: String,
    open: bool,
    sent: Vec<String>,
}

impl SyntheticChannel {
    /// Creates an open channel that reports `service_id` on creation.
    #[must_use]
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            open: true,
            sent: Vec::new(),
        }
    }

    /// Redacted renderings of the commands received so far.
    #[must_use]
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    fn reply_to(&self, command: &Command) -> Result<ReplyBlock, ControlError> {
        match command.keyword() {
            "GETINFO"
                if command
                    .arguments()
                    .first()
                    .is_some_and(|key| key == BOOTSTRAP_PHASE_KEY) =>
            {
                ReplyBlock::from_lines([
                    format!(
                        "250-{BOOTSTRAP_PHASE_KEY}=NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY=\"Done\""
                    ),
                    OK_LINE.to_owned(),
                ])
            }
            "ADD_ONION" => ReplyBlock::from_lines([
                format!("250-ServiceID={}", self.service_id),
                OK_LINE.to_owned(),
            ]),
            _ => ReplyBlock::from_lines([OK_LINE]),
        }
    }
}

impl CommandChannel for SyntheticChannel {
    fn send(&mut self, command: &Command) -> Result<ReplyBlock, ControlError> {
        if !self.open {
            return Err(ControlError::ChannelClosed);
        }
        debug!(target: SYNTHETIC_TARGET, %command, "answering command locally");
        self.sent.push(command.to_string());
        self.reply_to(command)
    }

    fn close(&mut self) -> Result<(), ControlError> {
        self.open = false;
        Ok(())
    }
}

/// Connector that hands out [`SyntheticChannel`]s without touching the
/// network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConnector {
    service_id: String,
}

impl SyntheticConnector {
    /// Creates a connector whose channels report `service_id`.
    #[must_use]
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
        }
    }
}

impl Connector for SyntheticConnector {
    fn connect(
        &self,
        endpoint: &ControlEndpoint,
    ) -> Result<Box<dyn CommandChannel>, ControlError> {
        debug!(target: SYNTHETIC_TARGET, %endpoint, "opening synthetic channel");
        Ok(Box::new(SyntheticChannel::new(self.service_id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::parse_progress;

    #[test]
    fn bootstrap_query_reports_completion() {
        let mut channel = SyntheticChannel::new("abc");
        let query = Command::get_info(BOOTSTRAP_PHASE_KEY).expect("valid command");
        let reply = channel.send(&query).expect("reply");
        assert!(reply.is_success());
        let progress = reply.lines().iter().find_map(|line| parse_progress(line));
        assert_eq!(progress, Some(100));
    }

    #[test]
    fn closed_channel_refuses_commands() {
        let mut channel = SyntheticChannel::new("abc");
        channel.close().expect("close");
        let command = Command::del_onion("abc").expect("valid command");
        assert!(matches!(
            channel.send(&command),
            Err(ControlError::ChannelClosed)
        ));
    }
}
