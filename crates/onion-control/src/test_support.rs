//! Scripted command channel shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::channel::CommandChannel;
use crate::command::Command;
use crate::error::ControlError;
use crate::reply::ReplyBlock;

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<Result<ReplyBlock, ControlError>>,
    lines: Vec<String>,
    closes: usize,
}

/// Channel that answers from a queue and records the wire lines it was sent.
///
/// Clones share state, so a test can keep a handle after boxing a clone into
/// the controller.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedChannel {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedChannel {
    /// Queues one reply per item. Multi-line replies separate lines with `\n`.
    pub(crate) fn replying<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        let channel = Self::default();
        for reply in replies {
            channel.push_reply(reply);
        }
        channel
    }

    pub(crate) fn push_reply(&self, reply: &str) {
        let block = ReplyBlock::from_lines(reply.split('\n')).expect("scripted reply is final");
        self.state().replies.push_back(Ok(block));
    }

    pub(crate) fn push_error(&self, error: ControlError) {
        self.state().replies.push_back(Err(error));
    }

    /// Wire lines received so far.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    pub(crate) fn keywords(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.split_whitespace().next().map(str::to_owned))
            .collect()
    }

    pub(crate) fn closes(&self) -> usize {
        self.state().closes
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state poisoned")
    }
}

impl CommandChannel for ScriptedChannel {
    fn send(&mut self, command: &Command) -> Result<ReplyBlock, ControlError> {
        let mut state = self.state();
        state.lines.push(command.line());
        state
            .replies
            .pop_front()
            .unwrap_or(Err(ControlError::UnexpectedEof { pending_lines: 0 }))
    }

    fn close(&mut self) -> Result<(), ControlError> {
        self.state().closes += 1;
        Ok(())
    }
}
