//! Reply framing for the control protocol.
//!
//! Replies arrive as CRLF-terminated lines. Every line of a reply starts with
//! a three digit status followed by a separator: `-` continues the reply,
//! `+` opens a data section that runs until a lone `.`, and a space marks the
//! final line. The framer turns an arbitrarily chunked byte stream into
//! complete [`ReplyBlock`]s.

use std::mem;

use crate::error::ControlError;

const LINE_TERMINATOR: &[u8] = b"\r\n";
const DATA_TERMINATOR: &str = ".";

/// Longest line, without its terminator, the framer will buffer.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Final,
    Continuation,
    DataStart,
    Other,
}

fn classify(line: &str) -> LineKind {
    match line.as_bytes() {
        [a, b, c, separator, ..]
            if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() =>
        {
            match separator {
                b' ' => LineKind::Final,
                b'-' => LineKind::Continuation,
                b'+' => LineKind::DataStart,
                _ => LineKind::Other,
            }
        }
        _ => LineKind::Other,
    }
}

fn status_of(line: &str) -> Option<u16> {
    line.get(..3).and_then(|digits| digits.parse().ok())
}

/// One complete reply: every line received up to and including the final
/// status line, without terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyBlock {
    lines: Vec<String>,
    status: u16,
}

impl ReplyBlock {
    /// Assembles a block from lines whose last entry is a final status line.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::MalformedReply`] when `lines` is empty or its
    /// last entry is not a final status line.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, ControlError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collected: Vec<String> = lines.into_iter().map(Into::into).collect();
        let last = collected.last().map(String::as_str).unwrap_or_default();
        match (classify(last), status_of(last)) {
            (LineKind::Final, Some(status)) => Ok(Self {
                lines: collected,
                status,
            }),
            _ => Err(ControlError::MalformedReply {
                line: last.to_owned(),
            }),
        }
    }

    /// Lines of the reply in arrival order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Status code of the final line.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// The final status line.
    #[must_use]
    pub fn final_line(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns `true` when the final status is in the 2xx class.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.final_line().starts_with('2')
    }

    /// Returns `true` for unsolicited 6xx event notifications.
    #[must_use]
    pub fn is_async_event(&self) -> bool {
        self.final_line().starts_with('6')
    }

    /// Returns the value of the first `key=value` payload across all lines.
    ///
    /// Status prefixes are ignored, so `250-ServiceID=abc` yields `abc` for
    /// the key `ServiceID`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let payload = match classify(line) {
                LineKind::Other => line.as_str(),
                _ => line.get(4..).unwrap_or_default(),
            };
            payload
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// Incremental reply assembler.
///
/// Feed it bytes with [`push`](Self::push) as they arrive and drain complete
/// replies with [`next_block`](Self::next_block). Bytes after the end of one
/// reply are kept for the next.
#[derive(Debug, Default)]
pub struct ReplyFramer {
    buffer: Vec<u8>,
    // Leading bytes of `buffer` already known to hold no terminator.
    scanned: usize,
    lines: Vec<String>,
    in_data: bool,
}

impl ReplyFramer {
    /// Creates an empty framer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            lines: Vec::new(),
            in_data: false,
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete reply, if one has fully arrived.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::LineTooLong`] when the pending line grows past
    /// [`MAX_LINE_LENGTH`] without a terminator.
    pub fn next_block(&mut self) -> Result<Option<ReplyBlock>, ControlError> {
        while let Some(line) = self.take_line()? {
            if self.in_data {
                if line == DATA_TERMINATOR {
                    self.in_data = false;
                    self.lines.push(line);
                } else {
                    self.lines.push(unescape_data_line(line));
                }
                continue;
            }
            match classify(&line) {
                LineKind::Final => {
                    let status = status_of(&line).unwrap_or_default();
                    self.lines.push(line);
                    return Ok(Some(ReplyBlock {
                        lines: mem::take(&mut self.lines),
                        status,
                    }));
                }
                LineKind::DataStart => {
                    self.in_data = true;
                    self.lines.push(line);
                }
                LineKind::Continuation | LineKind::Other => self.lines.push(line),
            }
        }
        Ok(None)
    }

    /// Returns `true` when a reply has started but not finished.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || !self.lines.is_empty() || self.in_data
    }

    /// Consumes the framer at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnexpectedEof`] when a reply was left
    /// unfinished.
    pub fn finish(self) -> Result<(), ControlError> {
        if self.has_partial() {
            return Err(self.eof_error());
        }
        Ok(())
    }

    /// Error describing an end of stream in the current state.
    pub(crate) fn eof_error(&self) -> ControlError {
        ControlError::UnexpectedEof {
            pending_lines: self.lines.len(),
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, ControlError> {
        // A terminator may straddle the previous scan boundary.
        let start = self.scanned.saturating_sub(LINE_TERMINATOR.len() - 1);
        let found = self
            .buffer
            .get(start..)
            .unwrap_or_default()
            .windows(LINE_TERMINATOR.len())
            .position(|window| window == LINE_TERMINATOR);
        let Some(offset) = found else {
            self.scanned = self.buffer.len();
            if self.scanned > MAX_LINE_LENGTH {
                return Err(ControlError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }
            return Ok(None);
        };
        let end = start + offset;
        let mut raw: Vec<u8> = self.buffer.drain(..end + LINE_TERMINATOR.len()).collect();
        raw.truncate(end);
        self.scanned = 0;
        Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
    }
}

fn unescape_data_line(line: String) -> String {
    if line.starts_with("..") {
        line.get(1..).map(str::to_owned).unwrap_or(line)
    } else {
        line
    }
}
