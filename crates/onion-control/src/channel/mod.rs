//! Command channels to the control daemon.
//!
//! A [`CommandChannel`] carries one command at a time and returns its reply.
//! A [`Connector`] opens channels; the controller holds one so tests and stub
//! mode can swap the network out.

mod stream;
mod synthetic;

pub use stream::{
    CONNECTION_TIMEOUT, CloseStream, REPLY_TIMEOUT, StreamChannel, TcpChannel, TcpConnector,
};
pub use synthetic::{SyntheticChannel, SyntheticConnector};

use crate::command::Command;
use crate::config::ControlEndpoint;
use crate::error::ControlError;
use crate::reply::ReplyBlock;

/// Half-duplex command exchange.
///
/// `send` takes `&mut self`, so a second command cannot be issued while the
/// first is awaiting its reply.
#[cfg_attr(test, mockall::automock)]
pub trait CommandChannel: Send {
    /// Writes `command` and blocks until its reply is complete.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlError`] when the exchange fails or the channel is
    /// already closed.
    fn send(&mut self, command: &Command) -> Result<ReplyBlock, ControlError>;

    /// Closes the channel. Closing twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Close`] when the underlying shutdown fails.
    fn close(&mut self) -> Result<(), ControlError>;
}

/// Opens command channels.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send {
    /// Connects to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a connectivity [`ControlError`] when the endpoint cannot be
    /// reached.
    fn connect(&self, endpoint: &ControlEndpoint)
    -> Result<Box<dyn CommandChannel>, ControlError>;
}
