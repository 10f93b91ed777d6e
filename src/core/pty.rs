//! Native terminal resource abstraction
//!
//! A [`Pty`] is the native half of a terminal: it owns whatever OS-level state
//! a backend acquired (a termios snapshot, a console mode, a pty pair, a saved
//! `stty` setting) and knows how to put it back on [`Pty::close`].

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use super::attributes::{Attributes, Size};
use crate::config::Streams;
use crate::provider::BackendFamily;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("No provider registered for {0}")]
    NoProvider(BackendFamily),

    #[error("Not a terminal device")]
    NotATerminal,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to parse terminal state: {0}")]
    Parse(String),

    #[error("Platform API error: {0}")]
    Os(String),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// An acquired native terminal resource
pub trait Pty: Send {
    /// Short backend-specific name, used in diagnostics
    fn name(&self) -> &'static str;

    fn attributes(&self) -> Result<Attributes>;

    fn set_attributes(&mut self, attributes: &Attributes) -> Result<()>;

    fn size(&self) -> Result<Size>;

    fn set_size(&mut self, size: Size) -> Result<()>;

    /// Route caller streams through this terminal and return the streams the
    /// application side should use. A freshly opened pty pumps `streams`
    /// through its master so its line discipline applies to the data;
    /// terminals that are the caller's device already pass them back as-is.
    fn connect(&mut self, streams: Streams) -> Streams {
        streams
    }

    /// Restore the mode captured at acquisition time and release the resource.
    /// Calling it more than once must be harmless.
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PtyError::NoProvider(BackendFamily::Exec);
        assert_eq!(err.to_string(), "No provider registered for exec");

        let err = PtyError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        assert!(err.to_string().contains("pipe closed"));
    }
}
