//! Direct OS binding
//!
//! On Unix this talks termios to the terminal on stdin and can open fresh
//! pseudo-terminals. On Windows it drives the console input/output modes and
//! applies the requested codepage.

use crate::core::attributes::{Attributes, Size};
use crate::core::pty::{Pty, Result};
use crate::provider::{BackendFamily, CapabilityProvider, SystemRequest};

#[cfg(windows)]
mod console;
#[cfg(unix)]
mod termios;

#[cfg(windows)]
pub use console::ConsolePty;
#[cfg(unix)]
pub use termios::TermiosPty;

pub struct SysProvider;

impl CapabilityProvider for SysProvider {
    fn family(&self) -> BackendFamily {
        BackendFamily::Sys
    }

    #[cfg(unix)]
    fn current(&self, _request: &SystemRequest) -> Result<Box<dyn Pty>> {
        Ok(Box::new(TermiosPty::current()?))
    }

    #[cfg(windows)]
    fn current(&self, request: &SystemRequest) -> Result<Box<dyn Pty>> {
        Ok(Box::new(ConsolePty::current(request.codepage)?))
    }

    #[cfg(not(any(unix, windows)))]
    fn current(&self, _request: &SystemRequest) -> Result<Box<dyn Pty>> {
        Err(crate::core::pty::PtyError::Unsupported("no native terminal API on this platform"))
    }

    #[cfg(unix)]
    fn open(&self, attributes: Option<&Attributes>, size: Option<Size>) -> Result<Box<dyn Pty>> {
        Ok(Box::new(TermiosPty::open(attributes, size)?))
    }

    #[cfg(not(unix))]
    fn open(&self, _attributes: Option<&Attributes>, _size: Option<Size>) -> Result<Box<dyn Pty>> {
        Err(crate::core::pty::PtyError::Unsupported("cannot open a pseudo-terminal on this platform"))
    }
}
