//! crossterm backend
//!
//! crossterm only knows two line disciplines: cooked and raw. Attributes are
//! tracked locally and the raw/cooked distinction is what reaches the
//! terminal.

use std::io;

use crossterm::execute;
use crossterm::terminal;
use crossterm::tty::IsTty;
use tracing::debug;

use crate::core::attributes::{Attributes, Size};
use crate::core::pty::{Pty, PtyError, Result};
use crate::provider::{BackendFamily, CapabilityProvider, SystemRequest};

pub struct CrosstermProvider;

impl CapabilityProvider for CrosstermProvider {
    fn family(&self) -> BackendFamily {
        BackendFamily::Crossterm
    }

    fn current(&self, _request: &SystemRequest) -> Result<Box<dyn Pty>> {
        if !io::stdin().is_tty() || !io::stdout().is_tty() {
            return Err(PtyError::NotATerminal);
        }
        // A console that cannot report its size is not usable
        let (cols, rows) = terminal::size()?;
        debug!("crossterm terminal {}x{}", cols, rows);

        Ok(Box::new(CrosstermPty {
            attributes: Attributes::default(),
            raw: false,
        }))
    }

    fn open(&self, _attributes: Option<&Attributes>, _size: Option<Size>) -> Result<Box<dyn Pty>> {
        Err(PtyError::Unsupported("crossterm cannot open a new pseudo-terminal"))
    }
}

pub struct CrosstermPty {
    attributes: Attributes,
    /// Raw mode was enabled by us and must be undone on close
    raw: bool,
}

impl Pty for CrosstermPty {
    fn name(&self) -> &'static str {
        "crossterm"
    }

    fn attributes(&self) -> Result<Attributes> {
        Ok(self.attributes.clone())
    }

    fn set_attributes(&mut self, attributes: &Attributes) -> Result<()> {
        let want_raw = attributes.is_raw();
        if want_raw && !self.raw {
            terminal::enable_raw_mode()?;
        } else if !want_raw && self.raw {
            terminal::disable_raw_mode()?;
        }
        self.raw = want_raw;
        self.attributes = attributes.clone();
        Ok(())
    }

    fn size(&self) -> Result<Size> {
        let (columns, rows) = terminal::size()?;
        Ok(Size::new(columns, rows))
    }

    fn set_size(&mut self, size: Size) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, terminal::SetSize(size.columns, size.rows))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.raw {
            self.raw = false;
            terminal::disable_raw_mode()?;
        }
        Ok(())
    }
}
