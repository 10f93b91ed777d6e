//! The negotiated terminal
//!
//! A [`TerminalHandle`] is what negotiation hands back. It owns at most one
//! native resource ([`Pty`]) and the input/output streams. Input is always
//! read through the handle's own [`MultiByteDecoder`], so there is exactly
//! one consumer of the input stream.
//!
//! Closing restores the terminal mode captured when the native resource was
//! acquired. `Drop` closes too, so the mode is restored on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::attributes::{Attributes, Size};
use super::pty::{Pty, PtyError};
use crate::config::{EffectiveSettings, Streams};
use crate::decoder::{Charset, DecodeError, MultiByteDecoder};
use crate::provider::BackendFamily;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to write to terminal: {0}")]
    Io(#[from] io::Error),

    #[error("Terminal is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TerminalError>;

/// Signals a terminal can deliver to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Int,
    Quit,
    Tstp,
    Cont,
    Info,
    Winch,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::Int,
        Signal::Quit,
        Signal::Tstp,
        Signal::Cont,
        Signal::Info,
        Signal::Winch,
    ];
}

/// Reaction to a raised signal
#[derive(Clone, Default)]
pub enum SignalHandler {
    /// Platform default behaviour
    #[default]
    Default,
    Ignore,
    Custom(Arc<dyn Fn(Signal) + Send + Sync>),
}

impl SignalHandler {
    pub fn custom(f: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        SignalHandler::Custom(Arc::new(f))
    }
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalHandler::Default => f.write_str("Default"),
            SignalHandler::Ignore => f.write_str("Ignore"),
            SignalHandler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How the terminal was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    /// Attached to the process terminal through a backend
    System(BackendFamily),
    /// Fresh pseudo-terminal driving caller streams
    Pty(BackendFamily),
    /// Caller streams only
    External,
    /// Software-only fallback on the process streams
    Dumb,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalKind::System(family) => write!(f, "system terminal ({})", family),
            TerminalKind::Pty(family) => write!(f, "pty terminal ({})", family),
            TerminalKind::External => f.write_str("external terminal"),
            TerminalKind::Dumb => f.write_str("dumb terminal"),
        }
    }
}

pub struct TerminalHandle {
    name: String,
    term_type: String,
    kind: TerminalKind,
    pty: Option<Box<dyn Pty>>,
    input: MultiByteDecoder<Box<dyn Read + Send>>,
    output: Box<dyn Write + Send>,
    /// Used when there is no native resource
    attributes: Attributes,
    size: Size,
    native_signals: bool,
    handlers: HashMap<Signal, SignalHandler>,
    closed: bool,
}

impl TerminalHandle {
    pub(crate) fn new(
        kind: TerminalKind,
        settings: &EffectiveSettings,
        term_type: String,
        pty: Option<Box<dyn Pty>>,
        streams: Streams,
        handler: SignalHandler,
    ) -> Self {
        let handlers = Signal::ALL.iter().map(|s| (*s, handler.clone())).collect();
        Self {
            name: settings.name.clone(),
            term_type,
            kind,
            pty,
            input: MultiByteDecoder::new(settings.charset, streams.input),
            output: streams.output,
            attributes: Attributes::default(),
            size: Size::default(),
            native_signals: settings.native_signals,
            handlers,
            closed: false,
        }
    }

    /// Apply initial attributes and size to a terminal without a native
    /// resource
    pub(crate) fn seed(&mut self, attributes: Option<Attributes>, size: Option<Size>) {
        if let Some(attributes) = attributes {
            self.attributes = attributes;
        }
        if let Some(size) = size {
            self.size = size;
        }
    }

    /// Streams of the current process
    pub(crate) fn process_streams() -> Streams {
        Streams {
            input: Box::new(io::stdin()),
            output: Box::new(io::stdout()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn term_type(&self) -> &str {
        &self.term_type
    }

    pub fn charset(&self) -> Charset {
        self.input.charset()
    }

    pub fn kind(&self) -> TerminalKind {
        self.kind
    }

    /// Name of the native resource, if any
    pub fn pty_name(&self) -> Option<&'static str> {
        self.pty.as_ref().map(|p| p.name())
    }

    pub fn native_signals(&self) -> bool {
        self.native_signals
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn attributes(&self) -> Result<Attributes> {
        self.ensure_open()?;
        match &self.pty {
            Some(pty) => Ok(pty.attributes()?),
            None => Ok(self.attributes.clone()),
        }
    }

    pub fn set_attributes(&mut self, attributes: &Attributes) -> Result<()> {
        self.ensure_open()?;
        match &mut self.pty {
            Some(pty) => pty.set_attributes(attributes)?,
            None => self.attributes = attributes.clone(),
        }
        Ok(())
    }

    pub fn size(&self) -> Result<Size> {
        self.ensure_open()?;
        match &self.pty {
            Some(pty) => Ok(pty.size()?),
            None => Ok(self.size),
        }
    }

    pub fn set_size(&mut self, size: Size) -> Result<()> {
        self.ensure_open()?;
        match &mut self.pty {
            Some(pty) => pty.set_size(size)?,
            None => self.size = size,
        }
        Ok(())
    }

    /// Switch to raw mode, returning the attributes to restore later
    pub fn enter_raw_mode(&mut self) -> Result<Attributes> {
        let previous = self.attributes()?;
        self.set_attributes(&previous.raw())?;
        Ok(previous)
    }

    /// Next UTF-16 code unit of input, `None` at end of input
    pub fn read_unit(&mut self) -> Result<Option<u16>> {
        self.ensure_open()?;
        Ok(self.input.next_unit()?)
    }

    /// Write text in the terminal's encoding
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        let bytes = self.input.charset().encode(text);
        self.output.write_all(&bytes)?;
        Ok(())
    }

    /// Raw output stream
    pub fn writer(&mut self) -> &mut (dyn Write + Send) {
        self.output.as_mut()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.output.flush()?;
        Ok(())
    }

    /// Install a handler, returning the previous one
    pub fn handle(&mut self, signal: Signal, handler: SignalHandler) -> SignalHandler {
        self.handlers.insert(signal, handler).unwrap_or_default()
    }

    /// Deliver a signal to its handler
    pub fn raise(&self, signal: Signal) {
        match self.handlers.get(&signal) {
            Some(SignalHandler::Custom(f)) => f(signal),
            Some(SignalHandler::Ignore) => {}
            Some(SignalHandler::Default) | None => {
                debug!("Signal {:?} raised with default handler on {}", signal, self.kind);
            }
        }
    }

    /// Restore the original terminal mode and release the native resource.
    /// Further calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.output.flush();
        if let Some(pty) = &mut self.pty {
            pty.close()?;
        }
        flushed?;
        debug!("Closed {}", self.kind);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(TerminalError::Closed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for TerminalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalHandle")
            .field("name", &self.name)
            .field("term_type", &self.term_type)
            .field("kind", &self.kind)
            .field("pty", &self.pty_name())
            .field("charset", &self.charset())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for TerminalHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to restore terminal on drop: {}", e);
        }
    }
}
