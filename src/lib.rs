//! termhost - terminal backend negotiation
//!
//! termhost picks a working terminal implementation for the current process
//! (or for caller-supplied streams) from a set of backends, and decodes the
//! terminal's input into UTF-16 code units without losing multi-byte
//! characters split across reads.
//!
//! # Quick Start
//!
//! ```no_run
//! use termhost::TerminalBuilder;
//!
//! let mut terminal = TerminalBuilder::new().dumb(true).build()?;
//! terminal.write_str("hello\r\n")?;
//! terminal.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Backends
//!
//! | Family    | Mechanism                                        |
//! |-----------|--------------------------------------------------|
//! | crossterm | crossterm raw mode                               |
//! | sys       | termios/openpty on Unix, console modes on Windows |
//! | exec      | `stty` subprocesses                              |
//! | external  | caller streams, no native resource               |

pub mod backend;
pub mod config;
pub mod core;
pub mod decoder;
pub mod negotiate;
pub mod platform;
pub mod provider;

pub use crate::config::{EffectiveSettings, Environment, NamedSettings, Origin, SettingSource, TerminalConfig};
pub use crate::core::attributes::{Attributes, ControlChar, Size};
pub use crate::core::pty::{Pty, PtyError};
pub use crate::core::terminal::{Signal, SignalHandler, TerminalError, TerminalHandle, TerminalKind};
pub use crate::decoder::{Charset, DecodeError, Malformed, MultiByteDecoder};
pub use crate::negotiate::{terminal, BackendAttempt, NegotiationError, TerminalBuilder};
pub use crate::platform::{OsClass, PlatformFacts};
pub use crate::provider::{BackendFamily, CapabilityProvider, ProviderRegistry, SystemRequest};
