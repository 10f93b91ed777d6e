//! Core terminal components.
//!
//! - **attributes**: termios-style modes and window size
//! - **pty**: the native resource trait every backend implements
//! - **terminal**: the negotiated [`TerminalHandle`](terminal::TerminalHandle)
//!
//! # Architecture
//!
//! ```text
//! TerminalHandle
//! ├── Pty (native resource, absent for dumb/external terminals)
//! ├── MultiByteDecoder (input stream -> UTF-16 code units)
//! └── output stream
//! ```

pub mod attributes;
pub mod pty;
pub mod terminal;
