//! Concrete capability providers.
//!
//! - **crossterm**: raw mode and tty detection via crossterm, any OS
//! - **sys**: termios and `openpty` on Unix, console modes on Windows
//! - **exec**: `stty` subprocesses, the only option under Cygwin/MinGW

pub mod crossterm;
pub mod exec;
pub mod sys;
