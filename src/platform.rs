//! OS classification
//!
//! Negotiation only cares which of three OS classes it is running on. The
//! facts feeding the classifier are gathered separately so the classifier
//! itself stays a pure function.

use std::fmt;

use crate::config::SettingSource;

/// Platform facts relevant to backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformFacts {
    pub cygwin: bool,
    pub mingw: bool,
    pub windows: bool,
}

impl PlatformFacts {
    /// Gather facts from the build target and the given environment
    pub fn detect(env: &dyn SettingSource) -> Self {
        let windows = cfg!(windows);
        let ostype = env.get("OSTYPE").unwrap_or_default().to_ascii_lowercase();
        let pwd_is_posix = env.get("PWD").map(|p| p.starts_with('/')).unwrap_or(false);
        let mintty = env.get("TERM_PROGRAM").map(|p| p == "mintty").unwrap_or(false);
        let msystem = env.get("MSYSTEM").unwrap_or_default().to_ascii_uppercase();

        Self {
            cygwin: windows && (ostype.contains("cygwin") || (mintty && pwd_is_posix)),
            mingw: windows
                && (msystem.starts_with("MINGW")
                    || msystem.starts_with("UCRT")
                    || msystem.starts_with("CLANG")),
            windows,
        }
    }
}

/// Closed set of OS classes, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsClass {
    CygwinOrMingw,
    Windows,
    PosixOrOther,
}

impl OsClass {
    pub fn classify(facts: PlatformFacts) -> Self {
        if facts.cygwin || facts.mingw {
            OsClass::CygwinOrMingw
        } else if facts.windows {
            OsClass::Windows
        } else {
            OsClass::PosixOrOther
        }
    }
}

impl fmt::Display for OsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsClass::CygwinOrMingw => "cygwin/mingw",
            OsClass::Windows => "windows",
            OsClass::PosixOrOther => "posix",
        };
        f.write_str(name)
    }
}
