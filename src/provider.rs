//! Capability providers and the provider registry
//!
//! A provider is one backend family's entry point: it either hands out a
//! native [`Pty`] or fails. The registry is an explicit ordered list injected
//! into the builder; looking up a family returns the first provider
//! registered for it.

use std::fmt;
use std::sync::Arc;

use crate::core::attributes::{Attributes, Size};
use crate::core::pty::{Pty, PtyError, Result};
use crate::platform::OsClass;

/// Backend families, in the vocabulary used by configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    /// Raw mode and tty detection through crossterm
    Crossterm,
    /// Direct OS binding: termios on Unix, console modes on Windows
    Sys,
    /// `stty` subprocesses against the controlling tty
    Exec,
    /// Caller-supplied streams with no native resource
    External,
}

impl BackendFamily {
    pub fn name(self) -> &'static str {
        match self {
            BackendFamily::Crossterm => "crossterm",
            BackendFamily::Sys => "sys",
            BackendFamily::Exec => "exec",
            BackendFamily::External => "external",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a provider needs to attach to the system terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemRequest {
    pub os_class: OsClass,
    /// Console codepage to apply, Windows only
    pub codepage: Option<u32>,
}

pub trait CapabilityProvider: Send + Sync {
    fn family(&self) -> BackendFamily;

    /// Attach to the terminal the process is running in
    fn current(&self, request: &SystemRequest) -> Result<Box<dyn Pty>>;

    /// Open a fresh pseudo-terminal seeded with the given attributes and size
    fn open(&self, attributes: Option<&Attributes>, size: Option<Size>) -> Result<Box<dyn Pty>>;
}

/// Ordered set of providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend compiled into this build
    pub fn native() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::backend::crossterm::CrosstermProvider));
        registry.register(Arc::new(crate::backend::sys::SysProvider));
        registry.register(Arc::new(crate::backend::exec::ExecProvider::default()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.providers.push(provider);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.register(provider);
        self
    }

    /// First provider registered for `family`
    pub fn lookup(&self, family: BackendFamily) -> Result<&dyn CapabilityProvider> {
        self.providers
            .iter()
            .find(|p| p.family() == family)
            .map(|p| p.as_ref())
            .ok_or(PtyError::NoProvider(family))
    }

    pub fn families(&self) -> Vec<BackendFamily> {
        self.providers.iter().map(|p| p.family()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.families()).finish()
    }
}
