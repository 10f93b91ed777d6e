//! Backend negotiation
//!
//! [`TerminalBuilder::build`] resolves the configuration, classifies the OS
//! and then walks an ordered list of candidate backends until one produces a
//! terminal.
//!
//! # System terminals
//!
//! Used when no streams were supplied (or `system(true)` was requested).
//! Candidates per OS class, minus the ones switched off:
//!
//! | OS class      | Candidates                   |
//! |---------------|------------------------------|
//! | Cygwin/MinGW  | exec                         |
//! | Windows       | crossterm, sys               |
//! | other         | crossterm, sys, exec         |
//!
//! Every failure is recorded and the next candidate is tried. When nothing
//! works, a dumb terminal on the process streams is returned unless the dumb
//! fallback was explicitly disabled, in which case the caller gets a
//! [`NegotiationError`] listing every attempt.
//!
//! # External terminals
//!
//! Used with caller streams (or `system(false)`). crossterm and sys are asked
//! for a fresh pty, and the caller streams are pumped through it so its line
//! discipline applies. If neither can, the streams are wrapped directly,
//! which cannot fail.
//!
//! Negotiation is synchronous. A backend that blocks in its native open call
//! blocks the whole negotiation; disable it to skip it.

use std::fmt;
use std::io::{Read, Write};

use thiserror::Error;
use tracing::{debug, warn, Level};

use crate::config::{EffectiveSettings, Environment, NamedSettings, SettingSource, Streams, TerminalConfig};
use crate::core::attributes::{Attributes, Size};
use crate::core::pty::PtyError;
use crate::core::terminal::{SignalHandler, TerminalHandle, TerminalKind};
use crate::platform::{OsClass, PlatformFacts};
use crate::provider::{BackendFamily, ProviderRegistry, SystemRequest};

/// Terminal type Cygwin/MinGW consoles report
pub const TYPE_XTERM: &str = "xterm";

/// What those consoles actually support
pub const TYPE_XTERM_256COLOR: &str = "xterm-256color";

/// One failed backend attempt
#[derive(Debug)]
pub struct BackendAttempt {
    pub family: BackendFamily,
    pub cause: PtyError,
}

impl fmt::Display for BackendAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.family, self.cause)
    }
}

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Unable to create a system terminal{}", describe_attempts(.attempts))]
    NoUsableTerminal { attempts: Vec<BackendAttempt> },
}

impl NegotiationError {
    /// Every attempt, in the order it was made
    pub fn attempts(&self) -> &[BackendAttempt] {
        match self {
            NegotiationError::NoUsableTerminal { attempts } => attempts,
        }
    }
}

fn describe_attempts(attempts: &[BackendAttempt]) -> String {
    if attempts.is_empty() {
        return " (no backend enabled)".to_string();
    }
    let causes: Vec<String> = attempts.iter().map(|a| a.to_string()).collect();
    format!(": {}", causes.join("; "))
}

/// Candidate backends for a system terminal, in the order they are tried
pub fn system_candidates(os_class: OsClass, settings: &EffectiveSettings) -> Vec<BackendFamily> {
    let order: &[BackendFamily] = match os_class {
        OsClass::CygwinOrMingw => &[BackendFamily::Exec],
        OsClass::Windows => &[BackendFamily::Crossterm, BackendFamily::Sys],
        OsClass::PosixOrOther => &[BackendFamily::Crossterm, BackendFamily::Sys, BackendFamily::Exec],
    };
    order.iter().copied().filter(|f| is_enabled(*f, settings)).collect()
}

/// Candidate backends for a terminal over caller streams
pub fn external_candidates(settings: &EffectiveSettings) -> Vec<BackendFamily> {
    [BackendFamily::Crossterm, BackendFamily::Sys]
        .into_iter()
        .filter(|f| is_enabled(*f, settings))
        .collect()
}

fn is_enabled(family: BackendFamily, settings: &EffectiveSettings) -> bool {
    match family {
        BackendFamily::Crossterm => settings.crossterm,
        BackendFamily::Sys => settings.sys,
        BackendFamily::Exec => settings.exec,
        BackendFamily::External => true,
    }
}

/// Terminal type for a system terminal obtained through `family`.
///
/// Cygwin and MinGW consoles advertise `xterm` but handle 256 colors, so an
/// `xterm` that only came from the environment is upgraded.
pub fn system_term_type(os_class: OsClass, family: BackendFamily, settings: &EffectiveSettings) -> String {
    if os_class == OsClass::CygwinOrMingw
        && family == BackendFamily::Exec
        && settings.term_type == TYPE_XTERM
        && settings.type_origin == crate::config::Origin::Environment
    {
        return TYPE_XTERM_256COLOR.to_string();
    }
    settings.term_type.clone()
}

/// Default system terminal, equivalent to `TerminalBuilder::new().build()`
pub fn terminal() -> Result<TerminalHandle, NegotiationError> {
    TerminalBuilder::new().build()
}

/// Collects options, then negotiates a terminal
pub struct TerminalBuilder {
    config: TerminalConfig,
    named: Option<Box<dyn SettingSource>>,
    env: Box<dyn SettingSource>,
    facts: Option<PlatformFacts>,
    registry: ProviderRegistry,
}

impl Default for TerminalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalBuilder {
    pub fn new() -> Self {
        Self {
            config: TerminalConfig::default(),
            named: None,
            env: Box::new(Environment::system()),
            facts: None,
            registry: ProviderRegistry::native(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn streams(mut self, input: impl Read + Send + 'static, output: impl Write + Send + 'static) -> Self {
        self.config.streams = Some(Streams {
            input: Box::new(input),
            output: Box::new(output),
        });
        self
    }

    pub fn system(mut self, system: bool) -> Self {
        self.config.system = Some(system);
        self
    }

    pub fn crossterm(mut self, enabled: bool) -> Self {
        self.config.crossterm = Some(enabled);
        self
    }

    pub fn sys(mut self, enabled: bool) -> Self {
        self.config.sys = Some(enabled);
        self
    }

    pub fn exec(mut self, enabled: bool) -> Self {
        self.config.exec = Some(enabled);
        self
    }

    pub fn dumb(mut self, enabled: bool) -> Self {
        self.config.dumb = Some(enabled);
        self
    }

    pub fn term_type(mut self, term_type: impl Into<String>) -> Self {
        self.config.term_type = Some(term_type.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.encoding = Some(encoding.into());
        self
    }

    pub fn codepage(mut self, codepage: i32) -> Self {
        self.config.codepage = codepage;
        self
    }

    /// Initial attributes for a non-system terminal
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.config.attributes = Some(attributes);
        self
    }

    /// Initial size for a non-system terminal
    pub fn size(mut self, size: Size) -> Self {
        self.config.size = Some(size);
        self
    }

    pub fn native_signals(mut self, native_signals: bool) -> Self {
        self.config.native_signals = native_signals;
        self
    }

    pub fn signal_handler(mut self, handler: SignalHandler) -> Self {
        self.config.signal_handler = handler;
        self
    }

    /// Replace all explicit options at once
    pub fn config(mut self, config: TerminalConfig) -> Self {
        self.config = config;
        self
    }

    /// Named settings source; `~/.termhost/terminal.toml` when not given
    pub fn named_settings(mut self, named: impl SettingSource + 'static) -> Self {
        self.named = Some(Box::new(named));
        self
    }

    pub fn environment(mut self, env: impl SettingSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Platform facts; detected from the build target and environment when
    /// not given
    pub fn platform(mut self, facts: PlatformFacts) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Resolve the configuration without negotiating
    pub fn settings(&self) -> EffectiveSettings {
        match &self.named {
            Some(named) => EffectiveSettings::resolve(&self.config, named.as_ref(), self.env.as_ref()),
            None => EffectiveSettings::resolve(&self.config, &NamedSettings::load(), self.env.as_ref()),
        }
    }

    pub fn os_class(&self) -> OsClass {
        OsClass::classify(self.facts.unwrap_or_else(|| PlatformFacts::detect(self.env.as_ref())))
    }

    pub fn build(self) -> Result<TerminalHandle, NegotiationError> {
        let settings = self.settings();
        let os_class = self.os_class();
        let TerminalConfig {
            streams,
            system,
            attributes,
            size,
            signal_handler,
            ..
        } = self.config;

        debug!(
            "Negotiating terminal on {} (type {}, charset {})",
            os_class, settings.term_type, settings.charset
        );

        let terminal = if system.unwrap_or(streams.is_none()) {
            if attributes.is_some() || size.is_some() {
                warn!("Attributes and size fields are ignored when creating a system terminal");
            }
            negotiate_system(&settings, os_class, &self.registry, signal_handler)?
        } else {
            negotiate_external(&settings, &self.registry, streams, attributes, size, signal_handler)
        };

        debug!("Using {}", terminal.kind());
        if let Some(pty) = terminal.pty_name() {
            debug!("Using pty {}", pty);
        }
        Ok(terminal)
    }
}

fn negotiate_system(
    settings: &EffectiveSettings,
    os_class: OsClass,
    registry: &ProviderRegistry,
    handler: SignalHandler,
) -> Result<TerminalHandle, NegotiationError> {
    let request = SystemRequest {
        os_class,
        codepage: settings.codepage,
    };
    let mut attempts = Vec::new();

    for family in system_candidates(os_class, settings) {
        match registry.lookup(family).and_then(|p| p.current(&request)) {
            Ok(pty) => {
                let term_type = system_term_type(os_class, family, settings);
                return Ok(TerminalHandle::new(
                    TerminalKind::System(family),
                    settings,
                    term_type,
                    Some(pty),
                    TerminalHandle::process_streams(),
                    handler,
                ));
            }
            Err(cause) => {
                debug!("Error creating {} based terminal: {}", family, cause);
                attempts.push(BackendAttempt { family, cause });
            }
        }
    }

    let error = NegotiationError::NoUsableTerminal { attempts };
    match settings.dumb {
        Some(false) => Err(error),
        requested => {
            if requested.is_none() {
                if tracing::enabled!(Level::DEBUG) {
                    warn!("Creating a dumb terminal: {}", error);
                } else {
                    warn!("Unable to create a system terminal, creating a dumb terminal (enable debug logging for more information)");
                }
            }
            Ok(TerminalHandle::new(
                TerminalKind::Dumb,
                settings,
                settings.term_type.clone(),
                None,
                TerminalHandle::process_streams(),
                handler,
            ))
        }
    }
}

fn negotiate_external(
    settings: &EffectiveSettings,
    registry: &ProviderRegistry,
    streams: Option<Streams>,
    attributes: Option<Attributes>,
    size: Option<Size>,
    handler: SignalHandler,
) -> TerminalHandle {
    let streams = streams.unwrap_or_else(TerminalHandle::process_streams);

    for family in external_candidates(settings) {
        match registry.lookup(family).and_then(|p| p.open(attributes.as_ref(), size)) {
            Ok(mut pty) => {
                let streams = pty.connect(streams);
                return TerminalHandle::new(
                    TerminalKind::Pty(family),
                    settings,
                    settings.term_type.clone(),
                    Some(pty),
                    streams,
                    handler,
                );
            }
            Err(cause) => debug!("Error creating {} based terminal: {}", family, cause),
        }
    }

    let mut terminal = TerminalHandle::new(
        TerminalKind::External,
        settings,
        settings.term_type.clone(),
        None,
        streams,
        handler,
    );
    terminal.seed(attributes, size);
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, Origin};
    use crate::core::pty::{Pty, Result as PtyResult};
    use crate::provider::CapabilityProvider;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type CallLog = Arc<Mutex<Vec<(BackendFamily, &'static str)>>>;

    struct FakePty {
        attributes: Attributes,
        size: Size,
    }

    impl Pty for FakePty {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn attributes(&self) -> PtyResult<Attributes> {
            Ok(self.attributes.clone())
        }

        fn set_attributes(&mut self, attributes: &Attributes) -> PtyResult<()> {
            self.attributes = attributes.clone();
            Ok(())
        }

        fn size(&self) -> PtyResult<Size> {
            Ok(self.size)
        }

        fn set_size(&mut self, size: Size) -> PtyResult<()> {
            self.size = size;
            Ok(())
        }

        fn close(&mut self) -> PtyResult<()> {
            Ok(())
        }
    }

    struct Scripted {
        family: BackendFamily,
        works: bool,
        log: CallLog,
    }

    impl Scripted {
        fn outcome(&self, call: &'static str, attributes: Option<&Attributes>, size: Option<Size>) -> PtyResult<Box<dyn Pty>> {
            self.log.lock().unwrap().push((self.family, call));
            if self.works {
                Ok(Box::new(FakePty {
                    attributes: attributes.cloned().unwrap_or_default(),
                    size: size.unwrap_or(Size::new(80, 24)),
                }))
            } else {
                Err(PtyError::NotATerminal)
            }
        }
    }

    impl CapabilityProvider for Scripted {
        fn family(&self) -> BackendFamily {
            self.family
        }

        fn current(&self, _request: &SystemRequest) -> PtyResult<Box<dyn Pty>> {
            self.outcome("current", None, None)
        }

        fn open(&self, attributes: Option<&Attributes>, size: Option<Size>) -> PtyResult<Box<dyn Pty>> {
            self.outcome("open", attributes, size)
        }
    }

    fn registry(outcomes: &[(BackendFamily, bool)], log: &CallLog) -> ProviderRegistry {
        outcomes.iter().fold(ProviderRegistry::new(), |registry, (family, works)| {
            registry.with(Arc::new(Scripted {
                family: *family,
                works: *works,
                log: log.clone(),
            }))
        })
    }

    fn facts(os_class: OsClass) -> PlatformFacts {
        match os_class {
            OsClass::CygwinOrMingw => PlatformFacts {
                cygwin: true,
                mingw: false,
                windows: true,
            },
            OsClass::Windows => PlatformFacts {
                cygwin: false,
                mingw: false,
                windows: true,
            },
            OsClass::PosixOrOther => PlatformFacts::default(),
        }
    }

    fn builder(os_class: OsClass, env: &[(&str, &str)]) -> TerminalBuilder {
        let env: Vec<(String, String)> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        TerminalBuilder::new()
            .named_settings(NamedSettings::new())
            .environment(Environment::from_pairs(env))
            .platform(facts(os_class))
    }

    fn all_fail() -> Vec<(BackendFamily, bool)> {
        vec![
            (BackendFamily::Crossterm, false),
            (BackendFamily::Sys, false),
            (BackendFamily::Exec, false),
        ]
    }

    fn families(error: &NegotiationError) -> Vec<BackendFamily> {
        error.attempts().iter().map(|a| a.family).collect()
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Run `f` with a subscriber at `level` and return what it logged
    fn captured(level: Level, f: impl FnOnce()) -> String {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        buf.text()
    }

    #[test]
    fn test_candidate_table() {
        let settings = builder(OsClass::PosixOrOther, &[]).settings();
        assert_eq!(system_candidates(OsClass::CygwinOrMingw, &settings), vec![BackendFamily::Exec]);
        assert_eq!(
            system_candidates(OsClass::Windows, &settings),
            vec![BackendFamily::Crossterm, BackendFamily::Sys]
        );
        assert_eq!(
            system_candidates(OsClass::PosixOrOther, &settings),
            vec![BackendFamily::Crossterm, BackendFamily::Sys, BackendFamily::Exec]
        );
        assert_eq!(
            external_candidates(&settings),
            vec![BackendFamily::Crossterm, BackendFamily::Sys]
        );
    }

    #[test]
    fn test_candidates_respect_flags() {
        let settings = builder(OsClass::PosixOrOther, &[("TERMHOST_CROSSTERM", "false")])
            .exec(false)
            .settings();
        assert_eq!(system_candidates(OsClass::PosixOrOther, &settings), vec![BackendFamily::Sys]);
        assert!(system_candidates(OsClass::CygwinOrMingw, &settings).is_empty());
        assert_eq!(external_candidates(&settings), vec![BackendFamily::Sys]);
    }

    #[test]
    fn test_all_fail_without_fallback() {
        let log = CallLog::default();
        let error = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&all_fail(), &log))
            .dumb(false)
            .build()
            .unwrap_err();

        assert_eq!(
            families(&error),
            vec![BackendFamily::Crossterm, BackendFamily::Sys, BackendFamily::Exec]
        );
        assert!(error
            .attempts()
            .iter()
            .all(|a| matches!(a.cause, PtyError::NotATerminal)));
        let message = error.to_string();
        assert!(message.contains("crossterm: Not a terminal device"));
        assert!(message.contains("exec: Not a terminal device"));
    }

    #[test]
    fn test_one_cause_per_enabled_candidate() {
        let log = CallLog::default();
        let error = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&all_fail(), &log))
            .sys(false)
            .dumb(false)
            .build()
            .unwrap_err();
        assert_eq!(families(&error), vec![BackendFamily::Crossterm, BackendFamily::Exec]);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_provider_is_an_attempt() {
        let log = CallLog::default();
        let error = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&[(BackendFamily::Exec, false)], &log))
            .dumb(false)
            .build()
            .unwrap_err();

        let attempts = error.attempts();
        assert_eq!(attempts.len(), 3);
        assert!(matches!(attempts[0].cause, PtyError::NoProvider(BackendFamily::Crossterm)));
        assert!(matches!(attempts[1].cause, PtyError::NoProvider(BackendFamily::Sys)));
        assert!(matches!(attempts[2].cause, PtyError::NotATerminal));
    }

    #[test]
    fn test_first_success_wins() {
        let log = CallLog::default();
        let terminal = builder(OsClass::PosixOrOther, &[("TERM", "linux")])
            .registry(registry(
                &[
                    (BackendFamily::Crossterm, false),
                    (BackendFamily::Sys, true),
                    (BackendFamily::Exec, true),
                ],
                &log,
            ))
            .build()
            .unwrap();

        assert_eq!(terminal.kind(), TerminalKind::System(BackendFamily::Sys));
        assert_eq!(terminal.term_type(), "linux");
        assert_eq!(terminal.pty_name(), Some("fake"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![(BackendFamily::Crossterm, "current"), (BackendFamily::Sys, "current")]
        );
    }

    #[test]
    fn test_windows_never_tries_exec() {
        let log = CallLog::default();
        let error = builder(OsClass::Windows, &[])
            .registry(registry(&all_fail(), &log))
            .dumb(false)
            .build()
            .unwrap_err();
        assert_eq!(families(&error), vec![BackendFamily::Crossterm, BackendFamily::Sys]);
    }

    #[test]
    fn test_dumb_fallback() {
        let log = CallLog::default();
        let terminal = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&all_fail(), &log))
            .build()
            .unwrap();
        assert_eq!(terminal.kind(), TerminalKind::Dumb);
        assert_eq!(terminal.term_type(), "dumb");
        assert_eq!(terminal.pty_name(), None);

        let terminal = builder(OsClass::PosixOrOther, &[("TERM", "vt220")])
            .registry(registry(&all_fail(), &log))
            .dumb(true)
            .build()
            .unwrap();
        assert_eq!(terminal.kind(), TerminalKind::Dumb);
        assert_eq!(terminal.term_type(), "vt220");
    }

    #[test]
    fn test_cygwin_xterm_from_environment_is_upgraded() {
        let log = CallLog::default();
        let outcomes = [(BackendFamily::Exec, true)];

        let terminal = builder(OsClass::CygwinOrMingw, &[("TERM", "xterm")])
            .registry(registry(&outcomes, &log))
            .build()
            .unwrap();
        assert_eq!(terminal.kind(), TerminalKind::System(BackendFamily::Exec));
        assert_eq!(terminal.term_type(), TYPE_XTERM_256COLOR);

        let terminal = builder(OsClass::CygwinOrMingw, &[("TERM", "xterm")])
            .registry(registry(&outcomes, &log))
            .term_type("xterm")
            .build()
            .unwrap();
        assert_eq!(terminal.term_type(), TYPE_XTERM);

        let terminal = builder(OsClass::CygwinOrMingw, &[("TERM", "xterm")])
            .named_settings(NamedSettings::new().with(keys::TYPE, "xterm"))
            .registry(registry(&outcomes, &log))
            .build()
            .unwrap();
        assert_eq!(terminal.term_type(), TYPE_XTERM);
    }

    #[test]
    fn test_padded_xterm_from_environment_is_upgraded() {
        let log = CallLog::default();
        let terminal = builder(OsClass::CygwinOrMingw, &[("TERM", " xterm ")])
            .registry(registry(&[(BackendFamily::Exec, true)], &log))
            .build()
            .unwrap();
        assert_eq!(terminal.term_type(), TYPE_XTERM_256COLOR);
    }

    #[test]
    fn test_upgrade_only_for_cygwin_exec() {
        let settings = builder(OsClass::PosixOrOther, &[("TERM", "xterm")]).settings();
        assert_eq!(settings.type_origin, Origin::Environment);
        assert_eq!(
            system_term_type(OsClass::PosixOrOther, BackendFamily::Exec, &settings),
            TYPE_XTERM
        );
        assert_eq!(
            system_term_type(OsClass::CygwinOrMingw, BackendFamily::Exec, &settings),
            TYPE_XTERM_256COLOR
        );

        let settings = builder(OsClass::CygwinOrMingw, &[("TERM", "xterm-color")]).settings();
        assert_eq!(
            system_term_type(OsClass::CygwinOrMingw, BackendFamily::Exec, &settings),
            "xterm-color"
        );
    }

    #[test]
    fn test_external_falls_back_to_wrapper() {
        let log = CallLog::default();
        let mut attributes = Attributes::default();
        attributes.local.remove(crate::core::attributes::LocalFlags::ECHO);

        let mut terminal = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&all_fail(), &log))
            .streams(io::Cursor::new(b"hi".to_vec()), io::sink())
            .attributes(attributes.clone())
            .size(Size::new(120, 40))
            .build()
            .unwrap();

        assert_eq!(terminal.kind(), TerminalKind::External);
        assert_eq!(terminal.attributes().unwrap(), attributes);
        assert_eq!(terminal.size().unwrap(), Size::new(120, 40));
        assert_eq!(terminal.read_unit().unwrap(), Some(u16::from(b'h')));
        assert_eq!(
            *log.lock().unwrap(),
            vec![(BackendFamily::Crossterm, "open"), (BackendFamily::Sys, "open")]
        );
    }

    #[test]
    fn test_external_uses_opened_pty() {
        let log = CallLog::default();
        let terminal = builder(OsClass::PosixOrOther, &[])
            .registry(registry(
                &[(BackendFamily::Crossterm, false), (BackendFamily::Sys, true)],
                &log,
            ))
            .streams(io::empty(), io::sink())
            .size(Size::new(90, 30))
            .build()
            .unwrap();

        assert_eq!(terminal.kind(), TerminalKind::Pty(BackendFamily::Sys));
        assert_eq!(terminal.size().unwrap(), Size::new(90, 30));
    }

    #[test]
    fn test_system_false_without_streams_is_external() {
        let log = CallLog::default();
        let terminal = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&[], &log))
            .system(false)
            .build()
            .unwrap();
        assert_eq!(terminal.kind(), TerminalKind::External);
    }

    #[test]
    fn test_system_true_ignores_streams_and_size() {
        let log = CallLog::default();
        let terminal = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&[(BackendFamily::Crossterm, true)], &log))
            .streams(io::empty(), io::sink())
            .system(true)
            .size(Size::new(10, 10))
            .build()
            .unwrap();

        assert_eq!(terminal.kind(), TerminalKind::System(BackendFamily::Crossterm));
        assert_eq!(terminal.size().unwrap(), Size::new(80, 24));
    }

    #[test]
    fn test_no_enabled_backend() {
        let log = CallLog::default();
        let error = builder(OsClass::PosixOrOther, &[])
            .registry(registry(&all_fail(), &log))
            .crossterm(false)
            .sys(false)
            .exec(false)
            .dumb(false)
            .build()
            .unwrap_err();
        assert!(error.attempts().is_empty());
        assert!(error.to_string().contains("no backend enabled"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_system_terminal_warns_about_ignored_size() {
        let log = CallLog::default();
        let logged = captured(Level::INFO, || {
            builder(OsClass::PosixOrOther, &[])
                .registry(registry(&[(BackendFamily::Crossterm, true)], &log))
                .system(true)
                .size(Size::new(10, 10))
                .build()
                .unwrap();
        });
        assert!(logged.contains("Attributes and size fields are ignored"));

        let logged = captured(Level::INFO, || {
            builder(OsClass::PosixOrOther, &[])
                .registry(registry(&[(BackendFamily::Crossterm, true)], &log))
                .build()
                .unwrap();
        });
        assert!(!logged.contains("ignored"));
    }

    #[test]
    fn test_dumb_fallback_warning_lists_causes_at_debug() {
        let log = CallLog::default();
        let logged = captured(Level::DEBUG, || {
            let terminal = builder(OsClass::PosixOrOther, &[])
                .registry(registry(&all_fail(), &log))
                .build()
                .unwrap();
            assert_eq!(terminal.kind(), TerminalKind::Dumb);
        });
        assert!(logged.contains("WARN"));
        assert!(logged.contains("Creating a dumb terminal"));
        assert!(logged.contains("crossterm: Not a terminal device"));
        assert!(logged.contains("exec: Not a terminal device"));
    }

    #[test]
    fn test_dumb_fallback_warning_is_terse_above_debug() {
        let log = CallLog::default();
        let logged = captured(Level::INFO, || {
            builder(OsClass::PosixOrOther, &[])
                .registry(registry(&all_fail(), &log))
                .build()
                .unwrap();
        });
        assert!(logged.contains("WARN"));
        assert!(logged.contains("enable debug logging"));
        assert!(!logged.contains("Not a terminal device"));
    }

    #[test]
    fn test_requested_dumb_fallback_is_silent() {
        let log = CallLog::default();
        let logged = captured(Level::INFO, || {
            let terminal = builder(OsClass::PosixOrOther, &[])
                .registry(registry(&all_fail(), &log))
                .dumb(true)
                .build()
                .unwrap();
            assert_eq!(terminal.kind(), TerminalKind::Dumb);
        });
        assert!(!logged.contains("WARN"));
        assert!(!logged.contains("dumb terminal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_streams_go_through_opened_pty() {
        let output = SharedBuf::default();
        let mut terminal = builder(OsClass::PosixOrOther, &[])
            .registry(ProviderRegistry::new().with(Arc::new(crate::backend::sys::SysProvider)))
            .streams(io::Cursor::new(b"hi\n".to_vec()), output.clone())
            .build()
            .unwrap();
        if terminal.kind() != TerminalKind::Pty(BackendFamily::Sys) {
            // No pty devices available
            return;
        }

        terminal.write_str("x\n").unwrap();
        terminal.flush().unwrap();
        let mut translated = false;
        for _ in 0..200 {
            if output.text().contains("x\r\n") {
                translated = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(translated, "output was {:?}", output.text());
        assert_eq!(terminal.read_unit().unwrap(), Some(u16::from(b'h')));
    }
}
