//! `stty` subprocess backend
//!
//! Every operation shells out to `stty` with the controlling terminal on
//! stdin. Slow, but it works anywhere a POSIX userland exists, which under
//! Cygwin and MSYS2 is the only reliable way to reach the pty.

use std::process::{Command, Stdio};

use tracing::{debug, trace};

use crate::core::attributes::{
    Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags, Size,
};
use crate::core::pty::{Pty, PtyError, Result};
use crate::provider::{BackendFamily, CapabilityProvider, SystemRequest};

const DEFAULT_STTY: &str = "stty";

#[derive(Debug, Clone)]
pub struct ExecProvider {
    stty: String,
}

impl Default for ExecProvider {
    fn default() -> Self {
        Self::new(DEFAULT_STTY)
    }
}

impl ExecProvider {
    /// Provider running the given `stty` executable
    pub fn new(stty: impl Into<String>) -> Self {
        Self { stty: stty.into() }
    }
}

impl CapabilityProvider for ExecProvider {
    fn family(&self) -> BackendFamily {
        BackendFamily::Exec
    }

    fn current(&self, _request: &SystemRequest) -> Result<Box<dyn Pty>> {
        let saved = match run(&self.stty, &["-g"]) {
            Ok(saved) => saved.trim().to_string(),
            // stty exits non-zero when stdin is not a tty
            Err(PtyError::Command { .. }) => return Err(PtyError::NotATerminal),
            Err(e) => return Err(e),
        };
        debug!("stty saved state: {}", saved);

        Ok(Box::new(ExecPty {
            stty: self.stty.clone(),
            saved: Some(saved),
        }))
    }

    fn open(&self, _attributes: Option<&Attributes>, _size: Option<Size>) -> Result<Box<dyn Pty>> {
        Err(PtyError::Unsupported("stty cannot open a new pseudo-terminal"))
    }
}

fn run(stty: &str, args: &[&str]) -> Result<String> {
    trace!("{} {}", stty, args.join(" "));
    let output = Command::new(stty)
        .args(args)
        .stdin(Stdio::inherit())
        .output()?;

    if !output.status.success() {
        return Err(PtyError::Command {
            command: format!("{} {}", stty, args.join(" ")),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub struct ExecPty {
    stty: String,
    /// `stty -g` output captured at acquisition
    saved: Option<String>,
}

impl Pty for ExecPty {
    fn name(&self) -> &'static str {
        "stty"
    }

    fn attributes(&self) -> Result<Attributes> {
        let out = run(&self.stty, &["-a"])?;
        Ok(parse_stty(&out))
    }

    fn set_attributes(&mut self, attributes: &Attributes) -> Result<()> {
        let args = stty_args(attributes);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run(&self.stty, &args)?;
        Ok(())
    }

    fn size(&self) -> Result<Size> {
        let out = run(&self.stty, &["size"])?;
        parse_size(&out)
    }

    fn set_size(&mut self, size: Size) -> Result<()> {
        let rows = size.rows.to_string();
        let columns = size.columns.to_string();
        run(&self.stty, &["rows", &rows, "columns", &columns])?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(saved) = self.saved.take() {
            run(&self.stty, &[&saved])?;
        }
        Ok(())
    }
}

/// Parse `stty -a` output. Handles both the GNU layout and the BSD layout
/// with `lflags:`/`cchars:` line prefixes. Unknown tokens are ignored.
pub(crate) fn parse_stty(output: &str) -> Attributes {
    let mut attrs = Attributes::empty();

    for line in output.lines() {
        let line = strip_section(line.trim());
        for segment in line.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if let Some((name, value)) = segment.split_once('=') {
                let name = name.trim();
                if let Some(c) = ControlChar::from_stty_name(name) {
                    match parse_control_value(c, value.trim()) {
                        Some(v) => attrs.set_control_char(c, v),
                        None => attrs.clear_control_char(c),
                    }
                }
                continue;
            }
            for token in segment.split_whitespace() {
                apply_flag(&mut attrs, token);
            }
        }
    }
    attrs
}

fn strip_section(line: &str) -> &str {
    match line.split_once(':') {
        Some((label, rest)) if !label.contains(' ') && label.ends_with('s') => rest,
        _ => line,
    }
}

fn apply_flag(attrs: &mut Attributes, token: &str) {
    let (on, name) = match token.strip_prefix('-') {
        Some(name) => (false, name),
        None => (true, token),
    };
    let name = name.to_ascii_uppercase();

    if let Some(f) = InputFlags::from_name(&name) {
        attrs.input.set(f, on);
    } else if let Some(f) = OutputFlags::from_name(&name) {
        attrs.output.set(f, on);
    } else if let Some(f) = ControlFlags::from_name(&name) {
        attrs.control.set(f, on);
    } else if let Some(f) = LocalFlags::from_name(&name) {
        attrs.local.set(f, on);
    }
}

/// `None` means the character is disabled
fn parse_control_value(c: ControlChar, value: &str) -> Option<u8> {
    if c.is_numeric() {
        return value.parse().ok();
    }
    match value {
        "<undef>" | "<undefined>" | "undef" => None,
        "^?" => Some(0x7f),
        _ => {
            let bytes = value.as_bytes();
            match bytes {
                [b'^', ch] => Some(ch.to_ascii_uppercase() ^ 0x40),
                [ch] => Some(*ch),
                _ => None,
            }
        }
    }
}

fn format_control_value(c: ControlChar, value: u8) -> String {
    if c.is_numeric() {
        return value.to_string();
    }
    match value {
        0 => "undef".to_string(),
        0x7f => "^?".to_string(),
        v if v < 0x20 => format!("^{}", (v ^ 0x40) as char),
        v => (v as char).to_string(),
    }
}

fn push_flags<F: bitflags::Flags>(args: &mut Vec<String>, current: F) {
    for (name, flag) in F::all().iter_names() {
        let name = name.to_ascii_lowercase();
        if current.contains(flag) {
            args.push(name);
        } else {
            args.push(format!("-{}", name));
        }
    }
}

/// Arguments that make `stty` apply `attrs`
pub(crate) fn stty_args(attrs: &Attributes) -> Vec<String> {
    let mut args = Vec::new();
    push_flags(&mut args, attrs.input);
    push_flags(&mut args, attrs.output);
    push_flags(&mut args, attrs.local);

    let mut control = attrs.control;
    // "-cs8" is not something stty understands
    if !control.contains(ControlFlags::CS8) {
        control.insert(ControlFlags::CS8);
        push_flags(&mut args, control);
        args.retain(|a| a != "cs8");
    } else {
        push_flags(&mut args, control);
    }

    for (c, value) in attrs.control_chars() {
        args.push(c.stty_name().to_string());
        args.push(format_control_value(c, value));
    }
    args
}

fn parse_size(output: &str) -> Result<Size> {
    let mut fields = output.split_whitespace().map(str::parse::<u16>);
    match (fields.next(), fields.next()) {
        (Some(Ok(rows)), Some(Ok(columns))) => Ok(Size::new(columns, rows)),
        _ => Err(PtyError::Parse(format!("unexpected `stty size` output: {:?}", output.trim()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GNU: &str = "\
speed 38400 baud; rows 24; columns 80; line = 0;
intr = ^C; quit = ^\\; erase = ^?; kill = ^U; eof = ^D; eol = <undef>; eol2 = <undef>; swtch = <undef>; start = ^Q; stop = ^S; susp = ^Z; rprnt = ^R; werase = ^W; lnext = ^V; discard = ^O; min = 1; time = 0;
-parenb -parodd -cmspar cs8 -hupcl -cstopb cread -clocal -crtscts
-ignbrk -brkint -ignpar -parmrk -inpck -istrip -inlcr -igncr icrnl ixon -ixoff -iuclc -ixany -imaxbel iutf8
opost -olcuc -ocrnl onlcr -onocr -onlret -ofill -ofdel nl0 cr0 tab0 bs0 vt0 ff0
isig icanon iexten echo echoe echok -echonl -noflsh -xcase -tostop -echoprt echoctl echoke -flusho -extproc
";

    const BSD: &str = "\
speed 9600 baud; 24 rows; 80 columns;
lflags: -icanon isig iexten -echo echoe -echok echoke -echonl echoctl
\t-echoprt -altwerase -noflsh -tostop -flusho pendin -nokerninfo
\t-extproc
iflags: -istrip icrnl -inlcr -igncr ixon -ixoff ixany imaxbel iutf8
\t-ignbrk brkint -inpck -ignpar -parmrk
oflags: opost onlcr -oxtabs -onocr -onlret
cflags: cread cs8 -parenb -parodd hupcl -clocal -cstopb -crtscts -dsrflow
\t-dtrflow -mdmbuf
cchars: discard = ^O; dsusp = ^Y; eof = ^D; eol = <undefined>;
\teol2 = <undefined>; erase = ^?; intr = ^C; kill = ^U; lnext = ^V;
\tmin = 1; quit = ^\\; reprint = ^R; start = ^Q; status = ^T;
\tstop = ^S; susp = ^Z; time = 0; werase = ^W;
";

    #[test]
    fn test_parse_gnu() {
        let attrs = parse_stty(GNU);
        assert_eq!(attrs.local, Attributes::default().local);
        assert!(attrs.input.contains(InputFlags::ICRNL | InputFlags::IXON | InputFlags::IUTF8));
        assert!(!attrs.input.contains(InputFlags::IXANY));
        assert!(attrs.output.contains(OutputFlags::OPOST | OutputFlags::ONLCR));
        assert!(attrs.control.contains(ControlFlags::CS8 | ControlFlags::CREAD));
        assert!(!attrs.control.contains(ControlFlags::HUPCL));

        assert_eq!(attrs.control_char(ControlChar::VIntr), Some(0x03));
        assert_eq!(attrs.control_char(ControlChar::VQuit), Some(0x1c));
        assert_eq!(attrs.control_char(ControlChar::VErase), Some(0x7f));
        assert_eq!(attrs.control_char(ControlChar::VReprint), Some(0x12));
        assert_eq!(attrs.control_char(ControlChar::VEol), None);
        assert_eq!(attrs.control_char(ControlChar::VMin), Some(1));
        assert_eq!(attrs.control_char(ControlChar::VTime), Some(0));
        assert!(!attrs.is_raw());
    }

    #[test]
    fn test_parse_bsd() {
        let attrs = parse_stty(BSD);
        assert!(attrs.is_raw());
        assert!(attrs.local.contains(LocalFlags::ISIG | LocalFlags::ECHOCTL));
        assert!(attrs.input.contains(InputFlags::IXANY | InputFlags::IMAXBEL | InputFlags::BRKINT));
        assert!(attrs.control.contains(ControlFlags::HUPCL | ControlFlags::CS8));
        assert_eq!(attrs.control_char(ControlChar::VReprint), Some(0x12));
        assert_eq!(attrs.control_char(ControlChar::VWerase), Some(0x17));
        assert_eq!(attrs.control_char(ControlChar::VEol), None);
    }

    #[test]
    fn test_args_round_trip_through_parser() {
        let attrs = Attributes::default().raw();
        let args = stty_args(&attrs);
        assert!(args.contains(&"-icanon".to_string()));
        assert!(args.contains(&"-echo".to_string()));
        assert!(args.contains(&"cs8".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "intr" && w[1] == "^C"));
        assert!(args.windows(2).any(|w| w[0] == "erase" && w[1] == "^?"));
        assert!(args.windows(2).any(|w| w[0] == "min" && w[1] == "1"));

        // stty -a prints flags one per token, so the args parse back as-is
        let flags: Vec<&str> = args
            .iter()
            .map(String::as_str)
            .filter(|a| a.trim_start_matches('-').chars().all(|c| c.is_ascii_alphanumeric()))
            .filter(|a| ControlChar::from_stty_name(a).is_none())
            .collect();
        let reparsed = parse_stty(&flags.join(" "));
        assert_eq!(reparsed.input, attrs.input);
        assert_eq!(reparsed.output, attrs.output);
        assert_eq!(reparsed.local, attrs.local);
        assert_eq!(reparsed.control, attrs.control);
    }

    #[test]
    fn test_cs8_never_negated() {
        let mut attrs = Attributes::empty();
        attrs.control = ControlFlags::CREAD;
        let args = stty_args(&attrs);
        assert!(!args.iter().any(|a| a == "-cs8" || a == "cs8"));
        assert!(args.contains(&"cread".to_string()));
    }

    #[test]
    fn test_control_values() {
        assert_eq!(parse_control_value(ControlChar::VIntr, "^c"), Some(0x03));
        assert_eq!(parse_control_value(ControlChar::VIntr, "<undef>"), None);
        assert_eq!(parse_control_value(ControlChar::VTime, "5"), Some(5));
        assert_eq!(format_control_value(ControlChar::VQuit, 0x1c), "^\\");
        assert_eq!(format_control_value(ControlChar::VEof, 0), "undef");
        assert_eq!(format_control_value(ControlChar::VMin, 0), "0");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("24 80\n").unwrap(), Size::new(80, 24));
        assert!(matches!(parse_size("garbage"), Err(PtyError::Parse(_))));
    }

    #[test]
    fn test_missing_stty_binary() {
        let provider = ExecProvider::new("/nonexistent/stty-binary");
        let request = SystemRequest {
            os_class: crate::platform::OsClass::PosixOrOther,
            codepage: None,
        };
        assert!(matches!(provider.current(&request), Err(PtyError::Io(_))));
        assert!(matches!(provider.open(None, None), Err(PtyError::Unsupported(_))));
    }
}
