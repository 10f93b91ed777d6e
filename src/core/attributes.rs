//! Terminal attributes and window size.
//!
//! Attributes follow the termios model (input, output, control and local
//! mode flags plus a table of control characters). Every backend maps its
//! native representation onto this type, so callers can inspect and change
//! modes without knowing which backend was negotiated.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Input mode flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputFlags: u32 {
        const IGNBRK = 1 << 0;
        const BRKINT = 1 << 1;
        const IGNPAR = 1 << 2;
        const PARMRK = 1 << 3;
        const INPCK = 1 << 4;
        const ISTRIP = 1 << 5;
        const INLCR = 1 << 6;
        const IGNCR = 1 << 7;
        const ICRNL = 1 << 8;
        const IXON = 1 << 9;
        const IXOFF = 1 << 10;
        const IXANY = 1 << 11;
        const IMAXBEL = 1 << 12;
        const IUTF8 = 1 << 13;
    }
}

bitflags! {
    /// Output mode flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputFlags: u32 {
        const OPOST = 1 << 0;
        const ONLCR = 1 << 1;
        const OCRNL = 1 << 2;
        const ONOCR = 1 << 3;
        const ONLRET = 1 << 4;
    }
}

bitflags! {
    /// Control mode flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u32 {
        const CS8 = 1 << 0;
        const CSTOPB = 1 << 1;
        const CREAD = 1 << 2;
        const PARENB = 1 << 3;
        const PARODD = 1 << 4;
        const HUPCL = 1 << 5;
        const CLOCAL = 1 << 6;
    }
}

bitflags! {
    /// Local mode flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LocalFlags: u32 {
        const ECHO = 1 << 0;
        const ECHOE = 1 << 1;
        const ECHOK = 1 << 2;
        const ECHONL = 1 << 3;
        const ECHOCTL = 1 << 4;
        const ECHOKE = 1 << 5;
        const ICANON = 1 << 6;
        const ISIG = 1 << 7;
        const IEXTEN = 1 << 8;
        const NOFLSH = 1 << 9;
        const TOSTOP = 1 << 10;
    }
}

/// Special control characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlChar {
    VEof,
    VEol,
    VErase,
    VWerase,
    VKill,
    VReprint,
    VIntr,
    VQuit,
    VSusp,
    VStart,
    VStop,
    VLnext,
    VMin,
    VTime,
}

impl ControlChar {
    pub const ALL: [ControlChar; 14] = [
        ControlChar::VEof,
        ControlChar::VEol,
        ControlChar::VErase,
        ControlChar::VWerase,
        ControlChar::VKill,
        ControlChar::VReprint,
        ControlChar::VIntr,
        ControlChar::VQuit,
        ControlChar::VSusp,
        ControlChar::VStart,
        ControlChar::VStop,
        ControlChar::VLnext,
        ControlChar::VMin,
        ControlChar::VTime,
    ];

    /// Name used by `stty`
    pub fn stty_name(self) -> &'static str {
        match self {
            ControlChar::VEof => "eof",
            ControlChar::VEol => "eol",
            ControlChar::VErase => "erase",
            ControlChar::VWerase => "werase",
            ControlChar::VKill => "kill",
            ControlChar::VReprint => "rprnt",
            ControlChar::VIntr => "intr",
            ControlChar::VQuit => "quit",
            ControlChar::VSusp => "susp",
            ControlChar::VStart => "start",
            ControlChar::VStop => "stop",
            ControlChar::VLnext => "lnext",
            ControlChar::VMin => "min",
            ControlChar::VTime => "time",
        }
    }

    pub fn from_stty_name(name: &str) -> Option<Self> {
        // BSD stty prints "reprint" where GNU prints "rprnt"
        if name == "reprint" {
            return Some(ControlChar::VReprint);
        }
        Self::ALL.iter().copied().find(|c| c.stty_name() == name)
    }

    /// VMIN and VTIME hold counts, not characters
    pub fn is_numeric(self) -> bool {
        matches!(self, ControlChar::VMin | ControlChar::VTime)
    }
}

/// Full set of terminal attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub input: InputFlags,
    pub output: OutputFlags,
    pub control: ControlFlags,
    pub local: LocalFlags,
    control_chars: BTreeMap<ControlChar, u8>,
}

impl Default for Attributes {
    /// Cooked mode, as a freshly opened tty would report it
    fn default() -> Self {
        let mut attrs = Self::empty();
        attrs.input = InputFlags::ICRNL | InputFlags::IXON | InputFlags::IUTF8;
        attrs.output = OutputFlags::OPOST | OutputFlags::ONLCR;
        attrs.control = ControlFlags::CS8 | ControlFlags::CREAD;
        attrs.local = LocalFlags::ECHO
            | LocalFlags::ECHOE
            | LocalFlags::ECHOK
            | LocalFlags::ECHOCTL
            | LocalFlags::ECHOKE
            | LocalFlags::ICANON
            | LocalFlags::ISIG
            | LocalFlags::IEXTEN;
        attrs.set_control_char(ControlChar::VEof, 0x04);
        attrs.set_control_char(ControlChar::VErase, 0x7f);
        attrs.set_control_char(ControlChar::VWerase, 0x17);
        attrs.set_control_char(ControlChar::VKill, 0x15);
        attrs.set_control_char(ControlChar::VReprint, 0x12);
        attrs.set_control_char(ControlChar::VIntr, 0x03);
        attrs.set_control_char(ControlChar::VQuit, 0x1c);
        attrs.set_control_char(ControlChar::VSusp, 0x1a);
        attrs.set_control_char(ControlChar::VStart, 0x11);
        attrs.set_control_char(ControlChar::VStop, 0x13);
        attrs.set_control_char(ControlChar::VLnext, 0x16);
        attrs.set_control_char(ControlChar::VMin, 1);
        attrs.set_control_char(ControlChar::VTime, 0);
        attrs
    }
}

impl Attributes {
    /// Attributes with every flag cleared and no control characters
    pub fn empty() -> Self {
        Self {
            input: InputFlags::empty(),
            output: OutputFlags::empty(),
            control: ControlFlags::empty(),
            local: LocalFlags::empty(),
            control_chars: BTreeMap::new(),
        }
    }

    pub fn control_char(&self, c: ControlChar) -> Option<u8> {
        self.control_chars.get(&c).copied()
    }

    pub fn set_control_char(&mut self, c: ControlChar, value: u8) {
        self.control_chars.insert(c, value);
    }

    pub fn clear_control_char(&mut self, c: ControlChar) {
        self.control_chars.remove(&c);
    }

    pub fn control_chars(&self) -> impl Iterator<Item = (ControlChar, u8)> + '_ {
        self.control_chars.iter().map(|(c, v)| (*c, *v))
    }

    /// True when neither canonical input nor echo is active
    pub fn is_raw(&self) -> bool {
        !self.local.intersects(LocalFlags::ICANON | LocalFlags::ECHO)
    }

    /// Copy of these attributes switched to raw mode (cfmakeraw semantics)
    pub fn raw(&self) -> Self {
        let mut attrs = self.clone();
        attrs.input.remove(
            InputFlags::IGNBRK
                | InputFlags::BRKINT
                | InputFlags::PARMRK
                | InputFlags::ISTRIP
                | InputFlags::INLCR
                | InputFlags::IGNCR
                | InputFlags::ICRNL
                | InputFlags::IXON,
        );
        attrs.output.remove(OutputFlags::OPOST);
        attrs.local.remove(
            LocalFlags::ECHO
                | LocalFlags::ECHONL
                | LocalFlags::ICANON
                | LocalFlags::ISIG
                | LocalFlags::IEXTEN,
        );
        attrs.control.remove(ControlFlags::PARENB);
        attrs.control.insert(ControlFlags::CS8);
        attrs.set_control_char(ControlChar::VMin, 1);
        attrs.set_control_char(ControlChar::VTime, 0);
        attrs
    }
}

/// Terminal window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub columns: u16,
    pub rows: u16,
}

impl Size {
    pub const fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}
