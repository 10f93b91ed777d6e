//! termios backend for Unix

use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::thread;

use nix::errno::Errno;
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{
    self as nix_termios, SetArg, SpecialCharacterIndices as Cc, Termios,
};
use tracing::debug;

use crate::config::Streams;
use crate::core::attributes::{
    Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags, Size,
};
use crate::core::pty::{Pty, PtyError, Result};

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);
nix::ioctl_write_ptr_bad!(tiocswinsz, libc::TIOCSWINSZ, libc::winsize);

const INPUT: &[(InputFlags, nix_termios::InputFlags)] = &[
    (InputFlags::IGNBRK, nix_termios::InputFlags::IGNBRK),
    (InputFlags::BRKINT, nix_termios::InputFlags::BRKINT),
    (InputFlags::IGNPAR, nix_termios::InputFlags::IGNPAR),
    (InputFlags::PARMRK, nix_termios::InputFlags::PARMRK),
    (InputFlags::INPCK, nix_termios::InputFlags::INPCK),
    (InputFlags::ISTRIP, nix_termios::InputFlags::ISTRIP),
    (InputFlags::INLCR, nix_termios::InputFlags::INLCR),
    (InputFlags::IGNCR, nix_termios::InputFlags::IGNCR),
    (InputFlags::ICRNL, nix_termios::InputFlags::ICRNL),
    (InputFlags::IXON, nix_termios::InputFlags::IXON),
    (InputFlags::IXOFF, nix_termios::InputFlags::IXOFF),
    (InputFlags::IXANY, nix_termios::InputFlags::IXANY),
    (InputFlags::IMAXBEL, nix_termios::InputFlags::IMAXBEL),
];

const OUTPUT: &[(OutputFlags, nix_termios::OutputFlags)] = &[
    (OutputFlags::OPOST, nix_termios::OutputFlags::OPOST),
    (OutputFlags::ONLCR, nix_termios::OutputFlags::ONLCR),
    (OutputFlags::OCRNL, nix_termios::OutputFlags::OCRNL),
    (OutputFlags::ONOCR, nix_termios::OutputFlags::ONOCR),
    (OutputFlags::ONLRET, nix_termios::OutputFlags::ONLRET),
];

// IUTF8 only exists on some platforms
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
const NATIVE_IUTF8: Option<nix_termios::InputFlags> = Some(nix_termios::InputFlags::IUTF8);
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
const NATIVE_IUTF8: Option<nix_termios::InputFlags> = None;

// CS8 is handled separately since it is part of the CSIZE mask
const CONTROL: &[(ControlFlags, nix_termios::ControlFlags)] = &[
    (ControlFlags::CSTOPB, nix_termios::ControlFlags::CSTOPB),
    (ControlFlags::CREAD, nix_termios::ControlFlags::CREAD),
    (ControlFlags::PARENB, nix_termios::ControlFlags::PARENB),
    (ControlFlags::PARODD, nix_termios::ControlFlags::PARODD),
    (ControlFlags::HUPCL, nix_termios::ControlFlags::HUPCL),
    (ControlFlags::CLOCAL, nix_termios::ControlFlags::CLOCAL),
];

const LOCAL: &[(LocalFlags, nix_termios::LocalFlags)] = &[
    (LocalFlags::ECHO, nix_termios::LocalFlags::ECHO),
    (LocalFlags::ECHOE, nix_termios::LocalFlags::ECHOE),
    (LocalFlags::ECHOK, nix_termios::LocalFlags::ECHOK),
    (LocalFlags::ECHONL, nix_termios::LocalFlags::ECHONL),
    (LocalFlags::ECHOCTL, nix_termios::LocalFlags::ECHOCTL),
    (LocalFlags::ECHOKE, nix_termios::LocalFlags::ECHOKE),
    (LocalFlags::ICANON, nix_termios::LocalFlags::ICANON),
    (LocalFlags::ISIG, nix_termios::LocalFlags::ISIG),
    (LocalFlags::IEXTEN, nix_termios::LocalFlags::IEXTEN),
    (LocalFlags::NOFLSH, nix_termios::LocalFlags::NOFLSH),
    (LocalFlags::TOSTOP, nix_termios::LocalFlags::TOSTOP),
];

fn cc_index(c: ControlChar) -> usize {
    let index = match c {
        ControlChar::VEof => Cc::VEOF,
        ControlChar::VEol => Cc::VEOL,
        ControlChar::VErase => Cc::VERASE,
        ControlChar::VWerase => Cc::VWERASE,
        ControlChar::VKill => Cc::VKILL,
        ControlChar::VReprint => Cc::VREPRINT,
        ControlChar::VIntr => Cc::VINTR,
        ControlChar::VQuit => Cc::VQUIT,
        ControlChar::VSusp => Cc::VSUSP,
        ControlChar::VStart => Cc::VSTART,
        ControlChar::VStop => Cc::VSTOP,
        ControlChar::VLnext => Cc::VLNEXT,
        ControlChar::VMin => Cc::VMIN,
        ControlChar::VTime => Cc::VTIME,
    };
    index as usize
}

fn to_attributes(t: &Termios) -> Attributes {
    let mut attrs = Attributes::empty();
    for (ours, theirs) in INPUT {
        attrs.input.set(*ours, t.input_flags.contains(*theirs));
    }
    if let Some(iutf8) = NATIVE_IUTF8 {
        attrs.input.set(InputFlags::IUTF8, t.input_flags.contains(iutf8));
    }
    for (ours, theirs) in OUTPUT {
        attrs.output.set(*ours, t.output_flags.contains(*theirs));
    }
    for (ours, theirs) in CONTROL {
        attrs.control.set(*ours, t.control_flags.contains(*theirs));
    }
    attrs.control.set(
        ControlFlags::CS8,
        t.control_flags & nix_termios::ControlFlags::CSIZE == nix_termios::ControlFlags::CS8,
    );
    for (ours, theirs) in LOCAL {
        attrs.local.set(*ours, t.local_flags.contains(*theirs));
    }
    for c in ControlChar::ALL {
        attrs.set_control_char(c, t.control_chars[cc_index(c)]);
    }
    attrs
}

/// Overwrite the mapped parts of `t`; anything unmapped is left alone
fn apply(attrs: &Attributes, t: &mut Termios) {
    for (ours, theirs) in INPUT {
        t.input_flags.set(*theirs, attrs.input.contains(*ours));
    }
    if let Some(iutf8) = NATIVE_IUTF8 {
        t.input_flags.set(iutf8, attrs.input.contains(InputFlags::IUTF8));
    }
    for (ours, theirs) in OUTPUT {
        t.output_flags.set(*theirs, attrs.output.contains(*ours));
    }
    for (ours, theirs) in CONTROL {
        t.control_flags.set(*theirs, attrs.control.contains(*ours));
    }
    // Other character sizes are not modelled: only a change to or from CS8
    // touches CSIZE, and leaving CS8 selects CS7
    let csize = t.control_flags & nix_termios::ControlFlags::CSIZE;
    let size = if attrs.control.contains(ControlFlags::CS8) {
        Some(nix_termios::ControlFlags::CS8)
    } else if csize == nix_termios::ControlFlags::CS8 {
        Some(nix_termios::ControlFlags::CS7)
    } else {
        None
    };
    if let Some(size) = size {
        t.control_flags.remove(nix_termios::ControlFlags::CSIZE);
        t.control_flags.insert(size);
    }
    for (ours, theirs) in LOCAL {
        t.local_flags.set(*theirs, attrs.local.contains(*ours));
    }
    for (c, value) in attrs.control_chars() {
        t.control_chars[cc_index(c)] = value;
    }
}

fn os_error(errno: Errno) -> PtyError {
    if errno == Errno::ENOTTY {
        PtyError::NotATerminal
    } else {
        PtyError::Io(io::Error::from(errno))
    }
}

fn winsize(size: Size) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.columns,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Copy bytes until either side closes
fn pump(mut from: impl Read, mut to: impl Write) {
    let mut buffer = [0u8; 4096];
    loop {
        match from.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if to.write_all(&buffer[..n]).and_then(|_| to.flush()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // EIO once every slave descriptor is closed
            Err(_) => break,
        }
    }
}

/// Descriptors of an opened pty, duplicated up front so that connecting
/// cannot fail halfway
struct PumpEnds {
    master_reader: File,
    master_writer: File,
    slave_reader: File,
    slave_writer: File,
}

impl PumpEnds {
    fn new(master: OwnedFd, slave: &OwnedFd) -> Result<Self> {
        Ok(Self {
            master_writer: File::from(master.try_clone()?),
            master_reader: File::from(master),
            slave_reader: File::from(slave.try_clone()?),
            slave_writer: File::from(slave.try_clone()?),
        })
    }
}

/// termios-controlled terminal
pub struct TermiosPty {
    /// The terminal itself: stdin, or the slave side of an opened pty
    fd: OwnedFd,
    /// Master and slave ends of an opened pty, until connected
    ends: Option<PumpEnds>,
    /// Mode to restore on close
    original: Option<Termios>,
    name: &'static str,
}

impl TermiosPty {
    /// Attach to the terminal on stdin
    pub fn current() -> Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(PtyError::NotATerminal);
        }
        let fd = stdin.as_fd().try_clone_to_owned()?;
        let original = nix_termios::tcgetattr(&fd).map_err(os_error)?;
        debug!("termios attached to fd {}", fd.as_raw_fd());

        Ok(Self {
            fd,
            ends: None,
            original: Some(original),
            name: "termios",
        })
    }

    /// Open a new pty pair seeded with the given attributes and size
    pub fn open(attributes: Option<&Attributes>, size: Option<Size>) -> Result<Self> {
        let ws = size.map(winsize);
        let pair = openpty(ws.as_ref(), None::<&Termios>).map_err(os_error)?;

        if let Some(attributes) = attributes {
            let mut t = nix_termios::tcgetattr(&pair.slave).map_err(os_error)?;
            apply(attributes, &mut t);
            nix_termios::tcsetattr(&pair.slave, SetArg::TCSANOW, &t).map_err(os_error)?;
        }
        debug!("opened pty, slave fd {}", pair.slave.as_raw_fd());

        let ends = PumpEnds::new(pair.master, &pair.slave)?;
        Ok(Self {
            fd: pair.slave,
            ends: Some(ends),
            original: None,
            name: "openpty",
        })
    }
}

impl Pty for TermiosPty {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attributes(&self) -> Result<Attributes> {
        let t = nix_termios::tcgetattr(&self.fd).map_err(os_error)?;
        Ok(to_attributes(&t))
    }

    fn set_attributes(&mut self, attributes: &Attributes) -> Result<()> {
        let mut t = nix_termios::tcgetattr(&self.fd).map_err(os_error)?;
        apply(attributes, &mut t);
        nix_termios::tcsetattr(&self.fd, SetArg::TCSANOW, &t).map_err(os_error)
    }

    fn size(&self) -> Result<Size> {
        let mut ws = winsize(Size::default());
        // SAFETY: fd is open for the lifetime of self and ws is a valid winsize
        unsafe { tiocgwinsz(self.fd.as_raw_fd(), &mut ws) }.map_err(os_error)?;
        Ok(Size::new(ws.ws_col, ws.ws_row))
    }

    fn set_size(&mut self, size: Size) -> Result<()> {
        let ws = winsize(size);
        // SAFETY: as above
        unsafe { tiocswinsz(self.fd.as_raw_fd(), &ws) }.map_err(os_error)?;
        Ok(())
    }

    fn connect(&mut self, streams: Streams) -> Streams {
        let Some(ends) = self.ends.take() else {
            return streams;
        };
        let Streams { input, output } = streams;
        let PumpEnds {
            master_reader,
            master_writer,
            slave_reader,
            slave_writer,
        } = ends;

        // Caller input feeds the master, the line discipline output goes back
        // to the caller. Both threads end when their source closes.
        thread::spawn(move || pump(input, master_writer));
        thread::spawn(move || pump(master_reader, output));
        debug!("pumping caller streams through pty master");

        Streams {
            input: Box::new(slave_reader),
            output: Box::new(slave_writer),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(original) = self.original.take() {
            nix_termios::tcsetattr(&self.fd, SetArg::TCSANOW, &original).map_err(os_error)?;
        }
        Ok(())
    }
}
