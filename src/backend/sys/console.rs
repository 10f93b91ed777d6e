//! Windows console backend

use tracing::debug;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Console::{
    GetConsoleCP, GetConsoleMode, GetConsoleOutputCP, GetConsoleScreenBufferInfo, GetStdHandle,
    SetConsoleCP, SetConsoleMode, SetConsoleOutputCP, SetConsoleScreenBufferSize, CONSOLE_MODE,
    CONSOLE_SCREEN_BUFFER_INFO, COORD, ENABLE_ECHO_INPUT, ENABLE_LINE_INPUT,
    ENABLE_PROCESSED_INPUT, ENABLE_PROCESSED_OUTPUT, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};

use crate::core::attributes::{Attributes, LocalFlags, OutputFlags, Size};
use crate::core::pty::{Pty, PtyError, Result};

fn os_error(e: windows::core::Error) -> PtyError {
    PtyError::Os(e.to_string())
}

/// Console attached to the process's standard handles
pub struct ConsolePty {
    input: HANDLE,
    output: HANDLE,
    input_mode: CONSOLE_MODE,
    output_mode: CONSOLE_MODE,
    /// (input, output) codepages to restore on close, if we changed them
    codepages: Option<(u32, u32)>,
    closed: bool,
}

// HANDLE is a raw pointer but console handles are process-wide
unsafe impl Send for ConsolePty {}

impl ConsolePty {
    pub fn current(codepage: Option<u32>) -> Result<Self> {
        unsafe {
            let input = GetStdHandle(STD_INPUT_HANDLE).map_err(os_error)?;
            let output = GetStdHandle(STD_OUTPUT_HANDLE).map_err(os_error)?;

            // Redirected handles are not consoles
            let mut input_mode = CONSOLE_MODE(0);
            GetConsoleMode(input, &mut input_mode).map_err(|_| PtyError::NotATerminal)?;
            let mut output_mode = CONSOLE_MODE(0);
            GetConsoleMode(output, &mut output_mode).map_err(|_| PtyError::NotATerminal)?;
            debug!(
                "console modes in=0x{:08X} out=0x{:08X}",
                input_mode.0, output_mode.0
            );

            let codepages = match codepage {
                Some(cp) => {
                    let saved = (GetConsoleCP(), GetConsoleOutputCP());
                    SetConsoleCP(cp).map_err(os_error)?;
                    SetConsoleOutputCP(cp).map_err(os_error)?;
                    debug!("console codepage {} -> {}", saved.1, cp);
                    Some(saved)
                }
                None => None,
            };

            Ok(Self {
                input,
                output,
                input_mode,
                output_mode,
                codepages,
                closed: false,
            })
        }
    }

    fn modes(&self) -> Result<(CONSOLE_MODE, CONSOLE_MODE)> {
        let mut input = CONSOLE_MODE(0);
        let mut output = CONSOLE_MODE(0);
        unsafe {
            GetConsoleMode(self.input, &mut input).map_err(os_error)?;
            GetConsoleMode(self.output, &mut output).map_err(os_error)?;
        }
        Ok((input, output))
    }

    fn buffer_info(&self) -> Result<CONSOLE_SCREEN_BUFFER_INFO> {
        let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
        unsafe { GetConsoleScreenBufferInfo(self.output, &mut info) }.map_err(os_error)?;
        Ok(info)
    }
}

fn toggle(mode: CONSOLE_MODE, bit: CONSOLE_MODE, on: bool) -> CONSOLE_MODE {
    if on {
        CONSOLE_MODE(mode.0 | bit.0)
    } else {
        CONSOLE_MODE(mode.0 & !bit.0)
    }
}

impl Pty for ConsolePty {
    fn name(&self) -> &'static str {
        "console"
    }

    fn attributes(&self) -> Result<Attributes> {
        let (input, output) = self.modes()?;
        let mut attrs = Attributes::default();
        attrs.local.set(LocalFlags::ECHO, input.0 & ENABLE_ECHO_INPUT.0 != 0);
        attrs.local.set(LocalFlags::ICANON, input.0 & ENABLE_LINE_INPUT.0 != 0);
        attrs.local.set(LocalFlags::ISIG, input.0 & ENABLE_PROCESSED_INPUT.0 != 0);
        attrs.output.set(OutputFlags::OPOST, output.0 & ENABLE_PROCESSED_OUTPUT.0 != 0);
        Ok(attrs)
    }

    fn set_attributes(&mut self, attributes: &Attributes) -> Result<()> {
        let (mut input, mut output) = self.modes()?;
        let local = attributes.local;
        input = toggle(input, ENABLE_ECHO_INPUT, local.contains(LocalFlags::ECHO));
        input = toggle(input, ENABLE_LINE_INPUT, local.contains(LocalFlags::ICANON));
        input = toggle(input, ENABLE_PROCESSED_INPUT, local.contains(LocalFlags::ISIG));
        output = toggle(
            output,
            ENABLE_PROCESSED_OUTPUT,
            attributes.output.contains(OutputFlags::OPOST),
        );
        unsafe {
            SetConsoleMode(self.input, input).map_err(os_error)?;
            SetConsoleMode(self.output, output).map_err(os_error)?;
        }
        Ok(())
    }

    fn size(&self) -> Result<Size> {
        let info = self.buffer_info()?;
        let window = info.srWindow;
        let columns = (window.Right - window.Left + 1).max(0) as u16;
        let rows = (window.Bottom - window.Top + 1).max(0) as u16;
        Ok(Size::new(columns, rows))
    }

    fn set_size(&mut self, size: Size) -> Result<()> {
        let coord = COORD {
            X: size.columns.min(i16::MAX as u16) as i16,
            Y: size.rows.min(i16::MAX as u16) as i16,
        };
        unsafe { SetConsoleScreenBufferSize(self.output, coord) }.map_err(os_error)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        unsafe {
            SetConsoleMode(self.input, self.input_mode).map_err(os_error)?;
            SetConsoleMode(self.output, self.output_mode).map_err(os_error)?;
            if let Some((input_cp, output_cp)) = self.codepages.take() {
                SetConsoleCP(input_cp).map_err(os_error)?;
                SetConsoleOutputCP(output_cp).map_err(os_error)?;
            }
        }
        Ok(())
    }
}
