//! termhost - terminal backend negotiation demo
//!
//! Negotiates a terminal for the current process the same way a library
//! caller would, then echoes every decoded input code unit in hex. Useful
//! to check which backend a given environment ends up with and whether
//! multi-byte input arrives intact.
//!
//! # Quick Start
//!
//! ```text
//! termhost                 # Negotiate, then echo input until q or Ctrl-D
//! termhost --show          # Print the negotiated terminal and exit
//! termhost --no-crossterm  # Skip the crossterm backend
//! ```

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termhost::{Signal, SignalHandler, TerminalBuilder, TerminalHandle};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ctrl-D
const EOT: u16 = 0x04;

/// Ctrl-C, delivered as a signal while in raw mode
const ETX: u16 = 0x03;

/// Command line options
#[derive(Debug, Default)]
struct Options {
    term_type: Option<String>,
    encoding: Option<String>,
    codepage: Option<i32>,
    crossterm: Option<bool>,
    sys: Option<bool>,
    exec: Option<bool>,
    dumb: Option<bool>,
    show: bool,
}

fn print_version() {
    eprintln!("termhost {}", VERSION);
}

fn print_help() {
    eprintln!("termhost {} - terminal backend negotiation demo", VERSION);
    eprintln!();
    eprintln!("Usage: termhost [OPTIONS]");
    eprintln!();
    eprintln!("Terminal options:");
    eprintln!("  --type <TYPE>         Terminal type (default: $TERMHOST_TYPE, $TERM, dumb)");
    eprintln!("  --encoding <NAME>     Input/output encoding (default: from locale, UTF-8)");
    eprintln!("  --codepage <CP>       Windows console codepage");
    eprintln!();
    eprintln!("Backend options:");
    eprintln!("  --no-crossterm        Do not try the crossterm backend");
    eprintln!("  --no-sys              Do not try the native OS backend");
    eprintln!("  --no-exec             Do not try the stty backend");
    eprintln!("  --dumb                Fall back to a dumb terminal silently");
    eprintln!("  --no-dumb             Fail instead of falling back to a dumb terminal");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  --show                Print the negotiated terminal and exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Settings are also read from ~/.termhost/terminal.toml and");
    eprintln!("TERMHOST_* environment variables. Logs go to ~/.termhost/termhost.log;");
    eprintln!("set RUST_LOG=debug for negotiation details.");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--type" => {
                i += 1;
                let value = args.get(i).ok_or("Missing terminal type")?;
                options.term_type = Some(value.clone());
            }
            "--encoding" => {
                i += 1;
                let value = args.get(i).ok_or("Missing encoding")?;
                options.encoding = Some(value.clone());
            }
            "--codepage" => {
                i += 1;
                let value = args.get(i).ok_or("Missing codepage")?;
                let codepage = value
                    .parse()
                    .map_err(|_| format!("Invalid codepage: {}", value))?;
                options.codepage = Some(codepage);
            }
            "--no-crossterm" => options.crossterm = Some(false),
            "--no-sys" => options.sys = Some(false),
            "--no-exec" => options.exec = Some(false),
            "--dumb" => options.dumb = Some(true),
            "--no-dumb" => options.dumb = Some(false),
            "--show" => options.show = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn log_path() -> PathBuf {
    let home = env::var_os("USERPROFILE")
        .or_else(|| env::var_os("HOME"))
        .map(PathBuf::from);

    home.map(|h| h.join(".termhost").join("termhost.log"))
        .unwrap_or_else(|| PathBuf::from("termhost.log"))
}

/// Log to a file; the terminal itself is busy with the demo
fn init_logging() {
    let path = log_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(_) => return,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn builder(options: &Options) -> TerminalBuilder {
    let mut builder = TerminalBuilder::new()
        .name("termhost")
        .signal_handler(SignalHandler::custom(|signal| info!("Received {:?}", signal)));

    if let Some(term_type) = &options.term_type {
        builder = builder.term_type(term_type.clone());
    }
    if let Some(encoding) = &options.encoding {
        builder = builder.encoding(encoding.clone());
    }
    if let Some(codepage) = options.codepage {
        builder = builder.codepage(codepage);
    }
    if let Some(enabled) = options.crossterm {
        builder = builder.crossterm(enabled);
    }
    if let Some(enabled) = options.sys {
        builder = builder.sys(enabled);
    }
    if let Some(enabled) = options.exec {
        builder = builder.exec(enabled);
    }
    if let Some(enabled) = options.dumb {
        builder = builder.dumb(enabled);
    }
    builder
}

fn show(builder: TerminalBuilder) -> anyhow::Result<()> {
    let settings = builder.settings();
    let os_class = builder.os_class();

    println!("os class:     {}", os_class);
    println!("charset:      {}", settings.charset);
    println!("type:         {} ({:?})", settings.term_type, settings.type_origin);
    match settings.codepage {
        Some(cp) => println!("codepage:     {}", cp),
        None => println!("codepage:     (none)"),
    }
    println!(
        "backends:     crossterm={} sys={} exec={} dumb={:?}",
        settings.crossterm, settings.sys, settings.exec, settings.dumb
    );

    let mut terminal = builder.build().context("Terminal negotiation failed")?;
    println!("terminal:     {}", terminal.kind());
    println!("native:       {}", terminal.pty_name().unwrap_or("(none)"));
    println!("reported as:  {}", terminal.term_type());
    match terminal.size() {
        Ok(size) => println!("size:         {}", size),
        Err(e) => println!("size:         unavailable ({})", e),
    }
    terminal.close()?;
    Ok(())
}

fn echo(terminal: &mut TerminalHandle) -> anyhow::Result<()> {
    terminal.write_str("Type to see UTF-16 code units, q or Ctrl-D to quit\r\n")?;
    terminal.flush()?;

    while let Some(unit) = terminal.read_unit()? {
        if unit == u16::from(b'q') || unit == EOT {
            break;
        }
        if unit == ETX {
            terminal.raise(Signal::Int);
        }
        terminal.write_str(&format!("{:04X}\r\n", unit))?;
        terminal.flush()?;
    }
    Ok(())
}

fn run(options: Options) -> anyhow::Result<()> {
    let builder = builder(&options);
    if options.show {
        return show(builder);
    }

    let mut terminal = builder.build().context("Terminal negotiation failed")?;
    info!(
        "Negotiated {} ({}, {})",
        terminal.kind(),
        terminal.term_type(),
        terminal.charset()
    );

    let previous = terminal.enter_raw_mode()?;
    let result = echo(&mut terminal);
    if let Err(e) = terminal.set_attributes(&previous) {
        error!("Failed to restore terminal attributes: {}", e);
    }
    terminal.close()?;
    result
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("termhost {} starting...", VERSION);

    let result = run(options);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
