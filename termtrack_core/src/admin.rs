//! Text control channel: tabular listing and one-line commands.
//!
//! Writes follow "accept and log" semantics. A malformed or unknown command
//! is logged and still reported as consumed; the caller never sees an error.

use crate::constants::CMD_MAX_LEN;
use crate::errors::Error;
use crate::types::{MacAddr, TerminalView};
use crate::Registry;
use log::{error, info, warn};
use std::fmt::Write;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Clear,
    Authenticate(MacAddr),
    Deny(MacAddr),
}

/// Parse one control line. Trailing NULs, newlines and blanks are ignored.
pub fn parse_command(line: &str) -> Result<Command, Error> {
    let line = line.trim_end_matches(|c: char| c == '\0' || c.is_ascii_whitespace());
    if line.is_empty() {
        return Err(Error::Malformed("empty command".into()));
    }
    if line.starts_with("clear") {
        return Ok(Command::Clear);
    }

    // split on a char boundary so multibyte input cannot panic
    let (op, rest) = match line.char_indices().nth(1) {
        Some((at, _)) => (&line[..at], &line[at..]),
        None => (line, ""),
    };
    let mac: MacAddr = rest
        .parse()
        .map_err(|_| Error::Malformed(format!("invalid macaddr format: {line}")))?;
    match op {
        "+" => Ok(Command::Authenticate(mac)),
        "-" => Ok(Command::Deny(mac)),
        _ => Err(Error::Malformed(format!("invalid format: {line}"))),
    }
}

/// Apply a parsed command to the registry.
pub fn apply(registry: &Registry, cmd: Command) -> Result<(), Error> {
    match cmd {
        Command::Clear => {
            registry.clear_all();
            Ok(())
        }
        Command::Authenticate(mac) => registry.set_authenticated(&mac, true),
        Command::Deny(mac) => registry.set_authenticated(&mac, false),
    }
}

/// Handle one control write. Input beyond [`CMD_MAX_LEN`] bytes is cut off.
/// Returns the number of bytes consumed; failures only reach the log.
pub fn control_write(registry: &Registry, buf: &[u8]) -> usize {
    if buf.is_empty() {
        warn!("[CTL] empty write ignored");
        return 0;
    }
    let consumed = buf.len().min(CMD_MAX_LEN);
    let line = String::from_utf8_lossy(&buf[..consumed]);

    match parse_command(&line) {
        Ok(cmd) => match apply(registry, cmd) {
            Ok(()) => info!("[CTL] {:?}", cmd),
            Err(e) => warn!("[CTL] {:?}: {}", cmd, e),
        },
        Err(e) => error!("[CTL] {}", e),
    }
    consumed
}

fn write_header(out: &mut String) {
    let _ = writeln!(
        out,
        "{:<17}  {:<16}  {:<16}  {:<16}  {:<14}  {:<7}",
        "MAC", "IP", "Rx", "Tx", "Time", "Authed"
    );
}

fn write_row(out: &mut String, view: &TerminalView) {
    let _ = writeln!(
        out,
        "{}  {:<16}  {:<16}  {:<16}  {:<14}  {:<7}",
        view.mac,
        view.ip.to_string(),
        view.flow.rx,
        view.flow.tx,
        view.age.as_secs(),
        u8::from(view.is_authenticated()),
    );
}

/// Header line plus one row per terminal, all under a single read lock.
pub fn render_listing(registry: &Registry) -> String {
    let mut out = String::new();
    write_header(&mut out);
    for view in registry.enumerate() {
        write_row(&mut out, &view);
    }
    out
}
