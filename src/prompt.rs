//! Hidden password entry on the controlling terminal.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// What a key press did to the line being typed.
#[derive(Debug, PartialEq, Eq)]
enum Entry {
    Editing,
    Done,
    Cancelled,
}

/// Leaves raw mode however the prompt ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Print `label` and read a line from the terminal without echoing it.
///
/// # Errors
///
/// Returns an error if the terminal cannot be switched to raw mode, if
/// reading a key fails, or with [`io::ErrorKind::Interrupted`] when the user
/// presses Ctrl+C or Esc.
pub fn read_password(label: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{label}")?;
    stderr.flush()?;

    let mut line = String::new();
    let outcome = {
        let _raw = RawModeGuard::enable()?;
        loop {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match apply_key(&mut line, key.code, key.modifiers) {
                    Entry::Editing => {}
                    done => break done,
                }
            }
        }
    };
    write!(stderr, "\r\n")?;

    match outcome {
        Entry::Cancelled => Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "password entry cancelled",
        )),
        _ => Ok(line),
    }
}

fn apply_key(line: &mut String, code: KeyCode, modifiers: KeyModifiers) -> Entry {
    match code {
        KeyCode::Enter => Entry::Done,
        KeyCode::Esc => Entry::Cancelled,
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Entry::Cancelled,
        KeyCode::Char(c) => {
            line.push(c);
            Entry::Editing
        }
        KeyCode::Backspace => {
            line.pop();
            Entry::Editing
        }
        _ => Entry::Editing,
    }
}
