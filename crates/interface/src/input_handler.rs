//! Input Handler - console keyboard input with masked password entry.
//!
//! Keys come from crossterm. Normally the terminal stays in cooked mode and
//! the kernel echoes what is typed. While a password prompt is pending the
//! reader switches to raw mode, so keystrokes reach us without being echoed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How often the reader rechecks the masking state while idle.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Shared switch between the renderer and the input reader.
#[derive(Debug, Clone, Default)]
pub struct MaskedInput(Arc<AtomicBool>);

impl MaskedInput {
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One submitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    Line(String),
    /// Typed while masked; goes to the remote process as-is.
    Secret(String),
    Eof,
}

impl LineInput {
    pub fn is_secret(&self) -> bool {
        matches!(self, LineInput::Secret(_))
    }
}

#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
    masked: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key press. Returns a line once Enter completes it.
    pub fn key(&mut self, key: KeyEvent, masked: bool) -> Option<LineInput> {
        if masked {
            self.masked = true;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.buffer);
                let secret = std::mem::take(&mut self.masked) || masked;
                Some(if secret {
                    LineInput::Secret(text)
                } else {
                    LineInput::Line(text)
                })
            }
            KeyCode::Char('d') if ctrl && self.buffer.is_empty() => Some(LineInput::Eof),
            // Raw mode swallows SIGINT; Ctrl+C abandons the line instead.
            KeyCode::Char('c') if ctrl => {
                self.buffer.clear();
                self.masked = false;
                None
            }
            KeyCode::Char(ch) if !ctrl => {
                self.buffer.push(ch);
                None
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                None
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Blocking reader loop; run it on a blocking thread. Stops at end of input
/// or once the receiving side is dropped.
pub fn read_input(masked: MaskedInput, tx: mpsc::UnboundedSender<LineInput>) {
    let mut editor = LineEditor::new();
    let mut raw = false;

    loop {
        if tx.is_closed() {
            break;
        }
        let want_raw = masked.is_armed();
        if want_raw != raw {
            let switched = if want_raw {
                enable_raw_mode()
            } else {
                disable_raw_mode()
            };
            match switched {
                Ok(()) => {
                    debug!(raw = want_raw, "console input mode switched");
                    raw = want_raw;
                }
                Err(e) => warn!(error = %e, "failed to switch terminal mode"),
            }
        }

        match event::poll(INPUT_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "console input unavailable");
                let _ = tx.send(LineInput::Eof);
                break;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "console input unavailable");
                let _ = tx.send(LineInput::Eof);
                break;
            }
        };

        let Some(input) = editor.key(key, raw) else {
            continue;
        };
        if raw {
            // No echo in raw mode, so end the prompt line ourselves.
            print!("\r\n");
        }
        if input.is_secret() {
            masked.disarm();
        }
        let eof = input == LineInput::Eof;
        if tx.send(input).is_err() || eof {
            break;
        }
    }

    if raw && let Err(e) = disable_raw_mode() {
        warn!(error = %e, "failed to restore terminal mode");
    }
}
