//! Best-effort copy to the system clipboard.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

pub trait Clipboard: Send {
    fn copy(&mut self, text: &str) -> io::Result<()>;
}

/// Copies through the terminal with an OSC 52 escape sequence, which most
/// terminal emulators (and tmux with `set-clipboard on`) forward to the host.
pub struct Osc52Clipboard<W: Write + Send> {
    out: W,
}

impl Osc52Clipboard<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Clipboard for Osc52Clipboard<W> {
    fn copy(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "\x1b]52;c;{}\x07", STANDARD.encode(text))?;
        self.out.flush()
    }
}

/// Keeps copied strings in memory; clones share the same history.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    copied: Arc<Mutex<Vec<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.copied.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> io::Result<()> {
        self.copied
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "clipboard history poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

/// Copies and logs failures instead of returning them.
pub fn copy_best_effort(clipboard: &mut dyn Clipboard, text: &str) -> bool {
    match clipboard.copy(text) {
        Ok(()) => {
            debug!(text, "copied to clipboard");
            true
        }
        Err(e) => {
            warn!(error = %e, "clipboard copy failed");
            false
        }
    }
}
