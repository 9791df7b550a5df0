//! Where copied selections go.

use std::sync::Mutex;

/// Kept alive for the whole process: on X11 the clipboard owner must stay
/// around to answer paste requests from other applications.
static SYSTEM_CLIPBOARD: Mutex<Option<arboard::Clipboard>> = Mutex::new(None);

pub trait ClipboardSink: Send {
    fn set_text(&mut self, text: &str) -> Result<(), String>;
}

/// The desktop clipboard, opened on first use.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), String> {
        let mut guard = match SYSTEM_CLIPBOARD.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| format!("failed to open clipboard: {e}"))?;
            *guard = Some(clipboard);
        }

        let first = match guard.as_mut() {
            Some(clipboard) => clipboard.set_text(text),
            None => return Err("clipboard unavailable".to_string()),
        };
        if let Err(e) = first {
            // The connection may have gone stale; reopen once.
            log::debug!("clipboard: copy failed ({e}), reopening");
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| format!("failed to reopen clipboard: {e}"))?;
            clipboard
                .set_text(text)
                .map_err(|e| format!("failed to copy to clipboard: {e}"))?;
            *guard = Some(clipboard);
        }

        log::debug!("clipboard: copied {} bytes", text.len());
        Ok(())
    }
}

/// Remembers everything copied. Used where no desktop clipboard exists.
#[derive(Clone, Debug, Default)]
pub struct MemoryClipboard {
    copied: std::sync::Arc<Mutex<Vec<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copied(&self) -> Vec<String> {
        match self.copied.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ClipboardSink for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), String> {
        match self.copied.lock() {
            Ok(mut guard) => guard.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }
        Ok(())
    }
}
