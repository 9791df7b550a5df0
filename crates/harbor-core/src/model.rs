//! The terminal model as seen by the engine.

use harbor_vt::{GridPoint, VtTerminal};

/// What the engine needs from a terminal emulator.
///
/// The engine only feeds bytes in and steers scroll and selection; styled
/// rendering reads the concrete model through the tab lock.
pub trait TerminalModel: Send {
    fn write(&mut self, bytes: &[u8]);
    fn resize(&mut self, cols: u16, rows: u16);
    fn is_alt_screen(&self) -> bool;
    /// Monotonic counter bumped whenever content may have changed.
    fn content_version(&self) -> u64;
    fn screen_lines(&self) -> usize;
    fn columns(&self) -> usize;
    fn history_size(&self) -> usize;
    fn display_offset(&self) -> usize;
    /// Scroll the viewport; positive is up into history. Returns lines moved.
    fn scroll_lines(&mut self, delta: i32) -> i32;
    fn set_selection(&mut self, range: Option<(GridPoint, GridPoint)>);
    fn selection_text(&self) -> Option<String>;
    /// Replies the model wants sent back to the process (e.g. cursor reports).
    fn take_pty_writes(&mut self) -> Vec<String>;
    fn title(&self) -> Option<String>;
    fn take_bell(&mut self) -> bool;
}

/// Builds the model for a new tab from its initial size.
pub type ModelFactory = Box<dyn Fn(u16, u16) -> Box<dyn TerminalModel> + Send + Sync>;

/// Factory producing `alacritty_terminal`-backed models.
pub fn vt_factory(scrollback: usize) -> ModelFactory {
    Box::new(move |cols: u16, rows: u16| -> Box<dyn TerminalModel> {
        Box::new(VtTerminal::new(cols, rows, scrollback))
    })
}

impl TerminalModel for VtTerminal {
    fn write(&mut self, bytes: &[u8]) {
        VtTerminal::write(self, bytes);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        VtTerminal::resize(self, cols, rows);
    }

    fn is_alt_screen(&self) -> bool {
        VtTerminal::is_alt_screen(self)
    }

    fn content_version(&self) -> u64 {
        VtTerminal::content_version(self)
    }

    fn screen_lines(&self) -> usize {
        VtTerminal::screen_lines(self)
    }

    fn columns(&self) -> usize {
        VtTerminal::columns(self)
    }

    fn history_size(&self) -> usize {
        VtTerminal::history_size(self)
    }

    fn display_offset(&self) -> usize {
        VtTerminal::display_offset(self)
    }

    fn scroll_lines(&mut self, delta: i32) -> i32 {
        VtTerminal::scroll_lines(self, delta)
    }

    fn set_selection(&mut self, range: Option<(GridPoint, GridPoint)>) {
        VtTerminal::set_selection(self, range);
    }

    fn selection_text(&self) -> Option<String> {
        VtTerminal::selection_text(self)
    }

    fn take_pty_writes(&mut self) -> Vec<String> {
        VtTerminal::take_pty_writes(self)
    }

    fn title(&self) -> Option<String> {
        self.title_owned()
    }

    fn take_bell(&mut self) -> bool {
        self.has_bell()
    }
}
