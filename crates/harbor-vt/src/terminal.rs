use std::sync::{Arc, Mutex};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::{Dimensions, Scroll};
use alacritty_terminal::index::{Column, Line, Point, Side};
use alacritty_terminal::selection::{Selection, SelectionType};
use alacritty_terminal::term::{Config, Term, TermDamage, TermMode};
use alacritty_terminal::vte::ansi;

use crate::screen::{CursorState, DamageInfo, DamagedRow, GridPoint, ScreenView};

/// Shared event state captured from the terminal.
#[derive(Default)]
struct EventState {
    title: Option<String>,
    bell: bool,
    pty_writes: Vec<String>,
}

/// Event proxy that captures terminal events.
///
/// Must be `Clone` because `Term` requires `T: EventListener`. Interior
/// mutability goes through `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventProxy {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState::default())),
        }
    }
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            Event::Title(title) => state.title = Some(title),
            Event::ResetTitle => state.title = None,
            Event::Bell => state.bell = true,
            Event::PtyWrite(data) => state.pty_writes.push(data),
            _ => {}
        }
    }
}

/// Dimensions helper for creating / resizing the terminal.
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// The terminal model behind one tab.
///
/// Wraps `alacritty_terminal::Term` and a VTE parser. Every `write` bumps
/// the content version so consumers can tell whether anything changed
/// since they last looked.
pub struct VtTerminal {
    term: Term<EventProxy>,
    parser: ansi::Processor,
    event_proxy: EventProxy,
    version: u64,
}

impl VtTerminal {
    /// Create a new terminal with the given dimensions and scrollback depth.
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        let config = Config {
            scrolling_history: scrollback,
            ..Config::default()
        };

        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };

        let event_proxy = EventProxy::new();
        let term = Term::new(config, &size, event_proxy.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            event_proxy,
            version: 0,
        }
    }

    /// Feed raw PTY output bytes into the terminal.
    pub fn write(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.parser.advance(&mut self.term, bytes);
        self.version = self.version.wrapping_add(1);
    }

    /// Resize the terminal to new dimensions.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };
        self.term.resize(size);
        self.version = self.version.wrapping_add(1);
    }

    /// Monotonic counter bumped whenever the grid content may have changed.
    pub fn content_version(&self) -> u64 {
        self.version
    }

    /// Whether a full-screen program switched to the alternate screen.
    pub fn is_alt_screen(&self) -> bool {
        self.term.mode().contains(TermMode::ALT_SCREEN)
    }

    /// Get a read-only view of the terminal screen.
    pub fn screen(&self) -> ScreenView<'_> {
        ScreenView::new(&self.term)
    }

    pub fn screen_lines(&self) -> usize {
        self.term.screen_lines()
    }

    pub fn columns(&self) -> usize {
        self.term.columns()
    }

    /// Lines of scrollback currently retained above the screen.
    pub fn history_size(&self) -> usize {
        self.term.grid().history_size()
    }

    /// How many lines the viewport is scrolled back from the live screen.
    pub fn display_offset(&self) -> usize {
        self.term.grid().display_offset()
    }

    /// Scroll the viewport. Positive deltas move up into history.
    ///
    /// Returns the number of lines actually scrolled, which is smaller than
    /// `delta` when the top of history or the live screen is reached.
    pub fn scroll_lines(&mut self, delta: i32) -> i32 {
        let before = self.display_offset() as i32;
        self.term.scroll_display(Scroll::Delta(delta));
        let moved = self.display_offset() as i32 - before;
        if moved != 0 {
            self.version = self.version.wrapping_add(1);
        }
        moved
    }

    /// Jump back to the live screen.
    pub fn scroll_to_bottom(&mut self) {
        if self.display_offset() != 0 {
            self.term.scroll_display(Scroll::Bottom);
            self.version = self.version.wrapping_add(1);
        }
    }

    /// Highlight the inclusive range between two grid points, or clear it.
    pub fn set_selection(&mut self, range: Option<(GridPoint, GridPoint)>) {
        self.term.selection = range.map(|(a, b)| {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            let mut selection =
                Selection::new(SelectionType::Simple, self.to_point(start), Side::Left);
            selection.update(self.to_point(end), Side::Right);
            selection
        });
        self.version = self.version.wrapping_add(1);
    }

    /// Text covered by the current selection, if any.
    pub fn selection_text(&self) -> Option<String> {
        self.term.selection_to_string()
    }

    fn to_point(&self, point: GridPoint) -> Point {
        let history = self.history_size() as i32;
        let last_line = self.screen_lines() as i32 - 1;
        let line = (point.line as i32 - history).min(last_line);
        let col = point.col.min(self.columns().saturating_sub(1));
        Point::new(Line(line), Column(col))
    }

    /// Get the current cursor state.
    pub fn cursor(&self) -> CursorState {
        let content = self.term.renderable_content();
        let cursor = &content.cursor;

        CursorState {
            row: cursor.point.line.0.max(0) as u16,
            col: cursor.point.column.0 as u16,
            visible: cursor.shape != ansi::CursorShape::Hidden,
        }
    }

    /// Get the current window title, if set by OSC escape sequences.
    pub fn title_owned(&self) -> Option<String> {
        self.event_proxy
            .state
            .lock()
            .ok()
            .and_then(|state| state.title.clone())
    }

    /// Get damage information since the last reset.
    ///
    /// After using this information for rendering, call `reset_damage()`.
    pub fn damage(&mut self) -> DamageInfo {
        match self.term.damage() {
            TermDamage::Full => DamageInfo::Full,
            TermDamage::Partial(iter) => DamageInfo::Partial(
                iter.map(|d| DamagedRow {
                    row: d.line as u16,
                    left: d.left as u16,
                    right: d.right as u16,
                })
                .collect(),
            ),
        }
    }

    /// Reset damage tracking after rendering.
    pub fn reset_damage(&mut self) {
        self.term.reset_damage();
    }

    /// Drain write-back data produced by the terminal (e.g., device status
    /// responses) that must be sent to the process.
    pub fn take_pty_writes(&mut self) -> Vec<String> {
        match self.event_proxy.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.pty_writes),
            Err(_) => Vec::new(),
        }
    }

    /// Check and clear the bell flag.
    pub fn has_bell(&mut self) -> bool {
        match self.event_proxy.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.bell),
            Err(_) => false,
        }
    }
}
