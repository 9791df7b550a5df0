use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::Term;

use crate::terminal::EventProxy;

/// Current state of the cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

/// A position in the grid that does not move when the viewport scrolls.
///
/// `line` counts from the oldest retained scrollback line (0) down to the
/// last screen line (`history_size + screen_lines - 1`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPoint {
    pub line: usize,
    pub col: usize,
}

impl GridPoint {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// Information about which parts of the screen have changed.
#[derive(Debug)]
pub enum DamageInfo {
    /// The entire screen needs redrawing.
    Full,
    /// Only specific rows/columns changed.
    Partial(Vec<DamagedRow>),
}

/// A row (or portion of a row) that has been damaged.
#[derive(Debug)]
pub struct DamagedRow {
    pub row: u16,
    pub left: u16,
    pub right: u16,
}

/// A read-only view into the terminal grid.
pub struct ScreenView<'a> {
    term: &'a Term<EventProxy>,
}

impl<'a> ScreenView<'a> {
    pub(crate) fn new(term: &'a Term<EventProxy>) -> Self {
        Self { term }
    }

    /// Number of visible rows.
    pub fn rows(&self) -> u16 {
        self.term.screen_lines() as u16
    }

    /// Number of columns.
    pub fn cols(&self) -> u16 {
        self.term.columns() as u16
    }

    /// Text of a visible row, taking the current scroll offset into account.
    ///
    /// Row 0 is the top of the viewport. Trailing blanks are trimmed.
    pub fn row_text(&self, row: u16) -> String {
        if row as usize >= self.term.screen_lines() {
            return String::new();
        }
        let offset = self.term.grid().display_offset() as i32;
        self.text_at(Line(row as i32 - offset))
    }

    /// Text of a line addressed by absolute grid position.
    pub fn line_text(&self, line: usize) -> String {
        let history = self.term.grid().history_size();
        if line >= history + self.term.screen_lines() {
            return String::new();
        }
        self.text_at(Line(line as i32 - history as i32))
    }

    fn text_at(&self, line: Line) -> String {
        let grid = self.term.grid();
        let mut text = String::with_capacity(self.term.columns());
        for col in 0..self.term.columns() {
            let cell = &grid[line][Column(col)];
            if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                continue;
            }
            text.push(cell.c);
        }
        text.truncate(text.trim_end().len());
        text
    }
}
