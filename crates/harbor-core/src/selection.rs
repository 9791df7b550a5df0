//! Mouse selection over the terminal grid, with auto-scroll while dragging
//! past the viewport edge.
//!
//! Endpoints are stored as absolute grid lines, so scrolling mid-drag never
//! moves the anchor. Auto-scroll is driven by self-scheduled ticks carrying
//! the generation they were scheduled under; every press, release, or drag
//! back inside the viewport bumps the generation, and a tick whose
//! generation no longer matches does nothing.

use std::time::Duration;

use harbor_vt::GridPoint;

use crate::model::TerminalModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Into history.
    Up,
    /// Towards the live screen.
    Down,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Selecting,
}

/// Per-tab selection state.
#[derive(Clone, Debug, Default)]
pub struct SelectionState {
    phase: Phase,
    anchor: Option<GridPoint>,
    head: Option<GridPoint>,
    generation: u64,
    autoscroll: Option<ScrollDirection>,
}

impl SelectionState {
    pub fn is_selecting(&self) -> bool {
        self.phase == Phase::Selecting
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn autoscroll(&self) -> Option<ScrollDirection> {
        self.autoscroll
    }

    /// Current endpoints as (anchor, head), in the order they were made.
    pub fn range(&self) -> Option<(GridPoint, GridPoint)> {
        self.anchor.zip(self.head)
    }

    /// Drop the selection and invalidate pending ticks.
    pub fn clear(&mut self) {
        *self = Self {
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
    }

    fn bump(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

/// What the caller must do after a selection event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionEffect {
    /// Deliver a tick tagged with `generation` after `after`.
    ScheduleTick { generation: u64, after: Duration },
    /// Put the text on the clipboard.
    Copy(String),
}

/// Translates screen positions into grid points and drives [`SelectionState`].
#[derive(Clone, Copy, Debug)]
pub struct SelectionController {
    /// Screen cell (column, row) where the grid's top-left cell is drawn.
    origin: (u16, u16),
    tick_interval: Duration,
}

/// A screen position mapped onto the visible grid.
struct Mapped {
    point: GridPoint,
    outside: Option<ScrollDirection>,
}

impl SelectionController {
    pub fn new(origin: (u16, u16), tick_interval: Duration) -> Self {
        Self {
            origin,
            tick_interval,
        }
    }

    pub fn press(&self, state: &mut SelectionState, model: &mut dyn TerminalModel, x: i32, y: i32) {
        let point = self.map(model, x, y).point;
        state.bump();
        state.phase = Phase::Selecting;
        state.anchor = Some(point);
        state.head = Some(point);
        state.autoscroll = None;
        model.set_selection(None);
    }

    pub fn drag(
        &self,
        state: &mut SelectionState,
        model: &mut dyn TerminalModel,
        x: i32,
        y: i32,
    ) -> Option<SelectionEffect> {
        if !state.is_selecting() {
            return None;
        }
        let mapped = self.map(model, x, y);
        state.head = Some(mapped.point);
        model.set_selection(state.range());

        if mapped.outside == state.autoscroll {
            // Still inside, or a tick for this direction is already pending.
            return None;
        }
        state.autoscroll = mapped.outside;
        let generation = state.bump();
        mapped.outside.map(|_| SelectionEffect::ScheduleTick {
            generation,
            after: self.tick_interval,
        })
    }

    /// Handle an auto-scroll tick. Stale ticks are ignored entirely.
    pub fn tick(
        &self,
        state: &mut SelectionState,
        model: &mut dyn TerminalModel,
        generation: u64,
    ) -> Option<SelectionEffect> {
        if generation != state.generation || !state.is_selecting() {
            return None;
        }
        let direction = state.autoscroll?;

        let rows = model.screen_lines().max(1);
        let cols = model.columns().max(1);
        let (delta, row, col) = match direction {
            ScrollDirection::Up => (1, 0, 0),
            ScrollDirection::Down => (-1, rows - 1, cols - 1),
        };
        // At either end of history this moves nothing; the head stays at the edge.
        model.scroll_lines(delta);

        let top = model.history_size().saturating_sub(model.display_offset());
        state.head = Some(GridPoint::new(top + row, col));
        model.set_selection(state.range());

        Some(SelectionEffect::ScheduleTick {
            generation,
            after: self.tick_interval,
        })
    }

    pub fn release(
        &self,
        state: &mut SelectionState,
        model: &mut dyn TerminalModel,
        x: i32,
        y: i32,
    ) -> Option<SelectionEffect> {
        if !state.is_selecting() {
            return None;
        }
        if state.autoscroll.is_none() {
            state.head = Some(self.map(model, x, y).point);
            model.set_selection(state.range());
        }
        state.bump();
        state.phase = Phase::Idle;
        state.autoscroll = None;

        match state.range() {
            Some((anchor, head)) if anchor != head => {
                model.selection_text().map(SelectionEffect::Copy)
            }
            _ => None,
        }
    }

    fn map(&self, model: &dyn TerminalModel, x: i32, y: i32) -> Mapped {
        let rows = model.screen_lines().max(1) as i32;
        let cols = model.columns().max(1) as i32;
        let col = x - self.origin.0 as i32;
        let row = y - self.origin.1 as i32;

        let outside = if row < 0 {
            Some(ScrollDirection::Up)
        } else if row >= rows {
            Some(ScrollDirection::Down)
        } else {
            None
        };

        let row = row.clamp(0, rows - 1) as usize;
        let col = col.clamp(0, cols - 1) as usize;
        let top = model.history_size().saturating_sub(model.display_offset());
        Mapped {
            point: GridPoint::new(top + row, col),
            outside,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::RecordingModel;

    const TICK: Duration = Duration::from_millis(40);

    fn setup(history: usize) -> (SelectionController, SelectionState, RecordingModel) {
        let (model, _log) = RecordingModel::new(80, 24, history);
        (
            SelectionController::new((2, 1), TICK),
            SelectionState::default(),
            model,
        )
    }

    fn tick_generation(effect: Option<SelectionEffect>) -> u64 {
        match effect {
            Some(SelectionEffect::ScheduleTick { generation, after }) => {
                assert_eq!(after, TICK);
                generation
            }
            other => panic!("expected a tick, got {other:?}"),
        }
    }

    #[test]
    fn test_press_translates_origin_and_history() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 12, 6);
        assert!(state.is_selecting());
        assert_eq!(state.range(), Some((GridPoint::new(105, 10), GridPoint::new(105, 10))));
    }

    #[test]
    fn test_points_are_clamped_to_grid() {
        let (ctl, mut state, mut model) = setup(0);
        ctl.press(&mut state, &mut model, 500, 10);
        let (anchor, _) = state.range().unwrap();
        assert_eq!(anchor, GridPoint::new(9, 79));

        ctl.press(&mut state, &mut model, -5, 3);
        assert_eq!(state.range().unwrap().0, GridPoint::new(2, 0));
    }

    #[test]
    fn test_release_copies_non_degenerate_selection() {
        let (ctl, mut state, mut model) = setup(0);
        ctl.press(&mut state, &mut model, 2, 1);
        ctl.drag(&mut state, &mut model, 7, 3);
        let effect = ctl.release(&mut state, &mut model, 7, 3);

        assert_eq!(effect, Some(SelectionEffect::Copy("0:0-2:5".to_string())));
        assert!(!state.is_selecting());
        assert!(model.selection_text().is_some(), "highlight stays after release");
    }

    #[test]
    fn test_click_without_drag_copies_nothing() {
        let (ctl, mut state, mut model) = setup(0);
        ctl.press(&mut state, &mut model, 4, 4);
        assert_eq!(ctl.release(&mut state, &mut model, 4, 4), None);
    }

    #[test]
    fn test_drag_above_viewport_scrolls_one_line_per_tick() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 10, 10);
        let generation = tick_generation(ctl.drag(&mut state, &mut model, 10, -3));
        assert_eq!(state.autoscroll(), Some(ScrollDirection::Up));
        let mut head_line = state.range().unwrap().1.line;
        assert_eq!(head_line, 100);

        let mut scrolled = 0;
        for _ in 0..3 {
            let next = tick_generation(ctl.tick(&mut state, &mut model, generation));
            assert_eq!(next, generation);
            let line = state.range().unwrap().1.line;
            assert_eq!(line + 1, head_line);
            head_line = line;
            assert!(model.display_offset() > scrolled);
            scrolled = model.display_offset();
        }
        assert_eq!(scrolled, 3);
    }

    #[test]
    fn test_stale_tick_is_a_no_op() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 10, 10);
        let stale = tick_generation(ctl.drag(&mut state, &mut model, 10, -3));

        // Back inside the viewport: autoscroll stops and the tick goes stale.
        assert_eq!(ctl.drag(&mut state, &mut model, 10, 5), None);
        let before = state.range();
        assert_eq!(ctl.tick(&mut state, &mut model, stale), None);
        assert_eq!(state.range(), before);
        assert_eq!(model.display_offset(), 0);
    }

    #[test]
    fn test_new_press_supersedes_pending_tick() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 10, 10);
        let pending = tick_generation(ctl.drag(&mut state, &mut model, 10, 40));
        ctl.press(&mut state, &mut model, 3, 3);
        assert_eq!(ctl.tick(&mut state, &mut model, pending), None);
    }

    #[test]
    fn test_repeated_drags_outside_do_not_stack_ticks() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 10, 10);
        tick_generation(ctl.drag(&mut state, &mut model, 10, -1));
        assert_eq!(ctl.drag(&mut state, &mut model, 11, -4), None);

        // Switching direction does schedule a fresh tick.
        tick_generation(ctl.drag(&mut state, &mut model, 11, 40));
    }

    #[test]
    fn test_autoscroll_down_stops_at_live_screen() {
        let (ctl, mut state, mut model) = setup(50);
        model.scroll_lines(2);
        ctl.press(&mut state, &mut model, 10, 10);
        let generation = tick_generation(ctl.drag(&mut state, &mut model, 10, 30));

        for _ in 0..4 {
            tick_generation(ctl.tick(&mut state, &mut model, generation));
        }
        assert_eq!(model.display_offset(), 0);
        assert_eq!(state.range().unwrap().1, GridPoint::new(50 + 23, 79));
    }

    #[test]
    fn test_release_ends_autoscroll() {
        let (ctl, mut state, mut model) = setup(100);
        ctl.press(&mut state, &mut model, 10, 10);
        let generation = tick_generation(ctl.drag(&mut state, &mut model, 10, -3));
        let effect = ctl.release(&mut state, &mut model, 10, -3);
        assert!(matches!(effect, Some(SelectionEffect::Copy(_))));
        assert_eq!(ctl.tick(&mut state, &mut model, generation), None);
    }
}
