//! Game state: playfield, falling piece, locking, row clears, win/loss.
//!
//! The engine never looks at a clock. The shell calls [`GameState::tick`] on its
//! gravity interval and forwards key presses to [`GameState::move_left`] /
//! [`GameState::move_right`]; everything runs to completion inside the call.

use crate::pieces::{PieceKind, PieceSource};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Single board cell. `Locked` and `Cleared` both block movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Locked,
    Cleared,
}

impl Cell {
    #[inline]
    pub fn is_occupied(self) -> bool {
        !matches!(self, Self::Empty)
    }
}

/// Playfield: grid of cells. y=0 is top; rows are stored [0..height].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playfield {
    width: usize,
    height: usize,
    /// rows[y][x] = cell. rows[0] is top.
    rows: Vec<Vec<Cell>>,
}

impl Playfield {
    pub fn new(width: u16, height: u16) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self {
            width: w,
            height: h,
            rows: (0..h).map(|_| vec![Cell::Empty; w]).collect(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.rows[y as usize][x as usize])
    }

    /// Occupied means in bounds and not empty. Walls and floor are the caller's business.
    #[inline]
    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_some_and(Cell::is_occupied)
    }

    pub fn row(&self, y: usize) -> Option<&[Cell]> {
        self.rows.get(y).map(Vec::as_slice)
    }

    /// True if every cell of the piece is inside the walls, above the floor and
    /// not on an occupied cell. Cells above the top edge are allowed.
    pub fn can_place(&self, piece: &Piece) -> bool {
        piece.cells().all(|(x, y)| {
            if x < 0 || x >= self.width as i32 || y >= self.height as i32 {
                return false;
            }
            y < 0 || !self.is_occupied(x, y)
        })
    }

    /// Mark cells as locked; out-of-bounds cells are skipped and cleared cells are
    /// left alone so a row never ends up partly cleared.
    /// Returns how many cells went from empty to locked.
    pub fn lock_cells(&mut self, cells: &[(i32, i32)]) -> usize {
        let mut newly_locked = 0;
        for &(x, y) in cells {
            if !self.in_bounds(x, y) {
                continue;
            }
            let cell = &mut self.rows[y as usize][x as usize];
            match *cell {
                Cell::Empty => {
                    *cell = Cell::Locked;
                    newly_locked += 1;
                }
                Cell::Locked | Cell::Cleared => {}
            }
        }
        newly_locked
    }

    fn is_row_full(&self, y: usize) -> bool {
        self.rows[y].iter().all(|c| c.is_occupied())
    }

    fn is_row_cleared(&self, y: usize) -> bool {
        self.rows[y].iter().all(|c| *c == Cell::Cleared)
    }

    /// Turn every full row into a cleared row. Returns the total number of
    /// cleared rows on the board, not just the ones cleared by this call.
    pub fn clear_full_rows(&mut self) -> usize {
        for y in 0..self.height {
            if self.is_row_full(y) && !self.is_row_cleared(y) {
                self.rows[y].fill(Cell::Cleared);
            }
        }
        self.cleared_count()
    }

    pub fn cleared_count(&self) -> usize {
        (0..self.height).filter(|&y| self.is_row_cleared(y)).count()
    }

    /// Indices of cleared rows, top to bottom.
    pub fn cleared_rows(&self) -> Vec<usize> {
        (0..self.height).filter(|&y| self.is_row_cleared(y)).collect()
    }
}

/// Falling piece: template plus board position of its top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    pub const SPAWN: (i32, i32) = (0, 0);

    pub fn spawn(kind: PieceKind) -> Self {
        Self {
            kind,
            x: Self::SPAWN.0,
            y: Self::SPAWN.1,
        }
    }

    /// Absolute board cells covered by the piece.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.kind
            .cells()
            .iter()
            .map(move |&(dx, dy)| (self.x + dx, self.y + dy))
    }

    fn shifted(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// Result of trying to shift the active piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    Moved,
    /// Sideways move hit a wall or a block; nothing changed.
    Blocked,
    /// Downward move hit the floor or a block; the piece has to lock.
    MustLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

/// Notifications for the shell, drained with [`GameState::poll_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Spawned(PieceKind),
    Locked {
        kind: PieceKind,
        cells: Vec<(i32, i32)>,
    },
    RowsCleared {
        rows: Vec<usize>,
        total: usize,
    },
    Ended(Outcome),
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub width: usize,
    pub height: usize,
    /// Row-major, `cells[y * width + x]`.
    pub cells: Vec<Cell>,
    pub active: Vec<(i32, i32)>,
    pub active_kind: Option<PieceKind>,
    pub lifecycle: Lifecycle,
    pub outcome: Option<Outcome>,
    pub cleared_rows: usize,
    pub win_rows: usize,
    pub safe_zone_start: usize,
}

impl Snapshot {
    pub fn cell(&self, x: usize, y: usize) -> Cell {
        if x >= self.width || y >= self.height {
            return Cell::Empty;
        }
        self.cells[y * self.width + x]
    }

    pub fn is_active(&self, x: usize, y: usize) -> bool {
        self.active
            .iter()
            .any(|&(ax, ay)| ax == x as i32 && ay == y as i32)
    }
}

/// Game state: playfield, active piece, lifecycle and outcome.
#[derive(Debug)]
pub struct GameState {
    playfield: Playfield,
    piece: Option<Piece>,
    lifecycle: Lifecycle,
    outcome: Option<Outcome>,
    columns: u16,
    rows: u16,
    /// Locking any cell above this row loses the game.
    safe_zone_start: usize,
    win_rows: usize,
    source: Box<dyn PieceSource>,
    events: VecDeque<GameEvent>,
}

impl GameState {
    pub fn new(config: &crate::GameConfig, source: Box<dyn PieceSource>) -> Self {
        Self {
            playfield: Playfield::new(config.columns, config.rows),
            piece: None,
            lifecycle: Lifecycle::Idle,
            outcome: None,
            columns: config.columns,
            rows: config.rows,
            safe_zone_start: config.safe_zone_start as usize,
            win_rows: config.win_rows as usize,
            source,
            events: VecDeque::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn piece(&self) -> Option<Piece> {
        self.piece
    }

    pub fn playfield(&self) -> &Playfield {
        &self.playfield
    }

    /// Start falling pieces. Ignored unless idle.
    pub fn activate(&mut self) {
        if self.lifecycle != Lifecycle::Idle {
            return;
        }
        info!("game activated");
        self.lifecycle = Lifecycle::Running;
        self.spawn_piece();
    }

    /// Gravity step.
    pub fn tick(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        if self.try_move(0, 1) == MoveResult::MustLock {
            self.lock_piece();
        }
    }

    pub fn move_left(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.try_move(-1, 0);
        }
    }

    pub fn move_right(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.try_move(1, 0);
        }
    }

    /// Back to an empty idle board. Always accepted; drops the active piece and
    /// any undelivered events.
    pub fn reset(&mut self) {
        info!(from = ?self.lifecycle, "game reset");
        self.playfield = Playfield::new(self.columns, self.rows);
        self.piece = None;
        self.lifecycle = Lifecycle::Idle;
        self.outcome = None;
        self.events.clear();
    }

    pub fn poll_event(&mut self) -> Option<GameEvent> {
        self.events.pop_front()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.playfield.width(),
            height: self.playfield.height(),
            cells: (0..self.playfield.height())
                .filter_map(|y| self.playfield.row(y))
                .flatten()
                .copied()
                .collect(),
            active: self
                .piece
                .map(|p| p.cells().collect::<Vec<_>>())
                .unwrap_or_default(),
            active_kind: self.piece.map(|p| p.kind),
            lifecycle: self.lifecycle,
            outcome: self.outcome,
            cleared_rows: self.playfield.cleared_count(),
            win_rows: self.win_rows,
            safe_zone_start: self.safe_zone_start,
        }
    }

    pub(crate) fn try_move(&mut self, dx: i32, dy: i32) -> MoveResult {
        let Some(piece) = self.piece else {
            return MoveResult::Blocked;
        };
        let candidate = piece.shifted(dx, dy);
        if self.playfield.can_place(&candidate) {
            self.piece = Some(candidate);
            MoveResult::Moved
        } else if dy > 0 {
            MoveResult::MustLock
        } else {
            MoveResult::Blocked
        }
    }

    /// Draw a template and place it at the spawn point. A blocked spawn point loses.
    fn spawn_piece(&mut self) {
        let kind = self.source.next_kind();
        let piece = Piece::spawn(kind);
        if !self.playfield.can_place(&piece) {
            debug!(kind = kind.name(), "spawn blocked");
            self.end(Outcome::Loss);
            return;
        }
        debug!(kind = kind.name(), "spawned");
        self.piece = Some(piece);
        self.events.push_back(GameEvent::Spawned(kind));
    }

    /// Commit the active piece, then: loss check, row clears, win check, next spawn.
    fn lock_piece(&mut self) {
        let Some(piece) = self.piece.take() else {
            return;
        };
        let height = self.playfield.height() as i32;
        let cells: Vec<(i32, i32)> = piece.cells().filter(|&(_, y)| y >= 0 && y < height).collect();
        let newly_locked = self.playfield.lock_cells(&cells);
        debug!(
            kind = piece.kind.name(),
            x = piece.x,
            y = piece.y,
            newly_locked,
            "locked"
        );
        let losing = cells
            .iter()
            .any(|&(_, y)| (y as usize) < self.safe_zone_start);
        self.events.push_back(GameEvent::Locked {
            kind: piece.kind,
            cells,
        });

        if losing {
            self.end(Outcome::Loss);
            return;
        }

        let before = self.playfield.cleared_rows();
        let total = self.playfield.clear_full_rows();
        let fresh: Vec<usize> = self
            .playfield
            .cleared_rows()
            .into_iter()
            .filter(|y| !before.contains(y))
            .collect();
        if !fresh.is_empty() {
            debug!(rows = ?fresh, total, "rows cleared");
            self.events.push_back(GameEvent::RowsCleared { rows: fresh, total });
        }

        if total >= self.win_rows {
            self.end(Outcome::Win);
            return;
        }
        self.spawn_piece();
    }

    fn end(&mut self, outcome: Outcome) {
        info!(?outcome, cleared = self.playfield.cleared_count(), "game ended");
        self.piece = None;
        self.lifecycle = Lifecycle::Ended;
        self.outcome = Some(outcome);
        self.events.push_back(GameEvent::Ended(outcome));
    }
}
