//! Rendering: bordered board with 2-column cells, sidebar, outcome popup and row-clear flash.

use crate::app::Tally;
use crate::game::{Cell, Lifecycle, Outcome, Snapshot};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Each board cell is drawn two terminal columns wide so blocks look square.
const CELL_WIDTH: u16 = 2;
const CELL_HEIGHT: u16 = 1;

const SIDEBAR_WIDTH: u16 = 26;
const SIDEBAR_HEIGHT: u16 = 22;

/// Row-clear flash length in ms.
const ROW_FLASH_MS: u32 = 450;

/// How strongly the unsafe zone is tinted towards the danger colour.
const UNSAFE_TINT: f32 = 0.18;

/// Outer size (board border + sidebar) needed for a board of `cols` x `rows` cells.
pub fn layout_size(cols: usize, rows: usize) -> (u16, u16) {
    let board_w = cols as u16 * CELL_WIDTH + 2;
    let board_h = rows as u16 * CELL_HEIGHT + 2;
    (board_w + SIDEBAR_WIDTH, board_h.max(SIDEBAR_HEIGHT))
}

/// Board outer rect (with border), centred in `area` alongside the sidebar.
fn board_outer_rect(area: Rect, cols: usize, rows: usize) -> Rect {
    let (total_w, total_h) = layout_size(cols, rows);
    let x = area.x + area.width.saturating_sub(total_w) / 2;
    let y = area.y + area.height.saturating_sub(total_h) / 2;
    Rect {
        x,
        y,
        width: (cols as u16 * CELL_WIDTH + 2).min(area.width),
        height: (rows as u16 * CELL_HEIGHT + 2).min(area.height),
    }
}

/// Board inner rect (cells only, no border).
pub fn board_rect(area: Rect, cols: usize, rows: usize) -> Rect {
    let outer = board_outer_rect(area, cols, rows);
    Rect {
        x: outer.x + 1,
        y: outer.y + 1,
        width: (cols as u16 * CELL_WIDTH).min(outer.width.saturating_sub(2)),
        height: (rows as u16 * CELL_HEIGHT).min(outer.height.saturating_sub(2)),
    }
}

/// Buffer positions covered by the given board rows.
fn row_buffer_positions(board: Rect, rows: &[usize]) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &row in rows {
        let y = board.y + row as u16 * CELL_HEIGHT;
        if y >= board.y + board.height {
            continue;
        }
        for x in board.x..board.x + board.width {
            set.insert((x, y));
        }
    }
    set
}

/// Mix `over` into `base`; only RGB colours are blended.
fn tint(base: Color, over: Color, amount: f32) -> Color {
    match (base, over) {
        (Color::Rgb(r1, g1, b1), Color::Rgb(r2, g2, b2)) => {
            let mix = |a: u8, b: u8| {
                (a as f32 + (b as f32 - a as f32) * amount.clamp(0.0, 1.0)).round() as u8
            };
            Color::Rgb(mix(r1, r2), mix(g1, g2), mix(b1, b2))
        }
        _ => base,
    }
}

/// Flash state for rows that just turned green.
#[derive(Default)]
pub struct RowFlash {
    rows: Vec<usize>,
    effect: Option<Effect>,
    last_frame: Option<Instant>,
}

impl RowFlash {
    /// Start (or restart) the flash with newly cleared rows added.
    pub fn start(&mut self, rows: &[usize]) {
        self.rows.extend_from_slice(rows);
        self.effect = None;
        self.last_frame = None;
    }

    pub fn is_active(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn cancel(&mut self) {
        self.rows.clear();
        self.effect = None;
        self.last_frame = None;
    }

    /// Drop the effect once it has run its course.
    pub fn finish_if_done(&mut self) {
        if self.effect.as_ref().is_some_and(|e| e.done()) {
            self.cancel();
        }
    }
}

/// Fade newly cleared rows in from white to their settled colour.
fn apply_row_flash(frame: &mut Frame, board: Rect, flash: &mut RowFlash, now: Instant) {
    let delta = flash
        .last_frame
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    flash.last_frame = Some(now);

    if flash.effect.is_none() {
        let positions = row_buffer_positions(board, &flash.rows);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            positions.contains(&(pos.x, pos.y))
        }));
        let effect = fx::fade_from(
            Color::White,
            Color::White,
            (ROW_FLASH_MS, Interpolation::Linear),
        )
        .with_filter(filter)
        .with_area(board);
        flash.effect = Some(effect);
    }

    if let Some(effect) = flash.effect.as_mut() {
        frame.render_effect(effect, board, TfxDuration::from_millis(delta_ms));
    }
}

/// Draw the whole screen: board, sidebar, popups and the row flash.
pub fn draw(
    frame: &mut Frame,
    snapshot: &Snapshot,
    theme: &Theme,
    tally: Tally,
    flash: &mut RowFlash,
    now: Instant,
    no_animation: bool,
) {
    let area = frame.area();
    let (total_w, total_h) = layout_size(snapshot.width, snapshot.height);
    if area.width < total_w || area.height < total_h {
        draw_too_small(frame, theme, area, total_w, total_h);
        return;
    }

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_h),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(total_w - SIDEBAR_WIDTH),
            Constraint::Length(SIDEBAR_WIDTH),
        ])
        .split(vert[1]);

    let board = board_rect(columns[0], snapshot.width, snapshot.height);
    draw_board(frame, snapshot, theme, board);
    draw_sidebar(frame, snapshot, theme, tally, columns[1]);

    if flash.is_active() && !no_animation {
        apply_row_flash(frame, board, flash, now);
    }

    match snapshot.lifecycle {
        Lifecycle::Idle => draw_popup(
            frame,
            board,
            " Press Enter ",
            Style::default().fg(theme.title).bg(theme.bg),
            theme,
        ),
        Lifecycle::Ended => {
            let (msg, colour) = match snapshot.outcome {
                Some(Outcome::Win) => (" Congrats! ", theme.cleared),
                Some(Outcome::Loss) | None => (" Failed ", theme.danger),
            };
            draw_popup(
                frame,
                board,
                msg,
                Style::default()
                    .fg(theme.bg)
                    .bg(colour)
                    .add_modifier(Modifier::BOLD),
                theme,
            );
        }
        Lifecycle::Running => {}
    }
}

fn draw_board(frame: &mut Frame, snapshot: &Snapshot, theme: &Theme, board: Rect) {
    let outer = Rect {
        x: board.x.saturating_sub(1),
        y: board.y.saturating_sub(1),
        width: board.width + 2,
        height: board.height + 2,
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Tetro ", theme.title));
    block.render(outer, frame.buffer_mut());

    let unsafe_bg = tint(theme.bg, theme.danger, UNSAFE_TINT);
    let buf = frame.buffer_mut();
    for y in 0..snapshot.height {
        let ry = board.y + y as u16 * CELL_HEIGHT;
        if ry >= board.y + board.height {
            break;
        }
        let row_bg = if y < snapshot.safe_zone_start {
            unsafe_bg
        } else {
            theme.bg
        };
        for x in 0..snapshot.width {
            let (symbol, fg) = if snapshot.is_active(x, y) {
                ("█", theme.active)
            } else {
                match snapshot.cell(x, y) {
                    Cell::Locked => ("█", theme.locked),
                    Cell::Cleared => ("█", theme.cleared),
                    Cell::Empty => (" ", row_bg),
                }
            };
            let style = Style::default().fg(fg).bg(row_bg);
            let rx = board.x + x as u16 * CELL_WIDTH;
            for dx in 0..CELL_WIDTH {
                if rx + dx < board.x + board.width {
                    buf[(rx + dx, ry)].set_symbol(symbol).set_style(style);
                }
            }
        }
    }
}

fn draw_sidebar(frame: &mut Frame, snapshot: &Snapshot, theme: &Theme, tally: Tally, area: Rect) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let hint_style = Style::default().fg(theme.inactive_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Status
            Constraint::Length(1),
            Constraint::Length(4), // Progress
            Constraint::Length(1),
            Constraint::Length(4), // Session
            Constraint::Length(1),
            Constraint::Length(7), // Controls
        ])
        .split(area);

    let section = |title: &'static str| {
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(title, title_style))
    };

    let (status, detail) = match snapshot.lifecycle {
        Lifecycle::Idle => ("Idle", "Press Enter to start".to_string()),
        Lifecycle::Running => (
            "Running",
            snapshot
                .active_kind
                .map(|k| format!("Piece: {}x{}", k.height(), k.width()))
                .unwrap_or_default(),
        ),
        Lifecycle::Ended => (
            match snapshot.outcome {
                Some(Outcome::Win) => "Congrats!",
                _ => "Failed",
            },
            "New game shortly".to_string(),
        ),
    };
    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status, fg_style)),
        Line::from(Span::styled(detail, hint_style)),
    ]))
    .block(section(" Status "))
    .render(chunks[0], frame.buffer_mut());

    let progress = section(" Cleared ");
    let progress_inner = progress.inner(chunks[2]);
    progress.render(chunks[2], frame.buffer_mut());
    let progress_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(progress_inner);
    Paragraph::new(Line::from(vec![
        Span::styled(snapshot.cleared_rows.to_string(), fg_style),
        Span::styled(format!(" / {} rows", snapshot.win_rows), hint_style),
    ]))
    .render(progress_rows[0], frame.buffer_mut());
    let ratio = if snapshot.win_rows > 0 {
        (snapshot.cleared_rows as f64 / snapshot.win_rows as f64).min(1.0)
    } else {
        0.0
    };
    Gauge::default()
        .ratio(ratio)
        .label("")
        .gauge_style(Style::default().fg(theme.cleared).bg(theme.bg))
        .render(progress_rows[1], frame.buffer_mut());

    Paragraph::new(Text::from(vec![
        Line::from(vec![
            Span::styled("Wins:   ", title_style),
            Span::styled(tally.wins.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Losses: ", title_style),
            Span::styled(tally.losses.to_string(), fg_style),
        ]),
    ]))
    .block(section(" Session "))
    .render(chunks[4], frame.buffer_mut());

    let controls = [
        ("←/h", "move left"),
        ("→/l", "move right"),
        ("Enter", "start"),
        ("r", "reset"),
        ("q/Esc", "quit"),
    ];
    let lines: Vec<Line> = controls
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:<6}"), title_style),
                Span::styled(*what, hint_style),
            ])
        })
        .collect();
    Paragraph::new(Text::from(lines))
        .block(section(" Controls "))
        .render(chunks[6], frame.buffer_mut());
}

/// One-line message box centred over the board.
fn draw_popup(frame: &mut Frame, board: Rect, msg: &str, style: Style, theme: &Theme) {
    let width = (msg.chars().count() as u16 + 2).min(board.width);
    let height = 3.min(board.height);
    let popup = Rect {
        x: board.x + board.width.saturating_sub(width) / 2,
        y: board.y + board.height.saturating_sub(height) / 2,
        width,
        height,
    };
    Clear.render(popup, frame.buffer_mut());
    Paragraph::new(Line::from(Span::styled(msg.to_string(), style)))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_too_small(frame: &mut Frame, theme: &Theme, area: Rect, need_w: u16, need_h: u16) {
    let lines = vec![
        Line::from(Span::styled("Terminal too small", Style::default().fg(theme.danger))),
        Line::from(Span::styled(
            format!("need {}x{}, have {}x{}", need_w, need_h, area.width, area.height),
            Style::default().fg(theme.main_fg),
        )),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(area, frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_size_default_board() {
        // 10 cells * 2 columns + border, 12 rows + border; sidebar is taller.
        assert_eq!(layout_size(10, 12), (22 + SIDEBAR_WIDTH, SIDEBAR_HEIGHT));
        assert_eq!(layout_size(4, 30), (10 + SIDEBAR_WIDTH, 32));
    }

    #[test]
    fn test_board_rect_is_centred_inside_border() {
        let area = Rect::new(0, 0, 100, 40);
        let board = board_rect(area, 10, 12);
        assert_eq!(board.width, 20);
        assert_eq!(board.height, 12);
        // (100 - 48) / 2 = 26, plus the border.
        assert_eq!(board.x, 27);
        // (40 - 22) / 2 = 9, plus the border.
        assert_eq!(board.y, 10);
    }

    #[test]
    fn test_layout_size_fits_largest_board() {
        let max = crate::MAX_BOARD_SIZE as usize;
        let (w, h) = layout_size(max, max);
        assert_eq!(w, max as u16 * CELL_WIDTH + 2 + SIDEBAR_WIDTH);
        assert_eq!(h, max as u16 + 2);
    }

    #[test]
    fn test_row_positions_cover_full_width() {
        let board = Rect::new(5, 3, 20, 12);
        let set = row_buffer_positions(board, &[0, 11, 40]);
        assert_eq!(set.len(), 40);
        assert!(set.contains(&(5, 3)));
        assert!(set.contains(&(24, 14)));
        assert!(!set.contains(&(25, 14)));
    }

    #[test]
    fn test_tint_blends_rgb_only() {
        let c = tint(Color::Rgb(0, 0, 0), Color::Rgb(200, 100, 50), 0.5);
        assert_eq!(c, Color::Rgb(100, 50, 25));
        assert_eq!(tint(Color::Reset, Color::Rgb(1, 2, 3), 0.5), Color::Reset);
    }

    #[test]
    fn test_row_flash_lifecycle() {
        let mut flash = RowFlash::default();
        assert!(!flash.is_active());
        flash.start(&[11]);
        flash.start(&[10]);
        assert!(flash.is_active());
        assert_eq!(flash.rows, vec![11, 10]);
        // No effect built yet, so nothing to finish.
        flash.finish_if_done();
        assert!(flash.is_active());
        flash.cancel();
        assert!(!flash.is_active());
    }
}
