//! App: terminal init, main loop, gravity timer, key handling and auto-restart.

use crate::game::{GameEvent, GameState, Lifecycle, Outcome};
use crate::input::{key_to_action, Action};
use crate::pieces::{PieceSource, RandomPieces};
use crate::theme::Theme;
use crate::ui::RowFlash;
use crate::{Args, GameConfig};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Wins and losses since the program started. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub wins: u32,
    pub losses: u32,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
        }
    }
}

pub struct App {
    args: Args,
    config: GameConfig,
    theme: Theme,
    state: GameState,
    tally: Tally,
    last_tick: Instant,
    /// When set, the ended game is replaced by a fresh running one at this instant.
    restart_at: Option<Instant>,
    flash: RowFlash,
}

impl App {
    pub fn new(args: Args, config: GameConfig, theme: Theme) -> Self {
        let source = Box::new(RandomPieces::new(args.seed));
        Self::with_source(args, config, theme, source)
    }

    fn with_source(
        args: Args,
        config: GameConfig,
        theme: Theme,
        source: Box<dyn PieceSource>,
    ) -> Self {
        let mut state = GameState::new(&config, source);
        if args.auto_start {
            state.activate();
        }
        let mut app = Self {
            args,
            config,
            theme,
            state,
            tally: Tally::default(),
            last_tick: Instant::now(),
            restart_at: None,
            flash: RowFlash::default(),
        };
        app.drain_events(Instant::now());
        app
    }

    fn gravity_interval(&self) -> Duration {
        Duration::from_millis(self.config.gravity_ms)
    }

    fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.config.restart_delay_ms)
    }

    /// Apply one key action. Returns true when the user asked to quit.
    fn handle_action(&mut self, action: Action, now: Instant) -> bool {
        match action {
            Action::Quit => return true,
            Action::MoveLeft => self.state.move_left(),
            Action::MoveRight => self.state.move_right(),
            Action::Activate => {
                if self.state.lifecycle() == Lifecycle::Idle {
                    self.state.activate();
                    self.last_tick = now;
                }
            }
            Action::Reset => {
                self.state.reset();
                self.restart_at = None;
                self.flash.cancel();
                info!("game reset");
            }
            Action::None => {}
        }
        debug!(?action, piece = ?self.state.piece(), "input");
        self.drain_events(now);
        false
    }

    /// Advance timers: pending restart, then gravity, then engine events.
    fn update(&mut self, now: Instant) {
        if self.restart_at.is_some_and(|at| now >= at) {
            info!(previous = ?self.state.outcome(), "restarting");
            self.restart_at = None;
            self.flash.cancel();
            self.state.reset();
            self.state.activate();
            self.last_tick = now;
            info!("new game started");
        }
        if self.state.lifecycle() == Lifecycle::Running
            && now.saturating_duration_since(self.last_tick) >= self.gravity_interval()
        {
            self.last_tick = now;
            self.state.tick();
        }
        self.drain_events(now);
    }

    fn drain_events(&mut self, now: Instant) {
        while let Some(event) = self.state.poll_event() {
            match event {
                GameEvent::RowsCleared { rows, total } => {
                    debug!(?rows, total, "rows cleared");
                    if !self.args.no_animation {
                        self.flash.start(&rows);
                    }
                }
                GameEvent::Ended(outcome) => {
                    self.tally.record(outcome);
                    info!(
                        ?outcome,
                        cleared = self.state.playfield().cleared_count(),
                        wins = self.tally.wins,
                        losses = self.tally.losses,
                        "game over"
                    );
                    self.restart_at = Some(now + self.restart_delay());
                }
                GameEvent::Spawned(kind) => trace!(kind = kind.name(), "spawned"),
                GameEvent::Locked { kind, cells } => {
                    trace!(kind = kind.name(), cells = cells.len(), "locked");
                }
            }
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;

        let result = self.run_loop(&mut terminal);

        // Restore
        if let Err(e) = terminal.show_cursor() {
            debug!(error = %e, "failed to restore cursor");
        }
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let frame_duration = Duration::from_secs_f64(1.0 / self.args.frame_rate.max(1.0));
        loop {
            let now = Instant::now();
            let snapshot = self.state.snapshot();
            terminal.draw(|f| {
                crate::ui::draw(
                    f,
                    &snapshot,
                    &self.theme,
                    self.tally,
                    &mut self.flash,
                    now,
                    self.args.no_animation,
                )
            })?;
            self.flash.finish_if_done();

            let timeout = frame_duration.saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if self.handle_action(key_to_action(key), Instant::now()) {
                            return Ok(());
                        }
                    }
                }
            }

            self.update(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pieces::{PieceKind, SequencePieces};
    use clap::Parser;

    fn app_with(argv: &[&str], config: GameConfig, kinds: Vec<PieceKind>) -> App {
        let mut full = vec!["tetrotui"];
        full.extend_from_slice(argv);
        let args = Args::parse_from(full);
        App::with_source(
            args,
            config,
            Theme::default(),
            Box::new(SequencePieces::new(kinds)),
        )
    }

    /// Two rows, top row unsafe: the second Dot locks at row 0 and loses.
    fn losing_config() -> GameConfig {
        GameConfig {
            rows: 2,
            safe_zone_start: 1,
            win_rows: 1,
            ..GameConfig::default()
        }
    }

    /// A Square fills a 2x2 board in one lock, which clears both rows.
    fn winning_config() -> GameConfig {
        GameConfig {
            columns: 2,
            rows: 2,
            safe_zone_start: 0,
            win_rows: 1,
            ..GameConfig::default()
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_tally_records_outcomes() {
        let mut tally = Tally::default();
        tally.record(Outcome::Win);
        tally.record(Outcome::Loss);
        tally.record(Outcome::Loss);
        assert_eq!(tally, Tally { wins: 1, losses: 2 });
    }

    #[test]
    fn test_waits_for_activate_unless_auto_start() {
        let app = app_with(&[], GameConfig::default(), vec![PieceKind::Dot]);
        assert_eq!(app.state.lifecycle(), Lifecycle::Idle);
        let app = app_with(&["--auto-start"], GameConfig::default(), vec![PieceKind::Dot]);
        assert_eq!(app.state.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn test_idle_ignores_gravity() {
        let mut app = app_with(&[], GameConfig::default(), vec![PieceKind::Dot]);
        let t0 = Instant::now();
        app.update(t0 + secs(5));
        assert_eq!(app.state.lifecycle(), Lifecycle::Idle);
        assert!(app.state.piece().is_none());
    }

    #[test]
    fn test_gravity_follows_interval() {
        let mut app = app_with(&[], GameConfig::default(), vec![PieceKind::Dot]);
        let t0 = Instant::now();
        assert!(!app.handle_action(Action::Activate, t0));
        app.update(t0 + Duration::from_millis(999));
        assert_eq!(app.state.piece().map(|p| p.y), Some(0));
        app.update(t0 + secs(1));
        assert_eq!(app.state.piece().map(|p| p.y), Some(1));
        app.update(t0 + Duration::from_millis(1500));
        assert_eq!(app.state.piece().map(|p| p.y), Some(1));
    }

    #[test]
    fn test_moves_reach_engine() {
        let mut app = app_with(&["--auto-start"], GameConfig::default(), vec![PieceKind::Dot]);
        let now = Instant::now();
        app.handle_action(Action::MoveRight, now);
        app.handle_action(Action::MoveRight, now);
        app.handle_action(Action::MoveLeft, now);
        assert_eq!(app.state.piece().map(|p| p.x), Some(1));
    }

    #[test]
    fn test_loss_counts_and_restarts_after_delay() {
        let mut app = app_with(&[], losing_config(), vec![PieceKind::Dot]);
        let t0 = Instant::now();
        app.handle_action(Action::Activate, t0);
        app.update(t0 + secs(1)); // falls to row 1
        app.update(t0 + secs(2)); // locks on the floor, next spawns
        app.update(t0 + secs(3)); // locks in row 0
        assert_eq!(app.state.lifecycle(), Lifecycle::Ended);
        assert_eq!(app.state.outcome(), Some(Outcome::Loss));
        assert_eq!(app.tally, Tally { wins: 0, losses: 1 });
        assert_eq!(app.restart_at, Some(t0 + secs(3) + Duration::from_millis(1500)));

        app.update(t0 + secs(4));
        assert_eq!(app.state.lifecycle(), Lifecycle::Ended);

        app.update(t0 + Duration::from_millis(4500));
        assert_eq!(app.state.lifecycle(), Lifecycle::Running);
        assert_eq!(app.state.outcome(), None);
        assert_eq!(app.state.playfield().cleared_count(), 0);
        assert!(!app.state.playfield().is_occupied(0, 1));
        assert!(app.restart_at.is_none());
        assert_eq!(app.tally.losses, 1);
    }

    #[test]
    fn test_win_flashes_rows_and_counts() {
        let mut app = app_with(&[], winning_config(), vec![PieceKind::Square]);
        let t0 = Instant::now();
        app.handle_action(Action::Activate, t0);
        app.update(t0 + secs(1));
        assert_eq!(app.state.outcome(), Some(Outcome::Win));
        assert_eq!(app.tally, Tally { wins: 1, losses: 0 });
        assert!(app.flash.is_active());

        app.update(t0 + secs(3));
        assert_eq!(app.state.lifecycle(), Lifecycle::Running);
        assert!(!app.flash.is_active());
    }

    #[test]
    fn test_no_animation_skips_flash() {
        let mut app = app_with(&["--no-animation"], winning_config(), vec![PieceKind::Square]);
        let t0 = Instant::now();
        app.handle_action(Action::Activate, t0);
        app.update(t0 + secs(1));
        assert_eq!(app.state.outcome(), Some(Outcome::Win));
        assert!(!app.flash.is_active());
    }

    #[test]
    fn test_reset_cancels_pending_restart() {
        let mut app = app_with(&[], winning_config(), vec![PieceKind::Square]);
        let t0 = Instant::now();
        app.handle_action(Action::Activate, t0);
        app.update(t0 + secs(1));
        assert!(app.restart_at.is_some());

        app.handle_action(Action::Reset, t0 + secs(1));
        assert_eq!(app.state.lifecycle(), Lifecycle::Idle);
        assert!(app.restart_at.is_none());

        app.update(t0 + secs(10));
        assert_eq!(app.state.lifecycle(), Lifecycle::Idle);
        assert_eq!(app.tally.wins, 1);
    }

    #[test]
    fn test_quit_action() {
        let mut app = app_with(&[], GameConfig::default(), vec![PieceKind::Dot]);
        assert!(app.handle_action(Action::Quit, Instant::now()));
        assert!(!app.handle_action(Action::None, Instant::now()));
    }
}
