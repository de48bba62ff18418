//! Tetrotui: the Tetro block-stacking puzzle in the terminal.

mod app;
mod game;
mod input;
mod pieces;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{ArgAction, Parser, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// Options derived from CLI that affect game behaviour (board size, safe zone, win goal, timing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub columns: u16,
    pub rows: u16,
    /// First row (counted from the top) where a locked block is safe.
    pub safe_zone_start: u16,
    pub win_rows: u16,
    pub gravity_ms: u64,
    /// How long the win/loss message stays up before a fresh game starts.
    pub restart_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            columns: 10,
            rows: 12,
            safe_zone_start: 4,
            win_rows: 5,
            gravity_ms: 1000,
            restart_delay_ms: 1500,
        }
    }
}

/// Largest accepted board side, in cells.
pub const MAX_BOARD_SIZE: u16 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("board needs at least 2 columns and 1 row (got {columns}x{rows})")]
    BoardTooSmall { columns: u16, rows: u16 },
    #[error("board is at most {max}x{max} cells (got {columns}x{rows})")]
    BoardTooLarge { columns: u16, rows: u16, max: u16 },
    #[error("safe zone starts at row {start} but the board only has {rows} rows")]
    NoSafeRows { start: u16, rows: u16 },
    #[error("win threshold must be at least 1 row")]
    ZeroWinRows,
    #[error("winning needs {win_rows} cleared rows but only {safe_rows} rows are safe")]
    Unwinnable { win_rows: u16, safe_rows: u16 },
    #[error("gravity interval must be greater than 0 ms")]
    ZeroGravity,
}

impl GameConfig {
    /// Reject boards where the game cannot be played or cannot be won.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns < 2 || self.rows == 0 {
            return Err(ConfigError::BoardTooSmall {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if self.columns > MAX_BOARD_SIZE || self.rows > MAX_BOARD_SIZE {
            return Err(ConfigError::BoardTooLarge {
                columns: self.columns,
                rows: self.rows,
                max: MAX_BOARD_SIZE,
            });
        }
        if self.safe_zone_start >= self.rows {
            return Err(ConfigError::NoSafeRows {
                start: self.safe_zone_start,
                rows: self.rows,
            });
        }
        if self.win_rows == 0 {
            return Err(ConfigError::ZeroWinRows);
        }
        let safe_rows = self.rows - self.safe_zone_start;
        if self.win_rows > safe_rows {
            return Err(ConfigError::Unwinnable {
                win_rows: self.win_rows,
                safe_rows,
            });
        }
        if self.gravity_ms == 0 {
            return Err(ConfigError::ZeroGravity);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref(), args.verbose)?;
    let config = args.game_config();
    config.validate().context("invalid game configuration")?;
    let theme = match theme::Theme::load(args.theme.as_deref(), args.palette) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "theme load failed, using default");
            theme::Theme::default()
        }
    };
    info!(?config, "starting");
    let mut app = App::new(args, config, theme);
    app.run()?;
    Ok(())
}

/// Log to a file when asked; the terminal itself is taken over by the game.
fn init_logging(path: Option<&std::path::Path>, verbose: u8) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(LevelFilter::from_level(level))
        .init();
    info!("Logging initialized at level: {}", level);
    Ok(())
}

/// Tetro: stack falling blocks, fill rows, don't build into the top.
#[derive(Debug, Parser)]
#[command(
    name = "tetrotui",
    version,
    about = "Tetro block-stacking puzzle in the terminal. Fill 5 rows to win; lock a block in the top rows and you lose.",
    long_about = "Tetrotui is a small falling-block puzzle.\n\n\
        Blocks (2x2, 2x1 and 1x1) drop from the top-left corner once per second. \
        Steer them left and right; they lock when they cannot fall any further. \
        A completely filled row turns green and stays on the board. \
        Get 5 green rows to win. Locking any block in the top 4 rows loses.\n\n\
        CONTROLS:\n  Enter/Space Start   Left/h  Move left   Right/l  Move right\n  r           Reset   q / Esc Quit"
)]
pub struct Args {
    /// Board width in cells.
    #[arg(long, default_value = "10", value_name = "COLS")]
    pub columns: u16,

    /// Board height in cells.
    #[arg(long, default_value = "12", value_name = "ROWS")]
    pub rows: u16,

    /// First safe row counted from the top; locking above it loses.
    #[arg(long, default_value = "4", value_name = "ROW")]
    pub safe_zone_start: u16,

    /// Number of cleared rows needed to win.
    #[arg(long, default_value = "5", value_name = "N")]
    pub win_rows: u16,

    /// Gravity interval in ms (one row per interval).
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub gravity_ms: u64,

    /// How long the win/loss message shows before a new game starts.
    #[arg(long, default_value = "1500", value_name = "MS")]
    pub restart_delay_ms: u64,

    /// Target render frames per second.
    #[arg(long, default_value = "30.0", value_name = "RATE")]
    pub frame_rate: f64,

    /// Seed for the piece generator (reproducible games).
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Start dropping pieces immediately instead of waiting for Enter.
    #[arg(long)]
    pub auto_start: bool,

    /// Disable the row-clear flash.
    #[arg(long)]
    pub no_animation: bool,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Write logs to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            columns: self.columns,
            rows: self.rows,
            safe_zone_start: self.safe_zone_start,
            win_rows: self.win_rows,
            gravity_ms: self.gravity_ms,
            restart_delay_ms: self.restart_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let args = Args::parse_from(["tetrotui"]);
        assert_eq!(args.game_config(), GameConfig::default());
        assert_eq!(args.palette, Palette::Normal);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "tetrotui",
            "--columns",
            "6",
            "--win-rows",
            "3",
            "--seed",
            "9",
            "--palette",
            "contrast",
            "-vv",
        ]);
        let config = args.game_config();
        assert_eq!(config.columns, 6);
        assert_eq!(config.win_rows, 3);
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.palette, Palette::HighContrast);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_largest_board_is_valid() {
        let config = GameConfig {
            columns: MAX_BOARD_SIZE,
            rows: MAX_BOARD_SIZE,
            ..GameConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_boards() {
        let base = GameConfig::default();
        let cases = [
            (
                GameConfig { columns: 1, ..base.clone() },
                ConfigError::BoardTooSmall { columns: 1, rows: 12 },
            ),
            (
                GameConfig { columns: 40000, ..base.clone() },
                ConfigError::BoardTooLarge { columns: 40000, rows: 12, max: MAX_BOARD_SIZE },
            ),
            (
                GameConfig { columns: 65535, rows: 65535, ..base.clone() },
                ConfigError::BoardTooLarge { columns: 65535, rows: 65535, max: MAX_BOARD_SIZE },
            ),
            (
                GameConfig { safe_zone_start: 12, ..base.clone() },
                ConfigError::NoSafeRows { start: 12, rows: 12 },
            ),
            (
                GameConfig { win_rows: 0, ..base.clone() },
                ConfigError::ZeroWinRows,
            ),
            (
                GameConfig { win_rows: 9, ..base.clone() },
                ConfigError::Unwinnable { win_rows: 9, safe_rows: 8 },
            ),
            (
                GameConfig { gravity_ms: 0, ..base.clone() },
                ConfigError::ZeroGravity,
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }
}
