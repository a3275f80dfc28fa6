//! Loading game configuration (data directory, dice mode, turn pacing)
//! from TOML.
//!
//! Every field is optional; a missing or unparsable file just means
//! defaults. See `GameConfig` for the expected schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::DiceCount;

#[derive(Clone, Debug, Deserialize)]
pub struct GameConfig {
  /// Directory holding `questions.json` and `students.json`.
  #[serde(default = "default_data_dir")]
  pub data_dir: PathBuf,
  /// Dice mode at startup. The admin can change it at runtime.
  #[serde(default)]
  pub num_dice: DiceCount,
  #[serde(default)]
  pub turn: TurnDelays,
}

/// Animation pacing, in milliseconds. The scheduled turn transitions fire
/// after these delays.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TurnDelays {
  #[serde(default = "default_roll_ms")]
  pub roll_ms: u64,
  #[serde(default = "default_shuffle_ms")]
  pub shuffle_ms: u64,
  #[serde(default = "default_settle_ms")]
  pub settle_ms: u64,
}

fn default_data_dir() -> PathBuf {
  PathBuf::from("./data")
}

fn default_roll_ms() -> u64 {
  1000
}

fn default_shuffle_ms() -> u64 {
  500
}

fn default_settle_ms() -> u64 {
  3000
}

impl Default for GameConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      num_dice: DiceCount::default(),
      turn: TurnDelays::default(),
    }
  }
}

impl Default for TurnDelays {
  fn default() -> Self {
    Self {
      roll_ms: default_roll_ms(),
      shuffle_ms: default_shuffle_ms(),
      settle_ms: default_settle_ms(),
    }
  }
}

/// Attempt to load `GameConfig` from GAME_CONFIG_PATH. On any parsing/IO
/// error, returns None and the caller falls back to defaults.
pub fn load_game_config_from_env() -> Option<GameConfig> {
  let path = std::env::var("GAME_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GameConfig>(&s) {
      Ok(cfg) => {
        info!(target: "chemroll_backend", %path, "Loaded game config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "chemroll_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "chemroll_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_yields_defaults() {
    let cfg: GameConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.data_dir, PathBuf::from("./data"));
    assert_eq!(cfg.num_dice, DiceCount::Two);
    assert_eq!(cfg.turn.roll_ms, 1000);
    assert_eq!(cfg.turn.shuffle_ms, 500);
    assert_eq!(cfg.turn.settle_ms, 3000);
  }

  #[test]
  fn partial_toml_keeps_the_rest_defaulted() {
    let cfg: GameConfig = toml::from_str(
      r#"
        data_dir = "/tmp/chemroll"
        num_dice = 1

        [turn]
        settle_ms = 0
      "#,
    )
    .unwrap();
    assert_eq!(cfg.data_dir, PathBuf::from("/tmp/chemroll"));
    assert_eq!(cfg.num_dice, DiceCount::One);
    assert_eq!(cfg.turn.roll_ms, 1000);
    assert_eq!(cfg.turn.settle_ms, 0);
  }
}
