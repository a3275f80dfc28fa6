//! One student's turn: roll -> shuffle -> reveal -> answer -> settle.
//!
//! The engine is a plain synchronous state machine; the animation delays live
//! in `logic.rs`, which schedules the delayed transitions as spawned sleeps.
//! Every turn carries a monotonically increasing epoch. Scheduled
//! continuations pass back the epoch they captured, and a transition whose
//! epoch no longer matches is dropped on the floor. That is the whole
//! cancellation story: a hard reset (student or dice-mode switch) bumps the
//! epoch instead of chasing down pending timers.
//!
//! All guards are preventive: an invalid invocation returns `None`/`false`
//! and leaves the state untouched. Nothing here panics or errors.

use rand::Rng;
use serde::Serialize;

use crate::domain::{DiceCount, GameBoard};

/// Where a turn currently stands. The drawn dice and their total are carried
/// through the animation phases so the reveal can re-validate them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnPhase {
  #[default]
  Idle,
  Rolling { dice: [u8; 2], total: u8 },
  Shuffling { dice: [u8; 2], total: u8 },
  Revealed { dice: [u8; 2], total: u8 },
}

/// Feedback held during the settle window after an answer was judged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
  pub correct: bool,
  pub points_awarded: u32,
  /// The stored answer, present only when the submission was wrong.
  pub correct_answer: Option<String>,
}

/// What a successful roll hands back so the caller can schedule the
/// follow-up transitions under the same epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollStarted {
  pub epoch: u64,
  pub dice: [u8; 2],
  pub total: u8,
}

#[derive(Debug, Default)]
pub struct TurnEngine {
  epoch: u64,
  phase: TurnPhase,
  outcome: Option<AnswerOutcome>,
}

impl TurnEngine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn phase(&self) -> TurnPhase {
    self.phase
  }

  pub fn outcome(&self) -> Option<&AnswerOutcome> {
    self.outcome.as_ref()
  }

  /// The face-up roll total, if a card is currently revealed.
  pub fn flipped_card(&self) -> Option<u8> {
    match self.phase {
      TurnPhase::Revealed { total, .. } => Some(total),
      _ => None,
    }
  }

  /// Start a new turn: draw the dice and enter `Rolling` under a fresh epoch.
  ///
  /// Only legal from `Idle`; a roll during an animation or while a card is
  /// face-up is ignored. The second die reads 0 in one-die mode.
  pub fn begin_roll<R: Rng>(&mut self, dice: DiceCount, rng: &mut R) -> Option<RollStarted> {
    if self.phase != TurnPhase::Idle {
      return None;
    }
    let d1: u8 = rng.gen_range(1..=6);
    let d2: u8 = match dice {
      DiceCount::Two => rng.gen_range(1..=6),
      DiceCount::One => 0,
    };
    let total = d1 + d2;

    self.epoch += 1;
    self.outcome = None;
    self.phase = TurnPhase::Rolling { dice: [d1, d2], total };
    Some(RollStarted { epoch: self.epoch, dice: [d1, d2], total })
  }

  /// `Rolling -> Shuffling` once the roll animation has played out.
  /// Stale or out-of-phase calls are dropped.
  pub fn begin_shuffle(&mut self, epoch: u64) -> bool {
    if epoch != self.epoch {
      return false;
    }
    match self.phase {
      TurnPhase::Rolling { dice, total } => {
        self.phase = TurnPhase::Shuffling { dice, total };
        true
      }
      _ => false,
    }
  }

  /// `Shuffling -> Revealed` once the shuffle animation has played out.
  ///
  /// The total is recomputed from the retained dice and must address a live
  /// board slot; on any disagreement the engine stays in `Shuffling` rather
  /// than flipping a card the board cannot back.
  pub fn reveal(&mut self, epoch: u64, board: &GameBoard) -> Option<u8> {
    if epoch != self.epoch {
      return None;
    }
    let (dice, total) = match self.phase {
      TurnPhase::Shuffling { dice, total } => (dice, total),
      _ => return None,
    };
    let recomputed = if dice[1] == 0 { dice[0] } else { dice[0] + dice[1] };
    if recomputed != total || !board.contains_key(&total) {
      return None;
    }
    self.phase = TurnPhase::Revealed { dice, total };
    Some(total)
  }

  /// The roll total an answer submission would apply to, if submissions are
  /// currently being accepted (card face-up, no verdict displayed yet).
  pub fn accept_answer(&self) -> Option<u8> {
    if self.outcome.is_some() {
      return None;
    }
    self.flipped_card()
  }

  /// Store the verdict for the settle window. Returns the epoch to schedule
  /// the settle transition under, or `None` if no submission was acceptable.
  pub fn record_outcome(&mut self, outcome: AnswerOutcome) -> Option<u64> {
    self.accept_answer()?;
    self.outcome = Some(outcome);
    Some(self.epoch)
  }

  /// `Revealed -> Idle` after the settle window: flip the card back and drop
  /// the displayed verdict. Stale calls are dropped.
  pub fn finish_settle(&mut self, epoch: u64) -> bool {
    if epoch != self.epoch || self.outcome.is_none() {
      return false;
    }
    if !matches!(self.phase, TurnPhase::Revealed { .. }) {
      return false;
    }
    self.phase = TurnPhase::Idle;
    self.outcome = None;
    true
  }

  /// Unconditional hard reset: bump the epoch so every pending continuation
  /// goes stale, and start over from `Idle`. Used on active-student and
  /// dice-mode switches.
  pub fn reset(&mut self) {
    self.epoch += 1;
    self.phase = TurnPhase::Idle;
    self.outcome = None;
  }
}
