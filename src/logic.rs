//! Turn orchestration shared by the HTTP and WebSocket handlers: the roll
//! guard chain, the scheduled shuffle/reveal/settle continuations, and
//! answer grading.
//!
//! Timers are fire-and-forget tasks tagged with the epoch that was current
//! when they were scheduled. A hard reset bumps the epoch, so a late
//! continuation finds itself stale and backs off instead of writing into
//! the next turn.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::protocol::{AnswerSubmitOut, RollOut, ServerWsMessage};
use crate::state::AppState;
use crate::turn::AnswerOutcome;
use crate::util::answers_match;

/// Start a turn. Refused (`started = false`) without a selected student,
/// with an empty board, or while a turn is already in flight.
#[instrument(level = "info", skip(state))]
pub async fn do_roll(state: &AppState) -> RollOut {
  let mut turn = state.turn.write().await;
  if turn.active_student.is_none() {
    debug!(target: "game", "roll refused: no student selected");
    return RollOut { started: false };
  }
  let board_empty = { state.board.read().await.is_empty() };
  if board_empty {
    debug!(target: "game", "roll refused: board is empty");
    return RollOut { started: false };
  }
  let dice = { state.settings.read().await.num_dice };
  let roll = {
    let mut rng = rand::thread_rng();
    turn.engine.begin_roll(dice, &mut rng)
  };
  let Some(roll) = roll else {
    debug!(target: "game", phase = ?turn.engine.phase(), "roll refused: turn already in flight");
    return RollOut { started: false };
  };
  drop(turn);

  info!(
    target: "game",
    epoch = roll.epoch,
    d1 = roll.dice[0],
    d2 = roll.dice[1],
    total = roll.total,
    "roll started"
  );
  state.publish(ServerWsMessage::RollStarted { dice: roll.dice, total: roll.total });
  schedule_shuffle(state.clone(), roll.epoch);
  RollOut { started: true }
}

/// Grade a submitted answer against the face-up card. Exactly one submission
/// is accepted per reveal; later ones bounce off the recorded outcome.
#[instrument(level = "info", skip(state, answer), fields(answer_len = answer.len()))]
pub async fn do_submit_answer(state: &AppState, answer: &str) -> AnswerSubmitOut {
  let mut turn = state.turn.write().await;
  let Some(total) = turn.engine.accept_answer() else {
    debug!(target: "game", phase = ?turn.engine.phase(), "answer refused: no card awaiting one");
    return AnswerSubmitOut { accepted: false, outcome: None };
  };
  let Some(student_id) = turn.active_student.clone() else {
    // A roll requires a selected student, so a missing one here means the
    // turn is mid-reset. Bounce the submission.
    return AnswerSubmitOut { accepted: false, outcome: None };
  };
  let question = { state.board.read().await.get(&total).cloned() };
  let Some(question) = question else {
    debug!(target: "game", total, "answer refused: slot vanished under a board rebuild");
    return AnswerSubmitOut { accepted: false, outcome: None };
  };

  let correct = answers_match(answer, &question.answer);
  let outcome = AnswerOutcome {
    correct,
    points_awarded: if correct { question.points } else { 0 },
    correct_answer: if correct { None } else { Some(question.answer.clone()) },
  };
  let Some(epoch) = turn.engine.record_outcome(outcome.clone()) else {
    return AnswerSubmitOut { accepted: false, outcome: None };
  };
  drop(turn);

  if correct {
    // The verdict stands even if the score snapshot fails to hit disk; the
    // in-memory score is already updated and the failure is surfaced.
    if let Err(e) = state.add_points(&student_id, question.points).await {
      warn!(target: "game", student = %student_id, error = %e, "score update failed to persist");
      state.publish(ServerWsMessage::Error { message: "score update failed to persist".into() });
    }
  }
  info!(
    target: "game",
    epoch,
    student = %student_id,
    question_id = %question.id,
    correct,
    points = outcome.points_awarded,
    "answer settled"
  );
  state.publish(ServerWsMessage::AnswerSettled { outcome: outcome.clone() });
  schedule_settle(state.clone(), epoch);
  AnswerSubmitOut { accepted: true, outcome: Some(outcome) }
}

/// After the roll animation: flip the turn to `Shuffling`, wait out the
/// shuffle animation, then reveal the rolled card.
fn schedule_shuffle(state: AppState, epoch: u64) {
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(state.delays.roll_ms)).await;
    {
      let mut turn = state.turn.write().await;
      if !turn.engine.begin_shuffle(epoch) {
        debug!(target: "game", epoch, "shuffle continuation dropped: stale epoch");
        return;
      }
    }
    state.publish(ServerWsMessage::BoardShuffling);

    tokio::time::sleep(Duration::from_millis(state.delays.shuffle_ms)).await;
    // Clone the board before touching the turn lock; the reveal guard
    // re-checks the rolled total against this same snapshot.
    let board = { state.board.read().await.clone() };
    let revealed = {
      let mut turn = state.turn.write().await;
      turn.engine.reveal(epoch, &board)
    };
    match revealed.and_then(|total| board.get(&total).cloned().map(|q| (total, q))) {
      Some((total, question)) => {
        info!(target: "game", epoch, total, question_id = %question.id, "card revealed");
        state.publish(ServerWsMessage::CardRevealed { total, question });
      }
      None => debug!(target: "game", epoch, "reveal continuation dropped: stale epoch or missing slot"),
    }
  });
}

/// After the feedback window: return the turn to `Idle` unless a reset
/// already got there first.
fn schedule_settle(state: AppState, epoch: u64) {
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(state.delays.settle_ms)).await;
    let finished = {
      let mut turn = state.turn.write().await;
      turn.engine.finish_settle(epoch)
    };
    if finished {
      debug!(target: "game", epoch, "turn settled back to idle");
      state.publish(ServerWsMessage::TurnReset);
    } else {
      debug!(target: "game", epoch, "settle continuation dropped: stale epoch");
    }
  });
}
