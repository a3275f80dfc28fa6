//! Game-board assignment: map every reachable roll total to one question.
//!
//! The pool is borrowed for the duration of one computation, shuffled
//! (Fisher–Yates, via `SliceRandom::shuffle`) and laid out cyclically across
//! the slots, so a pool smaller than the slot count repeats questions in
//! shuffled order. Each rebuild reshuffles from scratch; nothing is carried
//! over between boards.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{DiceCount, GameBoard, Question};

/// Build the board for the given pool and dice mode.
///
/// Empty pool -> empty board ("game not ready"). Otherwise the result has one
/// entry for every roll total in `[min_roll, max_roll]`, each an owned clone
/// of a pool question. Pure function of its inputs plus `rng`; linear in pool
/// size plus slot count.
pub fn build_board<R: Rng>(questions: &[Question], dice: DiceCount, rng: &mut R) -> GameBoard {
  let mut board = GameBoard::new();
  if questions.is_empty() {
    return board;
  }

  let mut shuffled: Vec<&Question> = questions.iter().collect();
  shuffled.shuffle(rng);

  for k in 0..dice.num_slots() {
    let roll = dice.min_roll() + k as u8;
    board.insert(roll, shuffled[k % shuffled.len()].clone());
  }
  board
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn pool(n: usize) -> Vec<Question> {
    (0..n)
      .map(|i| Question {
        id: format!("question-tag-{:03}", i + 1),
        question: format!("Q{}", i + 1),
        answer: format!("A{}", i + 1),
        points: 10,
      })
      .collect()
  }

  #[test]
  fn covers_every_roll_total_with_no_gaps() {
    let mut rng = StdRng::seed_from_u64(1);
    for dice in [DiceCount::One, DiceCount::Two] {
      for n in 1..=14 {
        let board = build_board(&pool(n), dice, &mut rng);
        let keys: Vec<u8> = board.keys().copied().collect();
        let expected: Vec<u8> = (dice.min_roll()..=dice.max_roll()).collect();
        assert_eq!(keys, expected, "pool of {} with {:?} dice", n, dice);
      }
    }
  }

  #[test]
  fn empty_pool_gives_empty_board() {
    let mut rng = StdRng::seed_from_u64(2);
    assert!(build_board(&[], DiceCount::One, &mut rng).is_empty());
    assert!(build_board(&[], DiceCount::Two, &mut rng).is_empty());
  }

  #[test]
  fn small_pool_repeats_questions_cyclically() {
    let mut rng = StdRng::seed_from_u64(3);
    let board = build_board(&pool(3), DiceCount::Two, &mut rng);
    assert_eq!(board.len(), 11);
    for q in pool(3) {
      let uses = board.values().filter(|b| b.id == q.id).count();
      // 11 slots over 3 questions: cyclic fill gives 4/4/3.
      assert!((3..=4).contains(&uses), "{} used {} times", q.id, uses);
    }
  }

  #[test]
  fn shuffle_places_each_question_in_each_slot_roughly_uniformly() {
    let mut rng = StdRng::seed_from_u64(4);
    let questions = pool(6);
    let trials = 3000usize;
    // counts[slot][question]
    let mut counts = [[0usize; 6]; 6];

    for _ in 0..trials {
      let board = build_board(&questions, DiceCount::One, &mut rng);
      for (roll, q) in &board {
        let slot = (roll - 1) as usize;
        let qi = questions.iter().position(|x| x.id == q.id).unwrap();
        counts[slot][qi] += 1;
      }
    }

    let expected = trials / 6;
    for (slot, row) in counts.iter().enumerate() {
      for (qi, &c) in row.iter().enumerate() {
        assert!(
          c > expected / 2 && c < expected * 2,
          "question {} landed in slot {} {} times (expected ~{})",
          qi, slot, c, expected
        );
      }
    }
  }

  #[test]
  fn identical_seed_reproduces_the_same_board() {
    let questions = pool(9);
    let a = build_board(&questions, DiceCount::Two, &mut StdRng::seed_from_u64(5));
    let b = build_board(&questions, DiceCount::Two, &mut StdRng::seed_from_u64(5));
    assert_eq!(a, b);
  }
}
