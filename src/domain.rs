//! Domain models used by the backend: questions, students, dice modes, and
//! the tagged record/conflict shapes shared by the import pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One card's worth of material: what is asked, what counts as correct,
/// and how many points a correct answer earns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  #[serde(default)] pub id: String,
  pub question: String,
  pub answer: String,
  #[serde(default)] pub points: u32,
}

/// A roster entry. `score` only ever grows, except for the explicit
/// bulk reset-all-scores operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  #[serde(default)] pub id: String,
  pub name: String,
  #[serde(default)] pub score: u32,
}

/// How many dice are in play. Serialized as the plain number the frontend
/// sends (`1` or `2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiceCount {
  One,
  Two,
}

impl DiceCount {
  pub fn num_dice(self) -> u8 {
    match self { DiceCount::One => 1, DiceCount::Two => 2 }
  }

  /// Smallest reachable roll total (1 with one die, 2 with two).
  pub fn min_roll(self) -> u8 {
    self.num_dice()
  }

  /// Largest reachable roll total (6 with one die, 12 with two).
  pub fn max_roll(self) -> u8 {
    6 * self.num_dice()
  }

  /// Number of addressable board slots: 6 or 11.
  pub fn num_slots(self) -> usize {
    (self.max_roll() - self.min_roll() + 1) as usize
  }
}

impl Default for DiceCount {
  fn default() -> Self { DiceCount::Two }
}

impl From<DiceCount> for u8 {
  fn from(dc: DiceCount) -> u8 { dc.num_dice() }
}

impl TryFrom<u8> for DiceCount {
  type Error = String;
  fn try_from(n: u8) -> Result<Self, Self::Error> {
    match n {
      1 => Ok(DiceCount::One),
      2 => Ok(DiceCount::Two),
      other => Err(format!("numDice must be 1 or 2, got {}", other)),
    }
  }
}

/// Game-wide settings the admin can change at runtime.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct GameSettings {
  #[serde(rename = "numDice")] pub num_dice: DiceCount,
}

/// Roll-total -> question mapping for the active dice mode. Derived from the
/// question pool, fully rebuilt on every pool or dice-mode change, never
/// persisted. Entries are owned clones so edits to the bank cannot alias a
/// board mid-turn.
pub type GameBoard = BTreeMap<u8, Question>;

/// Which collection an import payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
  Student,
  Question,
}

impl RecordKind {
  /// Human label used in log lines and error messages.
  pub fn label(self) -> &'static str {
    match self { RecordKind::Student => "student", RecordKind::Question => "question" }
  }
}

/// Union over the two importable shapes. The import endpoint fixes the kind
/// up front, so items never need field probing to tell them apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
  Student(Student),
  Question(Question),
}

impl Record {
  pub fn kind(&self) -> RecordKind {
    match self {
      Record::Student(_) => RecordKind::Student,
      Record::Question(_) => RecordKind::Question,
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Record::Student(s) => &s.id,
      Record::Question(q) => &q.id,
    }
  }

  pub fn set_id(&mut self, id: String) {
    match self {
      Record::Student(s) => s.id = id,
      Record::Question(q) => q.id = id,
    }
  }

  /// One-line description for conflict listings and logs.
  pub fn summary(&self) -> String {
    match self {
      Record::Student(s) => format!("name: {}", s.name),
      Record::Question(q) => {
        let text: String = q.question.chars().take(30).collect();
        format!("question: {}", text)
      }
    }
  }
}

/// Duplicate identifiers inside a single imported document: every item that
/// shared the id, in file order.
#[derive(Clone, Debug, Serialize)]
pub struct IntraConflict {
  pub id: String,
  pub items: Vec<Record>,
}

/// An imported identifier already present in the live collection.
#[derive(Clone, Debug, Serialize)]
pub struct InterConflict {
  pub id: String,
  pub original: Record,
  pub imported: Record,
}
