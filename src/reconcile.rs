//! Two-stage import reconciliation.
//!
//! Stage one collects duplicate ids inside the imported document itself and
//! suspends until the admin has given every conflicting record a distinct,
//! non-empty id. Stage two walks the resulting working set against the live
//! collection and surfaces id collisions one at a time, each resolved as
//! `keep`, `replace`, or `add_as_new`. Nothing is created until the queue
//! drains; `replace` resolutions are the one exception and write through
//! immediately.
//!
//! The session here is pure bookkeeping. The caller owns the live
//! collections and performs the actual writes, feeding lookups in through
//! closures so the pipeline never holds a reference into shared state.

use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{InterConflict, IntraConflict, Question, Record, RecordKind, Student};
use crate::error::AppError;
use crate::ids;

/// Admin decision for one inter-file collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
  Keep,
  Replace,
  AddAsNew,
}

/// What one resolution step asks of the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ConflictOutcome {
  /// Imported record discarded; nothing to do.
  Kept,
  /// Overwrite the live record at this id now.
  Replaced(Record),
  /// Imported record re-identified and queued for the final create pass.
  AddedAsNew { id: String },
}

/// Final tally reported when a pipeline runs to completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
  pub created: usize,
  pub replaced: usize,
  pub kept: usize,
  pub failed: usize,
}

/// Parse an import payload as a JSON array of the declared record kind.
/// Anything else is a `MalformedImport` and the pipeline never starts.
pub fn parse_import(kind: RecordKind, payload: &str) -> Result<Vec<Record>, AppError> {
  let parsed = match kind {
    RecordKind::Question => serde_json::from_str::<Vec<Question>>(payload)
      .map(|qs| qs.into_iter().map(Record::Question).collect::<Vec<_>>()),
    RecordKind::Student => serde_json::from_str::<Vec<Student>>(payload)
      .map(|ss| ss.into_iter().map(Record::Student).collect::<Vec<_>>()),
  };
  parsed.map_err(|err| {
    AppError::MalformedImport(format!(
      "import must be a JSON array of {} records: {}",
      kind.label(),
      err
    ))
  })
}

/// Parse individually supplied records (stage-one resolutions) as `kind`.
pub fn parse_records(
  kind: RecordKind,
  values: Vec<serde_json::Value>,
) -> Result<Vec<Record>, AppError> {
  values
    .into_iter()
    .map(|value| {
      let parsed = match kind {
        RecordKind::Question => {
          serde_json::from_value::<Question>(value).map(Record::Question)
        }
        RecordKind::Student => serde_json::from_value::<Student>(value).map(Record::Student),
      };
      parsed.map_err(|err| {
        AppError::ValidationRejected(format!(
          "resolved record is not a valid {}: {}",
          kind.label(),
          err
        ))
      })
    })
    .collect()
}

/// One suspended-and-resumable import run. At most one exists at a time.
#[derive(Debug)]
pub struct ImportSession {
  kind: RecordKind,
  /// Duplicate-id groups awaiting stage-one resolution.
  intra: Vec<IntraConflict>,
  /// Working set not yet collision-checked (file order).
  clean: Vec<Record>,
  /// Stage-two collisions, presented front-first in discovery order.
  queue: VecDeque<InterConflict>,
  /// Records cleared for the final create pass.
  pending: Vec<Record>,
  kept: usize,
  replaced: usize,
}

impl ImportSession {
  /// Split the imported records into the non-conflicting working set and the
  /// duplicate-id groups. Collision detection runs later, once (and if) the
  /// duplicate stage clears.
  pub fn new(kind: RecordKind, items: Vec<Record>) -> Self {
    let total = items.len();
    let (clean, intra) = split_duplicates(items);
    if intra.is_empty() {
      debug!(target: "import", kind = kind.label(), records = total, "no duplicate ids in import");
    } else {
      info!(
        target: "import",
        kind = kind.label(),
        records = total,
        groups = intra.len(),
        "import suspended on duplicate ids"
      );
    }
    Self {
      kind,
      intra,
      clean,
      queue: VecDeque::new(),
      pending: Vec::new(),
      kept: 0,
      replaced: 0,
    }
  }

  pub fn kind(&self) -> RecordKind {
    self.kind
  }

  pub fn needs_duplicate_resolution(&self) -> bool {
    !self.intra.is_empty()
  }

  /// Stage-one groups, in first-appearance order.
  pub fn duplicate_groups(&self) -> &[IntraConflict] {
    &self.intra
  }

  /// The collision currently awaiting a decision, if any.
  pub fn current_conflict(&self) -> Option<&InterConflict> {
    self.queue.front()
  }

  /// Collisions not yet surfaced (the current one included).
  pub fn conflicts_remaining(&self) -> usize {
    self.queue.len()
  }

  /// Records cleared for the final create pass so far.
  pub fn pending_creates(&self) -> usize {
    self.pending.len()
  }

  pub fn tally(&self) -> (usize, usize) {
    (self.kept, self.replaced)
  }

  /// True once both stages are clear and only the create pass remains.
  pub fn ready_to_commit(&self) -> bool {
    self.intra.is_empty() && self.clean.is_empty() && self.queue.is_empty()
  }

  /// Accept the admin's re-identified records for every duplicate group.
  ///
  /// Acceptance requires one record per conflicted item and, across the whole
  /// resolved set, non-empty pairwise-distinct ids. On rejection the groups
  /// stay as they were and the session remains suspended.
  pub fn resolve_duplicates(&mut self, resolved: Vec<Record>) -> Result<(), AppError> {
    if self.intra.is_empty() {
      return Err(AppError::Conflict(
        "no duplicate resolution is awaited".to_string(),
      ));
    }
    let expected: usize = self.intra.iter().map(|g| g.items.len()).sum();
    if resolved.len() != expected {
      return Err(AppError::ValidationRejected(format!(
        "expected {} resolved records, got {}",
        expected,
        resolved.len()
      )));
    }
    validate_resolved_ids(&resolved)?;

    info!(target: "import", records = resolved.len(), "duplicate ids resolved");
    self.intra.clear();
    self.clean.extend(resolved);
    Ok(())
  }

  /// Run collision detection over the working set against the live
  /// collection. A hit joins the queue with a snapshot of the live record;
  /// a miss goes straight to the pending-create set.
  pub fn detect_collisions<F>(&mut self, mut live: F)
  where
    F: FnMut(&str) -> Option<Record>,
  {
    for item in mem::take(&mut self.clean) {
      match live(item.id()) {
        Some(original) => self.queue.push_back(InterConflict {
          id: item.id().to_string(),
          original,
          imported: item,
        }),
        None => self.pending.push(item),
      }
    }
    if !self.queue.is_empty() {
      info!(
        target: "import",
        kind = self.kind.label(),
        collisions = self.queue.len(),
        "import suspended on id collisions"
      );
    }
  }

  /// Decide the front collision. `live_ids` seeds the allocator for
  /// `add_as_new`; ids already queued for creation are counted too, so two
  /// renames in one session cannot mint the same id.
  pub fn resolve_conflict<'a, I>(
    &mut self,
    resolution: Resolution,
    live_ids: I,
  ) -> Result<ConflictOutcome, AppError>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let conflict = self
      .queue
      .pop_front()
      .ok_or_else(|| AppError::Conflict("no import collision is awaited".to_string()))?;

    let outcome = match resolution {
      Resolution::Keep => {
        self.kept += 1;
        ConflictOutcome::Kept
      }
      Resolution::Replace => {
        self.replaced += 1;
        ConflictOutcome::Replaced(conflict.imported)
      }
      Resolution::AddAsNew => {
        // Owned snapshot of the taken ids; the allocator's borrow has to end
        // before the admission into `pending` below.
        let mut taken: Vec<String> = live_ids.into_iter().map(str::to_owned).collect();
        taken.extend(self.pending.iter().map(|r| r.id().to_owned()));
        let id = ids::generate_id(self.kind, taken.iter().map(String::as_str));
        let mut item = conflict.imported;
        item.set_id(id.clone());
        self.pending.push(item);
        ConflictOutcome::AddedAsNew { id }
      }
    };
    info!(
      target: "import",
      id = %conflict.id,
      resolution = ?resolution,
      remaining = self.queue.len(),
      "import collision resolved"
    );
    Ok(outcome)
  }

  /// Drain the records cleared for creation, in working-set order
  /// (file order first, then `add_as_new` admissions in resolution order).
  pub fn take_pending(&mut self) -> Vec<Record> {
    mem::take(&mut self.pending)
  }
}

/// Group records sharing an id, preserving first-appearance order of both the
/// groups and the members within each group. Records whose id is unique pass
/// through untouched. Absent ids deserialize as `""` and group together.
fn split_duplicates(items: Vec<Record>) -> (Vec<Record>, Vec<IntraConflict>) {
  let mut counts: HashMap<String, usize> = HashMap::new();
  for item in &items {
    *counts.entry(item.id().to_string()).or_insert(0) += 1;
  }

  let mut clean = Vec::new();
  let mut groups: Vec<IntraConflict> = Vec::new();
  let mut group_index: HashMap<String, usize> = HashMap::new();
  for item in items {
    if counts[item.id()] < 2 {
      clean.push(item);
      continue;
    }
    let id = item.id().to_string();
    match group_index.get(&id) {
      Some(&at) => groups[at].items.push(item),
      None => {
        group_index.insert(id.clone(), groups.len());
        groups.push(IntraConflict { id, items: vec![item] });
      }
    }
  }
  (clean, groups)
}

fn validate_resolved_ids(resolved: &[Record]) -> Result<(), AppError> {
  let mut seen: HashSet<&str> = HashSet::new();
  for record in resolved {
    let id = record.id();
    if id.trim().is_empty() {
      return Err(AppError::ValidationRejected(
        "every resolved record needs a non-empty id".to_string(),
      ));
    }
    if !seen.insert(id) {
      return Err(AppError::ValidationRejected(format!(
        "id '{}' is still used more than once",
        id
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(id: &str, text: &str) -> Record {
    Record::Question(Question {
      id: id.to_string(),
      question: text.to_string(),
      answer: "ans".to_string(),
      points: 5,
    })
  }

  fn live_none(_: &str) -> Option<Record> {
    None
  }

  #[test]
  fn malformed_payload_is_rejected_before_the_pipeline_starts() {
    let err = parse_import(RecordKind::Question, r#"{"questions": []}"#).unwrap_err();
    assert!(matches!(err, AppError::MalformedImport(_)));

    let err = parse_import(RecordKind::Question, r#"[1, 2]"#).unwrap_err();
    assert!(matches!(err, AppError::MalformedImport(_)));
  }

  #[test]
  fn absent_id_and_points_fields_default() {
    let records =
      parse_import(RecordKind::Question, r#"[{"question": "q", "answer": "a"}]"#).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), "");
    match &records[0] {
      Record::Question(q) => assert_eq!(q.points, 0),
      other => panic!("unexpected record: {:?}", other),
    }
  }

  #[test]
  fn clean_import_flows_straight_to_pending() {
    let mut session = ImportSession::new(
      RecordKind::Question,
      vec![q("question-tag-001", "one"), q("question-tag-002", "two")],
    );
    assert!(!session.needs_duplicate_resolution());

    session.detect_collisions(live_none);
    assert!(session.ready_to_commit());

    let pending = session.take_pending();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id(), "question-tag-001");
    assert_eq!(pending[1].id(), "question-tag-002");
  }

  #[test]
  fn duplicate_ids_suspend_the_pipeline_until_resolved() {
    let mut session = ImportSession::new(
      RecordKind::Question,
      vec![q("Q-1", "first"), q("Q-1", "second")],
    );
    assert!(session.needs_duplicate_resolution());
    assert!(!session.ready_to_commit());
    assert_eq!(session.duplicate_groups().len(), 1);
    assert_eq!(session.duplicate_groups()[0].items.len(), 2);

    // Still duplicated: rejected, session stays suspended.
    let err = session
      .resolve_duplicates(vec![q("Q-1", "first"), q("Q-1", "second")])
      .unwrap_err();
    assert!(matches!(err, AppError::ValidationRejected(_)));
    assert!(session.needs_duplicate_resolution());

    // Blank id: rejected.
    let err = session
      .resolve_duplicates(vec![q("Q-1", "first"), q("  ", "second")])
      .unwrap_err();
    assert!(matches!(err, AppError::ValidationRejected(_)));

    session
      .resolve_duplicates(vec![q("Q-1", "first"), q("Q-2", "second")])
      .unwrap();
    session.detect_collisions(live_none);
    assert!(session.ready_to_commit());
    assert_eq!(session.take_pending().len(), 2);
  }

  #[test]
  fn resolution_must_cover_every_conflicted_record() {
    let mut session = ImportSession::new(
      RecordKind::Question,
      vec![q("Q-1", "first"), q("Q-1", "second")],
    );
    let err = session.resolve_duplicates(vec![q("Q-1", "first")]).unwrap_err();
    assert!(matches!(err, AppError::ValidationRejected(_)));
  }

  #[test]
  fn groups_keep_first_appearance_order() {
    let session = ImportSession::new(
      RecordKind::Question,
      vec![
        q("x", "a"),
        q("y", "b"),
        q("x", "c"),
        q("z", "d"),
        q("y", "e"),
      ],
    );
    let groups = session.duplicate_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].id, "x");
    assert_eq!(groups[1].id, "y");
    match (&groups[0].items[0], &groups[0].items[1]) {
      (Record::Question(first), Record::Question(second)) => {
        assert_eq!(first.question, "a");
        assert_eq!(second.question, "c");
      }
      other => panic!("unexpected records: {:?}", other),
    }
  }

  #[test]
  fn records_without_ids_group_together() {
    let session = ImportSession::new(
      RecordKind::Question,
      vec![q("", "a"), q("", "b"), q("Q-9", "c")],
    );
    let groups = session.duplicate_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, "");
    assert_eq!(groups[0].items.len(), 2);
  }

  #[test]
  fn collisions_surface_one_at_a_time() {
    let mut session = ImportSession::new(
      RecordKind::Question,
      vec![q("question-tag-001", "new one"), q("question-tag-002", "new two")],
    );
    session.detect_collisions(|id| match id {
      "question-tag-001" => Some(q("question-tag-001", "live one")),
      "question-tag-002" => Some(q("question-tag-002", "live two")),
      _ => None,
    });

    assert_eq!(session.conflicts_remaining(), 2);
    let first = session.current_conflict().unwrap().clone();
    assert_eq!(first.id, "question-tag-001");

    let second_before = session.queue[1].clone();
    session
      .resolve_conflict(Resolution::Keep, std::iter::empty::<&str>())
      .unwrap();

    // Resolving the first leaves the second's entry untouched.
    let second_after = session.current_conflict().unwrap();
    assert_eq!(second_after.id, second_before.id);
    assert_eq!(second_after.imported, second_before.imported);
    assert_eq!(second_after.original, second_before.original);
    assert_eq!(session.conflicts_remaining(), 1);
  }

  #[test]
  fn keep_discards_the_imported_record() {
    let mut session = ImportSession::new(RecordKind::Question, vec![q("question-tag-001", "new")]);
    session.detect_collisions(|_| Some(q("question-tag-001", "live")));

    let outcome = session
      .resolve_conflict(Resolution::Keep, std::iter::empty::<&str>())
      .unwrap();
    assert_eq!(outcome, ConflictOutcome::Kept);
    assert!(session.ready_to_commit());
    assert!(session.take_pending().is_empty());
    assert_eq!(session.tally(), (1, 0));
  }

  #[test]
  fn replace_hands_back_the_imported_record() {
    let mut session = ImportSession::new(RecordKind::Question, vec![q("question-tag-001", "new")]);
    session.detect_collisions(|_| Some(q("question-tag-001", "live")));

    let outcome = session
      .resolve_conflict(Resolution::Replace, std::iter::empty::<&str>())
      .unwrap();
    assert_eq!(outcome, ConflictOutcome::Replaced(q("question-tag-001", "new")));
    assert_eq!(session.tally(), (0, 1));
  }

  #[test]
  fn add_as_new_mints_against_live_and_pending_ids() {
    let live = ["question-tag-001", "question-tag-002"];
    let mut session = ImportSession::new(
      RecordKind::Question,
      vec![q("question-tag-001", "newer one"), q("question-tag-002", "newer two")],
    );
    session.detect_collisions(|id| live.contains(&id).then(|| q(id, "live")));

    let first = session
      .resolve_conflict(Resolution::AddAsNew, live.iter().copied())
      .unwrap();
    let second = session
      .resolve_conflict(Resolution::AddAsNew, live.iter().copied())
      .unwrap();

    // The second mint sees the first pending id even though it is not live yet.
    assert_eq!(first, ConflictOutcome::AddedAsNew { id: "question-tag-003".to_string() });
    assert_eq!(second, ConflictOutcome::AddedAsNew { id: "question-tag-004".to_string() });

    let pending = session.take_pending();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id(), "question-tag-003");
    assert_eq!(pending[1].id(), "question-tag-004");
  }

  #[test]
  fn resolving_without_a_pending_collision_is_an_error() {
    let mut session = ImportSession::new(RecordKind::Question, vec![q("question-tag-001", "one")]);
    session.detect_collisions(live_none);
    let err = session
      .resolve_conflict(Resolution::Keep, std::iter::empty::<&str>())
      .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
  }

  #[test]
  fn mixed_import_orders_creates_as_file_then_renames() {
    let mut session = ImportSession::new(
      RecordKind::Student,
      vec![
        Record::Student(Student { id: "student-tag-05".into(), name: "Ada".into(), score: 0 }),
        Record::Student(Student { id: "student-tag-01".into(), name: "Grace".into(), score: 0 }),
      ],
    );
    session.detect_collisions(|id| {
      (id == "student-tag-01").then(|| {
        Record::Student(Student { id: "student-tag-01".into(), name: "Old Grace".into(), score: 3 })
      })
    });

    // The pending "student-tag-05" outbids the live "student-tag-01" in the
    // counter scan, so the mint continues from 05.
    let outcome = session
      .resolve_conflict(Resolution::AddAsNew, ["student-tag-01"].into_iter())
      .unwrap();
    assert_eq!(outcome, ConflictOutcome::AddedAsNew { id: "student-tag-06".to_string() });

    let pending = session.take_pending();
    assert_eq!(pending[0].id(), "student-tag-05");
    assert_eq!(pending[1].id(), "student-tag-06");
  }
}
