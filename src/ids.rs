//! Sequential, human-readable id allocation for newly admitted records.
//!
//! Ids follow one shape per record kind: a fixed prefix, a dash, and a
//! zero-padded counter (`student-tag-07`, `question-tag-012`; the pad is a
//! floor, counters widen past it). The allocator continues from the highest
//! counter already present and never refills gaps, so deleting a record does
//! not recycle its id. These are convenience labels, not security-sensitive
//! identities.

use std::collections::HashSet;

use crate::domain::RecordKind;

/// The literal prefix a kind's ids carry.
pub fn id_prefix(kind: RecordKind) -> &'static str {
  match kind {
    RecordKind::Student => "student-tag",
    RecordKind::Question => "question-tag",
  }
}

/// Counter pad width per kind: rosters stay small, banks grow larger.
fn pad_width(kind: RecordKind) -> usize {
  match kind {
    RecordKind::Student => 2,
    RecordKind::Question => 3,
  }
}

/// Produce an id for `kind` that collides with nothing in `existing`.
///
/// The max-counter scan counts every `prefix-<digits>` id whatever the length
/// of the digit run, so counters keep climbing once they outgrow the pad and
/// a deleted wide id is never re-minted. Hand-edited ids the scan cannot
/// parse are covered by the free-slot walk afterwards, so the returned id is
/// unique against the *whole* existing set. Always succeeds: the candidate
/// space is unbounded.
pub fn generate_id<'a, I>(kind: RecordKind, existing: I) -> String
where
  I: IntoIterator<Item = &'a str>,
{
  let prefix = id_prefix(kind);
  let width = pad_width(kind);
  let taken: HashSet<&str> = existing.into_iter().collect();

  let max_seen = taken
    .iter()
    .filter_map(|id| counter_suffix(id, prefix))
    .max()
    .unwrap_or(0);

  let mut next = max_seen + 1;
  loop {
    let candidate = format!("{}-{:0w$}", prefix, next, w = width);
    if !taken.contains(candidate.as_str()) {
      return candidate;
    }
    next += 1;
  }
}

fn counter_suffix(id: &str, prefix: &str) -> Option<u64> {
  let digits = id.strip_prefix(prefix)?.strip_prefix('-')?;
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  digits.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gen(kind: RecordKind, ids: &[&str]) -> String {
    generate_id(kind, ids.iter().copied())
  }

  #[test]
  fn continues_from_the_highest_counter() {
    let ids = ["student-tag-01", "student-tag-02"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-03");
  }

  #[test]
  fn gaps_are_not_refilled() {
    let ids = ["student-tag-01", "student-tag-05"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-06");
  }

  #[test]
  fn counters_keep_climbing_past_the_pad_width() {
    let ids = ["student-tag-99", "student-tag-100"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-101");
  }

  #[test]
  fn a_wide_counter_outbids_padded_ones() {
    let ids = ["student-tag-05", "student-tag-100"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-101");
  }

  #[test]
  fn a_deleted_low_id_is_not_re_minted_behind_a_wide_counter() {
    // Only the wide id survives; the next mint must not recycle "-01".
    let ids = ["student-tag-100"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-101");
  }

  #[test]
  fn empty_collection_starts_at_one() {
    assert_eq!(gen(RecordKind::Student, &[]), "student-tag-01");
    assert_eq!(gen(RecordKind::Question, &[]), "question-tag-001");
  }

  #[test]
  fn foreign_and_malformed_ids_are_ignored_by_the_scan() {
    let ids = ["question-tag-004", "banana", "student-tag-xx", "student-tag-2-old"];
    assert_eq!(gen(RecordKind::Student, &ids), "student-tag-01");
  }

  #[test]
  fn question_ids_use_three_digit_padding() {
    let ids = ["question-tag-001", "question-tag-011"];
    assert_eq!(gen(RecordKind::Question, &ids), "question-tag-012");
  }
}
