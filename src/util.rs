//! Small utility helpers used across modules.

/// Canonical form used when comparing a submitted answer against the stored
/// one: surrounding whitespace dropped, then lowercased. Comparison is exact
/// equality on this form.
pub fn normalize_answer(s: &str) -> String {
  s.trim().to_lowercase()
}

/// True when `submitted` matches `expected` under answer normalization.
pub fn answers_match(submitted: &str, expected: &str) -> bool {
  normalize_answer(submitted) == normalize_answer(expected)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge import payloads. Cuts on a char boundary,
/// so multi-byte input never panics the logger.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let cut = s
    .char_indices()
    .map(|(i, _)| i)
    .take_while(|&i| i <= max)
    .last()
    .unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn answer_matching_ignores_case_and_surrounding_whitespace() {
    assert!(answers_match(" Paris ", "paris"));
    assert!(answers_match("paris", "  PARIS"));
    assert!(!answers_match("pariss", "paris"));
    // Interior whitespace still counts.
    assert!(!answers_match("pa ris", "paris"));
  }

  #[test]
  fn trunc_keeps_short_strings_intact() {
    assert_eq!(trunc_for_log("abc", 10), "abc");
    assert!(trunc_for_log(&"x".repeat(50), 10).contains("50 bytes"));
  }

  #[test]
  fn trunc_never_splits_a_multibyte_char() {
    // "é" is two bytes; a byte-offset cut at 3 would land mid-char.
    let s = "ééééé";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('é'));
    assert!(out.contains("10 bytes"));
  }
}
