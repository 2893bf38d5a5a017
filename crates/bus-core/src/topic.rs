//! Topic pattern handling for the query surface.
//!
//! # Wildcards
//!
//! A bus topic pattern may end in `#` (match any suffix of segments)
//! or contain `+` (match exactly one segment). Both are translated to
//! the SQL `LIKE` wildcard `%`, which is substring-style matching: a
//! `+` pattern can therefore over-match multi-level topics
//! (`home/+/temp` also matches `home/a/b/temp`). This is documented
//! behavior; callers that need exact segment semantics must
//! post-filter.

/// Translate a bus topic pattern to a SQL `LIKE` pattern.
pub fn pattern_to_like(pattern: &str) -> String {
    pattern.replace('#', "%").replace('+', "%")
}
