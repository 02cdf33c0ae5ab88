//! Sibling ordering for branch-entry variants
//!
//! Variants are ordered by a fixed precedence list of their selector tags,
//! ties broken by variant letter. The no-tag variant is the catch-all and
//! belongs at the end, unless every entry is tagless.

use crate::error::DialogError;

/// Sort key of one branch entry: variant letter plus selector tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchVariant {
    pub letter: String,
    pub tags: Vec<String>,
}

impl BranchVariant {
    pub fn new(letter: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            letter: letter.into(),
            tags,
        }
    }
}

/// Order branch entries for insertion as siblings
///
/// `tag_precedence` lists every selector tag in its fixed display order; an
/// entry carrying a tag outside the list is an error.
pub fn order_branch_entries<T>(
    entries: Vec<(BranchVariant, T)>,
    tag_precedence: &[&str],
) -> Result<Vec<T>, DialogError> {
    let rank = |tag: &str| -> Result<usize, DialogError> {
        tag_precedence
            .iter()
            .position(|t| *t == tag)
            .ok_or_else(|| DialogError::UnknownVariantTag(tag.to_string()))
    };

    let mut keyed: Vec<(Vec<usize>, String, T)> = Vec::with_capacity(entries.len());
    for (variant, value) in entries {
        let ranks = variant
            .tags
            .iter()
            .map(|t| rank(t))
            .collect::<Result<Vec<usize>, _>>()?;
        keyed.push((ranks, variant.letter, value));
    }
    keyed.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    // empty-rank entries sort first; rotate them to the back so the
    // catch-all variant is checked last, unless everything is tagless
    let mut ordered: std::collections::VecDeque<(Vec<usize>, String, T)> = keyed.into();
    if ordered.back().is_some_and(|(ranks, _, _)| !ranks.is_empty()) {
        while ordered.front().is_some_and(|(ranks, _, _)| ranks.is_empty()) {
            if let Some(front) = ordered.pop_front() {
                ordered.push_back(front);
            }
        }
    }
    Ok(ordered.into_iter().map(|(_, _, value)| value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRECEDENCE: &[&str] = &["dwarf", "short", "dragonborn", "strong", "female"];

    fn v(letter: &str, tags: &[&str]) -> BranchVariant {
        BranchVariant::new(letter, tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_tagless_rotates_to_end() {
        let entries = vec![
            (v("B", &[]), "b-any"),
            (v("A", &["strong"]), "a-strong"),
            (v("A", &[]), "a-any"),
            (v("A", &["dwarf"]), "a-dwarf"),
        ];
        let ordered = order_branch_entries(entries, PRECEDENCE).unwrap();
        assert_eq!(ordered, vec!["a-dwarf", "a-strong", "a-any", "b-any"]);
    }

    #[test]
    fn test_all_tagless_keeps_letter_order() {
        let entries = vec![(v("B", &[]), "b"), (v("A", &[]), "a")];
        let ordered = order_branch_entries(entries, PRECEDENCE).unwrap();
        assert_eq!(ordered, vec!["a", "b"]);
    }

    #[test]
    fn test_tag_rank_dominates_letter() {
        let entries = vec![
            (v("A", &["strong"]), "a-strong"),
            (v("B", &["dwarf"]), "b-dwarf"),
        ];
        let ordered = order_branch_entries(entries, PRECEDENCE).unwrap();
        assert_eq!(ordered, vec!["b-dwarf", "a-strong"]);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let entries = vec![(v("A", &["giant"]), "a")];
        assert!(matches!(
            order_branch_entries(entries, PRECEDENCE),
            Err(DialogError::UnknownVariantTag(_))
        ));
    }
}
