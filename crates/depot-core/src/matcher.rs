//! Similarity-Based Item Matcher.
//!
//! Infers the owning item of a stored file from, in priority order:
//! 1. a recorded binding whose path contains the file's relative path
//! 2. the `category/type` prefix of the relative path (hard filter)
//! 3. a score of name similarity, embedded ids and details overlap
//!
//! Everything here is pure: same inputs, same answer.

use once_cell::sync::Lazy;
use regex::Regex;
use similar::TextDiff;

use crate::defaults::{MATCH_DETAILS_BONUS, MATCH_ID_BONUS};
use crate::file_safety::split_extension;
use crate::models::{Item, StaticBinding};

static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"item[_-]?(\d+)",
        r"(\d+)[_-]",
        r"^(\d+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("id pattern is a valid regex"))
    .collect()
});

/// Strip `prefix` from a stored binding path when present.
pub fn strip_view_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return path;
    }
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Numeric ids embedded in a (lowercased, extension-stripped) filename.
///
/// Each pattern contributes at most its first match.
pub fn extract_ids(filename_base: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for pattern in ID_PATTERNS.iter() {
        let id = pattern
            .captures(filename_base)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok());
        if let Some(id) = id {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Normalized similarity ratio in `[0, 1]` between two strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Whether the item's details textually overlap the filename.
fn details_overlap(details: &str, filename: &str) -> bool {
    let details = details.to_lowercase();
    let filename = filename.to_lowercase();
    if filename.is_empty() {
        return false;
    }
    details.contains(&filename) || details.split_whitespace().any(|t| filename.contains(t))
}

/// Score one candidate item against a filename.
pub fn score_candidate(filename: &str, item: &Item) -> f64 {
    let (stem, _) = split_extension(filename);
    let base = stem.to_lowercase();

    let mut score = similarity_ratio(&base, &item.name.to_lowercase());

    if extract_ids(&base).contains(&item.item_id) {
        score += MATCH_ID_BONUS;
    }

    if let Some(details) = item.details.as_deref().filter(|d| !d.trim().is_empty()) {
        if details_overlap(details, filename) {
            score += MATCH_DETAILS_BONUS;
        }
    }

    score
}

/// Infers item ownership of stored files.
#[derive(Debug, Clone, Default)]
pub struct ItemMatcher {
    view_prefix: String,
}

impl ItemMatcher {
    /// `view_prefix` is stripped from binding paths before comparison.
    pub fn new(view_prefix: impl Into<String>) -> Self {
        Self {
            view_prefix: view_prefix.into(),
        }
    }

    /// Item id bound to a path containing `relative_path`, if any.
    pub fn bound_item(&self, relative_path: &str, bindings: &[StaticBinding]) -> Option<i64> {
        if relative_path.is_empty() {
            return None;
        }
        bindings.iter().find_map(|binding| {
            let path = binding.item_path.as_deref().filter(|p| !p.is_empty())?;
            strip_view_prefix(path, &self.view_prefix)
                .contains(relative_path)
                .then_some(binding.item_id)
        })
    }

    /// Predict the owning item of the file at `relative_path` (`/`-separated,
    /// relative to the storage root) named `filename`.
    pub fn predict_item_id(
        &self,
        relative_path: &str,
        filename: &str,
        items: &[Item],
        bindings: &[StaticBinding],
    ) -> Option<i64> {
        if let Some(item_id) = self.bound_item(relative_path, bindings) {
            return Some(item_id);
        }

        let mut segments = relative_path.split('/').filter(|s| !s.is_empty());
        let (category, item_type) = match (segments.next(), segments.next()) {
            (Some(c), Some(t)) => (c, t),
            _ => return None,
        };

        let mut candidates: Vec<(i64, f64)> = items
            .iter()
            .filter(|item| {
                item.category.trim() == category && item.item_type.trim() == item_type
            })
            .map(|item| (item.item_id, score_candidate(filename, item)))
            .collect();

        // Stable: ties keep catalog order.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.first().map(|(item_id, _)| *item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "http://localhost:3000/files/view/";

    fn matcher() -> ItemMatcher {
        ItemMatcher::new(PREFIX)
    }

    #[test]
    fn test_binding_match_short_circuits() {
        let items = vec![Item::new(9, "reports", "pdf", "q1")];
        let bindings = vec![StaticBinding::new(5, format!("{}archive/reports/q1.pdf", PREFIX))];

        let id = matcher().predict_item_id("reports/q1.pdf", "q1.pdf", &items, &bindings);
        assert_eq!(id, Some(5));
    }

    #[test]
    fn test_binding_without_path_is_ignored() {
        let items = vec![Item::new(3, "docs", "pdf", "guide")];
        let bindings = vec![StaticBinding {
            item_id: 1,
            item_path: None,
        }];

        let id = matcher().predict_item_id("docs/pdf/guide.pdf", "guide.pdf", &items, &bindings);
        assert_eq!(id, Some(3));
    }

    #[test]
    fn test_requires_two_segments() {
        let items = vec![Item::new(1, "docs", "pdf", "readme")];
        assert_eq!(matcher().predict_item_id("readme.pdf", "readme.pdf", &items, &[]), None);
    }

    #[test]
    fn test_category_type_filter_is_exact() {
        let items = vec![
            Item::new(1, "docs", "txt", "report"),
            Item::new(2, "Docs", "pdf", "report"),
        ];
        assert_eq!(
            matcher().predict_item_id("docs/pdf/report.pdf", "report.pdf", &items, &[]),
            None
        );
    }

    #[test]
    fn test_category_type_with_padding_still_matches() {
        // Placement trims segments, so "docs/pdf" on disk belongs to " docs "/"pdf ".
        let items = vec![Item::new(4, " docs ", "pdf ", "guide")];
        let id = matcher().predict_item_id("docs/pdf/guide.pdf", "guide.pdf", &items, &[]);
        assert_eq!(id, Some(4));
    }

    #[test]
    fn test_single_candidate_wins() {
        let items = vec![Item::new(7, "docs", "pdf", "Annual Report")];
        let id = matcher().predict_item_id(
            "docs/pdf/annual_report_7.pdf",
            "annual_report_7.pdf",
            &items,
            &[],
        );
        assert_eq!(id, Some(7));
    }

    #[test]
    fn test_filename_id_boost_beats_closer_name() {
        let items = vec![
            Item::new(8, "docs", "pdf", "item"),
            Item::new(7, "docs", "pdf", "item_seven"),
        ];
        let id = matcher().predict_item_id("docs/pdf/item_7.pdf", "item_7.pdf", &items, &[]);
        assert_eq!(id, Some(7));
    }

    #[test]
    fn test_trailing_number_is_not_an_id() {
        let items = vec![
            Item::new(3, "docs", "pdf", "qqqqq"),
            Item::new(4, "docs", "pdf", "ph"),
        ];
        let id = matcher().predict_item_id("docs/pdf/photo_3.pdf", "photo_3.pdf", &items, &[]);
        assert_eq!(id, Some(4));
    }

    #[test]
    fn test_details_bonus() {
        let items = vec![
            Item::new(1, "img", "png", "photo"),
            Item::new(2, "img", "png", "photo").with_details("taken at the beach sunset"),
        ];
        let id = matcher().predict_item_id("img/png/sunset.png", "sunset.png", &items, &[]);
        assert_eq!(id, Some(2));
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let items = vec![
            Item::new(11, "docs", "pdf", "same"),
            Item::new(12, "docs", "pdf", "same"),
        ];
        let m = matcher();
        for _ in 0..5 {
            assert_eq!(
                m.predict_item_id("docs/pdf/same.pdf", "same.pdf", &items, &[]),
                Some(11)
            );
        }
    }

    #[test]
    fn test_extract_ids() {
        assert_eq!(extract_ids("item_42"), vec![42]);
        assert_eq!(extract_ids("item-42"), vec![42]);
        assert_eq!(extract_ids("123_something"), vec![123]);
        assert_eq!(extract_ids("77"), vec![77]);
        assert!(extract_ids("annual_report_7").is_empty());
        assert_eq!(extract_ids("12_34_notes"), vec![12]);
        assert_eq!(extract_ids("item_7_2024"), vec![7]);
        assert!(extract_ids("no digits here").is_empty());
    }

    #[test]
    fn test_score_candidate_exact_name() {
        let item = Item::new(1, "a", "b", "Report");
        let score = score_candidate("report.pdf", &item);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_strip_view_prefix() {
        assert_eq!(strip_view_prefix(&format!("{}a/b", PREFIX), PREFIX), "a/b");
        assert_eq!(strip_view_prefix("a/b", PREFIX), "a/b");
        assert_eq!(strip_view_prefix("a/b", ""), "a/b");
    }
}
