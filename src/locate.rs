//! Re-locating a link in possibly-mutated text.
//!
//! A link's offset is captured before an async network call; by the time a
//! patch must be applied the document may have shifted or the link may be
//! gone. The latest text is re-scanned and the occurrence nearest the
//! original offset wins. This is the single source of truth for every edit:
//! a stale offset is never trusted across a suspension point.

use crate::grammar::{find_links, LinkMatch};

/// Find the current occurrence of `target_url` nearest `approx_offset`.
///
/// Matching is exact string equality against the URL as it appears in the
/// document (pre-submission form, no rewrite rules applied). `None` means the
/// link was deleted while we were waiting; that is an expected outcome, not
/// an error.
#[must_use]
pub fn locate_match(latest_text: &str, target_url: &str, approx_offset: usize) -> Option<LinkMatch> {
    find_links(latest_text)
        .filter(|m| m.url == target_url)
        .min_by_key(|m| m.start.abs_diff(approx_offset))
}

/// Offset-only variant of [`locate_match`].
#[must_use]
pub fn locate(latest_text: &str, target_url: &str, approx_offset: usize) -> Option<usize> {
    locate_match(latest_text, target_url, approx_offset).map(|m| m.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_after_prefix_shift() {
        let original = "intro [x](https://example.com/a) outro";
        let offset = original.find("[x]").unwrap();
        let prefix = "a new paragraph was typed above\n\n";
        let mutated = format!("{prefix}{original}");

        assert_eq!(
            locate(&mutated, "https://example.com/a", offset),
            Some(offset + prefix.len())
        );
    }

    #[test]
    fn test_locate_prefers_nearest_duplicate() {
        let text = "[a](https://dup.example.com) middle text [b](https://dup.example.com)";
        let second = text.rfind("[b]").unwrap();

        assert_eq!(locate(text, "https://dup.example.com", second), Some(second));
        assert_eq!(locate(text, "https://dup.example.com", 0), Some(0));
    }

    #[test]
    fn test_locate_deleted_link() {
        assert_eq!(locate("the link is gone now", "https://example.com", 5), None);
    }

    #[test]
    fn test_locate_matches_document_form_not_rewritten_form() {
        let text = "[x](http://example.com/a)";
        assert_eq!(locate(text, "https://example.com/a", 0), None);
        assert_eq!(locate(text, "http://example.com/a", 0), Some(0));
    }
}
