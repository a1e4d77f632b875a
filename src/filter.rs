//! User-supplied ignore/include pattern matching.

use regex::RegexBuilder;

/// Whether `text` matches any of `patterns`.
///
/// Each pattern is tried as a case-insensitive regular expression. Patterns
/// are user-authored and must never crash a run: an invalid regex silently
/// falls back to a case-insensitive literal substring test. An empty pattern
/// list matches nothing, so absence of a constraint reads as a pass at call
/// sites.
#[must_use]
pub fn matches_any(text: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|pattern| match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(text),
            Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
        })
}

/// Whether `text` contains any of `needles` as a literal substring.
///
/// Content checks are literal-only; no regex interpretation.
#[must_use]
pub fn contains_any(text: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .filter(|n| !n.is_empty())
        .any(|needle| text.contains(needle.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_regex_match() {
        assert!(matches_any(
            "https://example.com/tracking?id=1",
            &pats(&[r"example\.com/track"])
        ));
        assert!(!matches_any("https://other.com", &pats(&[r"example\.com"])));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches_any("https://Example.COM/x", &pats(&["example"])));
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        // Unbalanced bracket is not a valid regex but is a valid substring.
        assert!(matches_any("weird [path", &pats(&["[path"])));
        assert!(!matches_any("clean path", &pats(&["[path"])));
    }

    #[test]
    fn test_empty_pattern_list_passes_nothing() {
        assert!(!matches_any("anything", &[]));
        assert!(!matches_any("anything", &pats(&[""])));
    }

    #[test]
    fn test_contains_any_is_literal() {
        assert!(contains_any("has a.b marker", &pats(&["a.b"])));
        assert!(!contains_any("has axb marker", &pats(&["a.b"])));
    }
}
