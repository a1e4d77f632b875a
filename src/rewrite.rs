//! Ordered find/replace transforms applied to a URL before submission.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One user-configured substitution, applied to a URL before it is submitted
/// for archiving (tracking-parameter stripping, mirror redirection, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub is_regex: bool,
}

/// Apply every rule in list order.
///
/// Regex rules replace globally; literal rules replace every occurrence of
/// the substring. A rule with an empty `find` is a no-op, and a rule whose
/// regex fails to compile is skipped with a warning while later rules still
/// apply.
#[must_use]
pub fn apply_rules(url: &str, rules: &[SubstitutionRule]) -> String {
    let mut out = url.to_string();
    for rule in rules {
        if rule.find.is_empty() {
            continue;
        }
        if rule.is_regex {
            match Regex::new(&rule.find) {
                Ok(re) => out = re.replace_all(&out, rule.replace.as_str()).into_owned(),
                Err(e) => {
                    warn!(pattern = %rule.find, error = %e, "Skipping invalid substitution rule");
                }
            }
        } else {
            out = out.replace(&rule.find, &rule.replace);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(find: &str, replace: &str) -> SubstitutionRule {
        SubstitutionRule {
            find: find.to_string(),
            replace: replace.to_string(),
            is_regex: false,
        }
    }

    fn regex(find: &str, replace: &str) -> SubstitutionRule {
        SubstitutionRule {
            find: find.to_string(),
            replace: replace.to_string(),
            is_regex: true,
        }
    }

    #[test]
    fn test_literal_replaces_all_occurrences() {
        let rules = [literal("http://", "https://")];
        assert_eq!(apply_rules("http://example.com", &rules), "https://example.com");
    }

    #[test]
    fn test_regex_global_replace() {
        let rules = [regex(r"[?&]utm_[a-z]+=[^&]*", "")];
        assert_eq!(
            apply_rules("https://example.com/p?utm_source=a&utm_medium=b", &rules),
            "https://example.com/p"
        );
    }

    #[test]
    fn test_rules_apply_in_order() {
        let rules = [literal("old.example.com", "mid.example.com"),
            literal("mid.example.com", "new.example.com")];
        assert_eq!(
            apply_rules("https://old.example.com/x", &rules),
            "https://new.example.com/x"
        );
    }

    #[test]
    fn test_empty_find_is_noop() {
        let rules = [literal("", "nothing")];
        assert_eq!(apply_rules("https://example.com", &rules), "https://example.com");
    }

    #[test]
    fn test_broken_regex_skipped_later_rules_apply() {
        let rules = [regex("(unclosed", "x"), literal("example", "sample")];
        assert_eq!(apply_rules("https://example.com", &rules), "https://sample.com");
    }
}
