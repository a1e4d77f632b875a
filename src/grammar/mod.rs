//! Link detection grammar.
//!
//! Finds markdown links, HTML anchors/images, and bare URLs in a text blob,
//! and detects whether a link is immediately followed by an existing archive
//! annotation. All matchers are stateless; a scan starts fresh on every call
//! and offsets are only valid against the exact text they were computed from.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{ANNOTATION_LOOKAHEAD, SNAPSHOT_URL_PREFIX};

/// Syntactic form of a detected link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFormat {
    Markdown,
    HtmlAnchor,
    HtmlImage,
    Plain,
}

/// A located link occurrence.
///
/// `start` and `text` describe the full matched span; `url` is the extracted
/// target. Matches are ephemeral and must be recomputed after any mutation of
/// the text they were found in.
#[derive(Debug, Clone)]
pub struct LinkMatch {
    pub start: usize,
    pub text: String,
    pub url: String,
    pub format: LinkFormat,
}

impl LinkMatch {
    /// Byte offset one past the end of the matched span.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Timestamp embedded in an existing archive annotation.
///
/// Wire format is `YYYYMMDDHHMMSS`; `*` is a wildcard meaning the capture
/// time is unknown or unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStamp {
    Wildcard,
    At(String),
}

/// An existing archive link found immediately after a [`LinkMatch`].
///
/// `len` is the number of bytes the annotation occupies after the link span,
/// including the single leading space if present.
#[derive(Debug, Clone)]
pub struct AdjacentAnnotation {
    pub len: usize,
    pub stamp: Option<SnapshotStamp>,
}

/// Scan `text` for links.
///
/// Matches are produced in left-to-right order, one per link occurrence.
/// Richer forms win: a markdown or HTML match consumes its whole span, so the
/// URL embedded inside is never re-reported as a bare URL.
pub fn find_links(text: &str) -> Links<'_> {
    Links { text, pos: 0 }
}

/// Iterator over the links in a text blob. See [`find_links`].
pub struct Links<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for Links<'_> {
    type Item = LinkMatch;

    fn next(&mut self) -> Option<LinkMatch> {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let Some(raw) = earliest_match(rest) else {
                self.pos = self.text.len();
                return None;
            };

            let link = LinkMatch {
                start: self.pos + raw.start,
                text: rest[raw.start..raw.end].to_string(),
                url: raw.url,
                format: raw.format,
            };
            self.pos = link.end();

            // A match with an empty target (e.g. `[x]()`) is not a link.
            if !link.url.is_empty() {
                return Some(link);
            }
        }
        None
    }
}

/// Detect an archive annotation at the very start of `text_after` (the text
/// immediately following a link span).
///
/// Only a bounded window is examined, and at most one leading space or tab is
/// tolerated before the annotation.
#[must_use]
pub fn adjacent_annotation(text_after: &str) -> Option<AdjacentAnnotation> {
    let window = &text_after[..floor_char_boundary(text_after, ANNOTATION_LOOKAHEAD)];
    let lead = usize::from(window.starts_with(' ') || window.starts_with('\t'));
    let body = &window[lead..];

    let raw = match_markdown(body).or_else(|| match_html_anchor(body))?;
    if raw.start != 0 || !is_snapshot_url(&raw.url) {
        return None;
    }

    Some(AdjacentAnnotation {
        len: raw.end + lead,
        stamp: extract_stamp(&raw.url),
    })
}

/// Whether `url` points at the archive service itself.
///
/// Such links are never archived again: every annotation this tool inserts is
/// one of them.
#[must_use]
pub fn is_snapshot_url(url: &str) -> bool {
    url.starts_with(SNAPSHOT_URL_PREFIX) || url.starts_with("http://web.archive.org/web/")
}

struct RawMatch {
    start: usize,
    end: usize,
    url: String,
    format: LinkFormat,
}

static MD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]\n]*\]\(").expect("valid regex"));

static HTML_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>.*?</a>"#)
        .expect("valid regex")
});

static HTML_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\s[^>]*src\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#).expect("valid regex")
});

static PLAIN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("valid regex"));

static STAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"/web/(\d{14}|\*)/").expect("valid regex"));

/// Earliest match across all rules. Rich forms start before the URL they
/// embed, so picking the smallest start offset also resolves overlaps in
/// favor of the richer syntactic form.
fn earliest_match(rest: &str) -> Option<RawMatch> {
    let candidates = [
        match_markdown(rest),
        match_html_anchor(rest),
        match_html_image(rest),
        match_plain(rest),
    ];
    candidates
        .into_iter()
        .flatten()
        .min_by_key(|raw| raw.start)
}

fn match_markdown(rest: &str) -> Option<RawMatch> {
    for open in MD_OPEN.find_iter(rest) {
        let target_start = open.end();
        let Some(close) = balanced_paren_end(&rest[target_start..]) else {
            continue;
        };
        let target = rest[target_start..target_start + close].trim();
        // A markdown target may carry an optional title after the URL.
        let url = target.split_whitespace().next().unwrap_or("");
        return Some(RawMatch {
            start: open.start(),
            end: target_start + close + 1,
            url: url.to_string(),
            format: LinkFormat::Markdown,
        });
    }
    None
}

fn match_html_anchor(rest: &str) -> Option<RawMatch> {
    let caps = HTML_ANCHOR.captures(rest)?;
    let whole = caps.get(0).expect("match group 0 always present");
    Some(RawMatch {
        start: whole.start(),
        end: whole.end(),
        url: first_capture(&caps),
        format: LinkFormat::HtmlAnchor,
    })
}

fn match_html_image(rest: &str) -> Option<RawMatch> {
    let caps = HTML_IMAGE.captures(rest)?;
    let whole = caps.get(0).expect("match group 0 always present");
    Some(RawMatch {
        start: whole.start(),
        end: whole.end(),
        url: first_capture(&caps),
        format: LinkFormat::HtmlImage,
    })
}

fn match_plain(rest: &str) -> Option<RawMatch> {
    let found = PLAIN_URL.find(rest)?;
    let url = trim_url_tail(found.as_str());
    Some(RawMatch {
        start: found.start(),
        end: found.start() + url.len(),
        url: url.to_string(),
        format: LinkFormat::Plain,
    })
}

/// First non-empty capture group across the match's format-specific
/// alternatives (double-quoted vs. single-quoted attribute).
fn first_capture(caps: &regex::Captures<'_>) -> String {
    (1..caps.len())
        .filter_map(|i| caps.get(i))
        .map(|m| m.as_str())
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Offset of the closing parenthesis that ends a markdown link target,
/// counting nested balanced pairs inside the target itself.
fn balanced_paren_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            '\n' => return None,
            _ => {}
        }
    }
    None
}

/// Strip trailing punctuation that belongs to the surrounding prose rather
/// than the URL. A trailing `)` is kept only while the URL's own parentheses
/// remain balanced.
fn trim_url_tail(url: &str) -> &str {
    let mut u = url;
    loop {
        let Some(last) = u.chars().last() else {
            return u;
        };
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' | ']' => u = &u[..u.len() - 1],
            ')' => {
                if u.matches(')').count() > u.matches('(').count() {
                    u = &u[..u.len() - 1];
                } else {
                    return u;
                }
            }
            _ => return u,
        }
    }
}

fn extract_stamp(url: &str) -> Option<SnapshotStamp> {
    let stamp = STAMP.captures(url)?.get(1)?.as_str();
    if stamp == "*" {
        Some(SnapshotStamp::Wildcard)
    } else {
        Some(SnapshotStamp::At(stamp.to_string()))
    }
}

/// Largest byte index `<= i` that lies on a char boundary of `s`.
pub(crate) fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut i = i;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(text: &str) -> Vec<LinkMatch> {
        find_links(text).collect()
    }

    #[test]
    fn test_markdown_nested_parens() {
        let text = "[Erica](https://en.wikipedia.org/wiki/Erica_(plant))";
        let found = links(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://en.wikipedia.org/wiki/Erica_(plant)");
        assert_eq!(found[0].format, LinkFormat::Markdown);
        assert_eq!(found[0].text, text);
    }

    #[test]
    fn test_plain_url_excludes_outer_paren() {
        let found = links("(See https://example.com)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com");
        assert_eq!(found[0].format, LinkFormat::Plain);
    }

    #[test]
    fn test_plain_url_keeps_balanced_paren() {
        let found = links("See https://en.wikipedia.org/wiki/Erica_(plant) for details.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://en.wikipedia.org/wiki/Erica_(plant)");
    }

    #[test]
    fn test_plain_url_strips_trailing_punctuation() {
        let found = links("Read https://example.com/page.");
        assert_eq!(found[0].url, "https://example.com/page");
    }

    #[test]
    fn test_html_anchor_double_quotes() {
        let found = links(r#"<a href="https://example.com/a">text</a>"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/a");
        assert_eq!(found[0].format, LinkFormat::HtmlAnchor);
    }

    #[test]
    fn test_html_anchor_single_quotes() {
        let found = links("<a href='https://example.com/b'>text</a>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/b");
    }

    #[test]
    fn test_html_image() {
        let found = links(r#"<img src="https://example.com/pic.png" alt="pic">"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/pic.png");
        assert_eq!(found[0].format, LinkFormat::HtmlImage);
    }

    #[test]
    fn test_anchor_href_not_rematched_as_plain() {
        let found = links(r#"<a href="https://example.com">https://example.com</a>"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].format, LinkFormat::HtmlAnchor);
    }

    #[test]
    fn test_markdown_target_not_rematched_as_plain() {
        let found = links("[x](https://example.com/a) then https://example.com/b");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].url, "https://example.com/a");
        assert_eq!(found[1].url, "https://example.com/b");
        assert_eq!(found[1].format, LinkFormat::Plain);
    }

    #[test]
    fn test_left_to_right_order() {
        let found = links("https://a.com then [b](https://b.com) then <a href=\"https://c.com\">c</a>");
        let urls: Vec<_> = found.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, ["https://a.com", "https://b.com", "https://c.com"]);
    }

    #[test]
    fn test_empty_markdown_target_skipped() {
        let found = links("[empty]() and https://real.com");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://real.com");
    }

    #[test]
    fn test_markdown_title_dropped_from_url() {
        let found = links(r#"[x](https://example.com "A title")"#);
        assert_eq!(found[0].url, "https://example.com");
    }

    #[test]
    fn test_adjacent_annotation_markdown() {
        let after = " [(archived)](https://web.archive.org/web/20240101000000/https://example.com) rest";
        let ann = adjacent_annotation(after).expect("annotation detected");
        assert_eq!(
            ann.stamp,
            Some(SnapshotStamp::At("20240101000000".to_string()))
        );
        assert_eq!(
            ann.len,
            " [(archived)](https://web.archive.org/web/20240101000000/https://example.com)".len()
        );
    }

    #[test]
    fn test_adjacent_annotation_wildcard() {
        let after = " [(archived)](https://web.archive.org/web/*/https://example.com)";
        let ann = adjacent_annotation(after).expect("annotation detected");
        assert_eq!(ann.stamp, Some(SnapshotStamp::Wildcard));
    }

    #[test]
    fn test_adjacent_annotation_html() {
        let after = r#" <a href="https://web.archive.org/web/20240101000000/https://example.com">archived</a>"#;
        let ann = adjacent_annotation(after).expect("annotation detected");
        assert_eq!(
            ann.stamp,
            Some(SnapshotStamp::At("20240101000000".to_string()))
        );
        assert_eq!(ann.len, after.len());
    }

    #[test]
    fn test_adjacent_annotation_with_parens_in_original_url() {
        let after =
            " [(archived)](https://web.archive.org/web/20240101000000/https://en.wikipedia.org/wiki/Erica_(plant))x";
        let ann = adjacent_annotation(after).expect("annotation detected");
        assert_eq!(ann.len, after.len() - 1);
    }

    #[test]
    fn test_non_archive_link_is_not_annotation() {
        assert!(adjacent_annotation(" [next](https://example.com/other)").is_none());
    }

    #[test]
    fn test_annotation_must_be_immediate() {
        let after = " some words [(archived)](https://web.archive.org/web/*/https://example.com)";
        assert!(adjacent_annotation(after).is_none());
    }

    #[test]
    fn test_annotation_far_downstream_ignored() {
        let mut after = " ".to_string();
        after.push_str(&"x".repeat(ANNOTATION_LOOKAHEAD));
        after.push_str(" [(archived)](https://web.archive.org/web/*/https://example.com)");
        assert!(adjacent_annotation(&after).is_none());
    }

    #[test]
    fn test_is_snapshot_url() {
        assert!(is_snapshot_url(
            "https://web.archive.org/web/20240101000000/https://example.com"
        ));
        assert!(is_snapshot_url("https://web.archive.org/web/*/https://example.com"));
        assert!(!is_snapshot_url("https://example.com/web/"));
    }

    #[test]
    fn test_restartable_scan() {
        let text = "https://a.com and https://b.com";
        assert_eq!(links(text).len(), 2);
        assert_eq!(links(text).len(), 2);
    }
}
