//! Freshness policy for existing archive annotations.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::grammar::{AdjacentAnnotation, SnapshotStamp};

/// What to do about a link given the annotation found next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub should_process: bool,
    pub replace_existing: bool,
}

impl Decision {
    pub const SKIP: Self = Self {
        should_process: false,
        replace_existing: false,
    };
    pub const INSERT: Self = Self {
        should_process: true,
        replace_existing: false,
    };
    pub const REPLACE: Self = Self {
        should_process: true,
        replace_existing: true,
    };
}

/// Evaluate an existing annotation against the freshness window.
///
/// No annotation means plain insertion. A wildcard or unreadable timestamp is
/// treated as stale and replaced. A parseable timestamp younger than the
/// window skips the link entirely. Force mode bypasses this policy at the
/// call site.
#[must_use]
pub fn evaluate(
    adjacent: Option<&AdjacentAnnotation>,
    freshness_days: u32,
    now: DateTime<Utc>,
) -> Decision {
    let Some(annotation) = adjacent else {
        return Decision::INSERT;
    };
    match &annotation.stamp {
        None | Some(SnapshotStamp::Wildcard) => Decision::REPLACE,
        Some(SnapshotStamp::At(stamp)) => match parse_stamp(stamp) {
            Some(captured_at)
                if now.signed_duration_since(captured_at)
                    < Duration::days(i64::from(freshness_days)) =>
            {
                Decision::SKIP
            }
            _ => Decision::REPLACE,
        },
    }
}

/// Parse a `YYYYMMDDHHMMSS` wire timestamp.
#[must_use]
pub fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a wall-clock time as a `YYYYMMDDHHMMSS` wire timestamp.
#[must_use]
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::AdjacentAnnotation;
    use chrono::TimeZone;

    fn annotation(stamp: Option<SnapshotStamp>) -> AdjacentAnnotation {
        AdjacentAnnotation { len: 10, stamp }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_annotation_inserts() {
        assert_eq!(evaluate(None, 90, at(2026, 1, 1)), Decision::INSERT);
    }

    #[test]
    fn test_wildcard_is_stale() {
        let ann = annotation(Some(SnapshotStamp::Wildcard));
        assert_eq!(evaluate(Some(&ann), 90, at(2026, 1, 1)), Decision::REPLACE);
    }

    #[test]
    fn test_missing_stamp_is_stale() {
        let ann = annotation(None);
        assert_eq!(evaluate(Some(&ann), 90, at(2026, 1, 1)), Decision::REPLACE);
    }

    #[test]
    fn test_fresh_stamp_skips() {
        let ann = annotation(Some(SnapshotStamp::At("20251215000000".to_string())));
        assert_eq!(evaluate(Some(&ann), 90, at(2026, 1, 1)), Decision::SKIP);
    }

    #[test]
    fn test_old_stamp_replaced() {
        let ann = annotation(Some(SnapshotStamp::At("20200101000000".to_string())));
        assert_eq!(evaluate(Some(&ann), 90, at(2026, 1, 1)), Decision::REPLACE);
    }

    #[test]
    fn test_unparseable_stamp_replaced() {
        let ann = annotation(Some(SnapshotStamp::At("not-a-stamp".to_string())));
        assert_eq!(evaluate(Some(&ann), 90, at(2026, 1, 1)), Decision::REPLACE);
    }

    #[test]
    fn test_stamp_round_trip() {
        let t = at(2024, 6, 15);
        assert_eq!(parse_stamp(&format_stamp(t)), Some(t));
    }
}
