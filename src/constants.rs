//! Shared constants used across the application.

/// User agent string used for archival HTTP requests.
///
/// This is a realistic browser user agent that is indistinguishable from a real browser,
/// making archival requests appear as normal browser traffic.
pub const ARCHIVAL_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Save Page Now submission endpoint.
pub const SPN_SUBMIT_URL: &str = "https://web.archive.org/save/";

/// Save Page Now job status endpoint prefix (job id is appended).
pub const SPN_STATUS_URL: &str = "https://web.archive.org/save/status/";

/// CDX snapshot query endpoint.
pub const CDX_SEARCH_URL: &str = "https://web.archive.org/cdx/search/cdx";

/// Prefix of every Wayback Machine snapshot URL.
pub const SNAPSHOT_URL_PREFIX: &str = "https://web.archive.org/web/";

/// How many bytes past a link the grammar scans for an existing archive
/// annotation. Bounded so adjacency checks never walk the rest of a large
/// document and never pick up annotations that belong to later links.
pub const ANNOTATION_LOOKAHEAD: usize = 512;
