//! Integration tests for failure ledger persistence and export.

use tempfile::TempDir;

use vault_link_archiver::ledger::{self, FailedArchive, FailureLedger, LedgerFormat};

fn entry(url: &str, file_path: &str, error: &str) -> FailedArchive {
    FailedArchive {
        url: url.to_string(),
        file_path: file_path.to_string(),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
        error: error.to_string(),
        retry_count: 1,
    }
}

fn location_set(entries: &[FailedArchive]) -> Vec<(String, String)> {
    let mut set: Vec<_> = entries
        .iter()
        .map(|e| (e.url.clone(), e.file_path.clone()))
        .collect();
    set.sort();
    set
}

#[tokio::test]
async fn test_export_round_trip_preserves_locations() {
    let dir = TempDir::new().unwrap();
    let mut ledger = FailureLedger::load(dir.path().join("ledger.json"))
        .await
        .unwrap();
    ledger.record(entry(
        "https://example.com/a,b",
        "notes/quoted \"name\".md",
        "error with\nnewline",
    ));
    ledger.record(entry("https://example.com/plain", "plain.md", "timeout"));

    // Export JSON, re-import, export CSV, re-import: the {url, filePath}
    // set must survive both directions.
    let json_path = dir.path().join("export.json");
    ledger.export(&json_path, LedgerFormat::Json).await.unwrap();
    let from_json = ledger::decode(
        &std::fs::read_to_string(&json_path).unwrap(),
        LedgerFormat::Json,
    )
    .unwrap();
    assert_eq!(location_set(&from_json), location_set(ledger.entries()));

    let csv_path = dir.path().join("export.csv");
    ledger.export(&csv_path, LedgerFormat::Csv).await.unwrap();
    let from_csv = ledger::decode(
        &std::fs::read_to_string(&csv_path).unwrap(),
        LedgerFormat::Csv,
    )
    .unwrap();
    assert_eq!(location_set(&from_csv), location_set(ledger.entries()));

    // Full entries survive too, not just the key fields.
    assert_eq!(from_csv, from_json);
}

#[tokio::test]
async fn test_ledger_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let mut ledger = FailureLedger::load(&path).await.unwrap();
    ledger.record(entry("https://example.com", "a.md", "timeout"));
    ledger.save().await.unwrap();

    let reloaded = FailureLedger::load(&path).await.unwrap();
    assert_eq!(reloaded.entries(), ledger.entries());
}

#[tokio::test]
async fn test_clear_removes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let mut ledger = FailureLedger::load(&path).await.unwrap();
    ledger.record(entry("https://example.com", "a.md", "timeout"));
    ledger.save().await.unwrap();
    assert!(path.exists());

    let cleared = ledger.clear().await.unwrap();
    assert_eq!(cleared, 1);
    assert!(!path.exists());
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_load_rejects_malformed_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{{ not a ledger").unwrap();

    assert!(FailureLedger::load(&path).await.is_err());
}
