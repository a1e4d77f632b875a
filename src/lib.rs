//! Vault link archiver library.
//!
//! Scans Markdown documents for hyperlinks, submits each eligible URL to the
//! Internet Archive's Save Page Now service, and rewrites the document to
//! append or replace an "archived copy" annotation next to the original link.

pub mod config;
pub mod constants;
pub mod filter;
pub mod freshness;
pub mod grammar;
pub mod ledger;
pub mod locate;
pub mod notify;
pub mod orchestrator;
pub mod profile;
pub mod rewrite;
pub mod store;
pub mod wayback;
