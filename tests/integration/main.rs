//! Integration tests for the snapshot cache and ingestion queue
//!
//! These tests use wiremock to create mock HTTP servers and run against
//! real SQLite files and filesystem blob stores under a temp directory.

mod capture_tests;
mod queue_tests;
