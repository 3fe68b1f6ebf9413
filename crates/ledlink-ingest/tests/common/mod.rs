//! Shared helpers for ingestion integration tests.

pub mod mock_http;
