//! Tests for the API client
//!
//! [`server`] is a minimal HTTP server on a local port, shared with the file
//! downloader tests.
