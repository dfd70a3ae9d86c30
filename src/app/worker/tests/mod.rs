//! Integration tests for the file downloader
//!
//! The downloader talks to a minimal HTTP server on a local port, so these
//! tests exercise the real request, streaming and retry paths.
