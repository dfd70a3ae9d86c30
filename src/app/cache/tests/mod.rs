//! Tests for the cache operations
//!
//! The operations run against the real in-memory metadata store and a
//! filesystem storage service in a temporary directory. Transport and remote
//! API are replaced by the doubles in [`support`], which record what they
//! were asked to do.

#[cfg(test)]
pub(crate) mod support;
