//! Consolidated integration tests for black-verify-core.
//!
//! One test binary keeps proptest suites and tokio runtimes from racing
//! across separate integration crates.
//! See: https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod fixtures;
mod properties;
mod release_api;
mod scenarios;
