//! End-to-end pipeline tests.
//!
//! Commands enter through the in-memory channel source (or stdio lines),
//! updates go to stub incident services, events land in the mock sink.
//!
//! Run with: cargo test --test pipeline

mod common;
mod concurrency;
mod scenarios;
mod stdio;
