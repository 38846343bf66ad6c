//! Integration tests for SymStack
//!
//! End-to-end replays of struct-log traces through the engine, plus the
//! fixtures and log capture they share.

pub mod test_utils;
