//! Deterministic, pure logic for placeholder resolution and data staging.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod error;
pub mod expression;
pub mod registry;
pub mod resolver;
pub mod staging;
pub mod token;
pub mod types;
