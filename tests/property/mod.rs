//! Property-based tests for prompt expansion

mod expansion;
