//! Deterministic, pure logic shared by the canvas engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! documents and return deterministic outputs suitable for tests.

pub mod canvas;
pub mod guard;
pub mod invariants;
pub mod merge;
pub mod operation;
pub mod plan;
pub mod types;
