//! I/O for canvas sessions: config, persistence, and snapshot fan-out.

pub mod broadcast;
pub mod config;
pub mod init;
pub mod persistence;
pub mod schema;
