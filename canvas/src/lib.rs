//! Shared canvas state synchronization between an agent and a UI client.
//!
//! One logical document per session holds typed canvas items, global fields,
//! and a multi-step plan. The agent mutates it through named calls; observers
//! receive a snapshot after every committed change. The crate is split the
//! usual way:
//!
//! - **[`core`]**: Pure, deterministic logic (plan machine, canvas mutations,
//!   stale-state guard, merge, invariants). No I/O.
//! - **[`io`]**: Config, persistence backends, schema checks, and snapshot
//!   broadcasters.
//!
//! [`store`], [`dispatch`], and [`session`] tie the two together; [`validate`]
//! backs the `canvas validate` command.

pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
