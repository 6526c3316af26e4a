//! Document store implementations for alcove rooms.
//!
//! Three implementations of the [`Store`](alcove_core::Store) contract:
//!
//! - [`MemoryStore`]: in-process state for tests and the simulator
//! - [`RedbStore`]: durable state backed by redb
//! - [`FlakyStore`]: wraps another store and injects revision conflicts,
//!   for exercising retry paths
//!
//! plus [`SystemEnv`], the production clock and randomness source.
//!
//! Every implementation serves the same in-process change feeds: each
//! mutation publishes a fresh snapshot of the affected collection to
//! that room's subscribers, which is what gives clients their
//! snapshot-then-updates view without polling.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bus;
mod flaky;
mod memory;
mod redb;
mod system_env;

pub use flaky::FlakyStore;
pub use memory::MemoryStore;
pub use self::redb::RedbStore;
pub use system_env::SystemEnv;
