// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record store backends.
//!
//! - [`memory::InMemoryStore`]: DashMap-backed, for tests and single-node runs
//! - [`sql::SqlStore`]: SQLite/MySQL through the sqlx `Any` driver

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::InMemoryStore;
pub use sql::SqlStore;
pub use traits::{StorageError, SyncStore};
