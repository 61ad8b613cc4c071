// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue backends.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryJobQueue;
pub use sqlite::SqliteJobQueue;
