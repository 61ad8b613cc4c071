// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend trait definitions.

pub mod feed;
pub mod queue;
pub mod store;

pub use feed::JobMetadataChangeFeed;
pub use queue::JobQueue;
pub use store::JobMetadataStore;
