// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the LastSeen activity tracker.
//!
//! Provides a pooled, WAL-mode SQLite database with embedded numbered
//! migrations, typed query modules for guilds, members, the role-change log
//! and message activity, snapshot backups, member export, and the
//! [`SqliteStore`] facade whose operations never fail outward.

pub mod adapter;
pub mod backup;
pub mod database;
pub mod export;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
pub use models::*;
