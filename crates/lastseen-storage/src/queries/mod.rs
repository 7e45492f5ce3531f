// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the store's tables.
//!
//! Each function runs in a single transaction on the pooled [`Database`](crate::Database)
//! and returns `Result<_, LastSeenError>`; the facade in [`crate::adapter`]
//! turns failures into logged defaults.

pub mod activity;
pub mod guilds;
pub mod members;
pub mod retention;
pub mod role_changes;
pub mod stats;

use tracing::warn;

/// Decode a JSON list column, treating malformed or missing content as empty.
pub(crate) fn decode_list<T, E>(
    column: &'static str,
    raw: Option<String>,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> T
where
    T: Default,
    E: std::fmt::Display,
{
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return T::default();
    };
    parse(&raw).unwrap_or_else(|e| {
        warn!(column, error = %e, "malformed list column, treating as empty");
        T::default()
    })
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastseen_core::RoleFilter;

    #[test]
    fn decode_list_handles_missing_and_malformed() {
        let empty: RoleFilter = decode_list("roles", None, RoleFilter::from_json);
        assert!(empty.is_empty());

        let blank: RoleFilter = decode_list("roles", Some("  ".into()), RoleFilter::from_json);
        assert!(blank.is_empty());

        let broken: RoleFilter =
            decode_list("roles", Some("{not json".into()), RoleFilter::from_json);
        assert!(broken.is_empty());

        let ok: RoleFilter =
            decode_list("roles", Some(r#"["Member"]"#.into()), RoleFilter::from_json);
        assert!(ok.contains(&"Member".to_string()));
    }
}
