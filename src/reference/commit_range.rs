//! Commit-range references (`<sha>..<sha>` and `<sha>...<sha>`).
//!
//! Rewriting a range is purely textual. Resolution is a separate, explicit
//! step: a range resolves in a scope only when both endpoints are commits
//! recorded for that scope.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::model::ScopeId;
use crate::storage::sqlite::commit_exists;

/// Looks up whether a commit is reachable in a scope.
pub trait CommitLookup {
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn commit_exists(&self, scope_id: ScopeId, sha: &str) -> Result<bool>;
}

impl CommitLookup for Connection {
    fn commit_exists(&self, scope_id: ScopeId, sha: &str) -> Result<bool> {
        commit_exists(self, scope_id, sha)
    }
}

/// A commit range as written in text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CommitRange {
    pub from: String,
    pub to: String,
    /// `...` (includes `from`) rather than `..`.
    pub inclusive: bool,
}

impl CommitRange {
    /// Parse `a..b` / `a...b` where each endpoint is 7-40 hex chars.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (from, to, inclusive) = if let Some((from, to)) = text.split_once("...") {
            (from, to, true)
        } else {
            let (from, to) = text.split_once("..")?;
            (from, to, false)
        };
        if !is_sha(from) || !is_sha(to) {
            return None;
        }
        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
            inclusive,
        })
    }

    #[must_use]
    pub const fn dots(&self) -> &'static str {
        if self.inclusive { "..." } else { ".." }
    }

    /// The scope-qualified form, e.g. `group/project@abc1234..def5678`.
    #[must_use]
    pub fn to_reference(&self, handle: &str) -> String {
        format!("{handle}@{self}")
    }

    /// Whether both endpoints are commits recorded for `scope_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn resolve<L: CommitLookup + ?Sized>(&self, scope_id: ScopeId, lookup: &L) -> Result<bool> {
        Ok(lookup.commit_exists(scope_id, &self.from)? && lookup.commit_exists(scope_id, &self.to)?)
    }
}

impl fmt::Display for CommitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.from, self.dots(), self.to)
    }
}

fn is_sha(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// The ranges among `ranges` that do not resolve in `scope_id`.
///
/// # Errors
///
/// Returns an error if a lookup fails.
pub fn find_unresolved<L: CommitLookup + ?Sized>(
    ranges: &[CommitRange],
    scope_id: ScopeId,
    lookup: &L,
) -> Result<Vec<CommitRange>> {
    let mut unresolved = Vec::new();
    for range in ranges {
        if !range.resolve(scope_id, lookup)? && !unresolved.contains(range) {
            unresolved.push(range.clone());
        }
    }
    Ok(unresolved)
}
