//! Moving an issue to another scope.
//!
//! A move runs as one write transaction through these stages:
//!
//! ```text
//! Requested -> Validated -> ItemCreated -> NotesCarried -> Annotated -> SourceClosed -> Committed
//!     \-> rejected (nothing written)
//! ```
//!
//! Validation failures are reported as [`MoverError::MoveRejected`] before
//! anything is written. Any later failure rolls the transaction back and is
//! reported as [`MoverError::MoveAborted`] naming the last stage reached.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{MoverError, Result};
use crate::model::{EventType, Issue, IssueAttributes, NewIssue, Scope, ScopeId, User};
use crate::policy::{Capability, can_move, first_denied};
use crate::reference::{CommitRange, ReferenceRewriter, find_unresolved};
use crate::service::notes::{annotate_move, carry_notes};
use crate::storage::SqliteStorage;
use crate::storage::internal_id::insert_issue_allocating;
use crate::storage::sqlite::{close_moved_issue, fetch_issue, fetch_scope};

/// Default number of re-allocations after an `iid` collision.
pub const DEFAULT_ALLOCATION_RETRIES: u32 = 3;

/// Why a move was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No destination scope was given.
    MissingDestination,
    /// The destination is the scope the issue already lives in.
    SameScope,
    /// The destination scope id does not exist.
    DestinationNotFound { scope_id: ScopeId },
    /// The issue does not belong to the stated source scope.
    IssueNotInScope { scope: String },
    /// The actor may not manage issues in `scope`.
    Forbidden { scope: String },
}

impl RejectReason {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingDestination => "missing_destination",
            Self::SameScope => "same_scope",
            Self::DestinationNotFound { .. } => "destination_not_found",
            Self::IssueNotInScope { .. } => "issue_not_in_scope",
            Self::Forbidden { .. } => "forbidden",
        }
    }

    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingDestination => Some("Pass the destination with --to <scope>"),
            Self::SameScope => Some("Choose a scope other than the one the issue is in"),
            Self::DestinationNotFound { .. } => Some("Create it first: imv scope add <handle>"),
            Self::Forbidden { .. } => {
                Some("Reporter access is needed in both scopes: imv scope grant <scope> <user> reporter")
            }
            Self::IssueNotInScope { .. } => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDestination => write!(f, "no destination scope given"),
            Self::SameScope => write!(f, "issue already belongs to the destination scope"),
            Self::DestinationNotFound { scope_id } => {
                write!(f, "destination scope {scope_id} does not exist")
            }
            Self::IssueNotInScope { scope } => {
                write!(f, "issue does not belong to scope '{scope}'")
            }
            Self::Forbidden { scope } => write!(
                f,
                "actor lacks the {} capability in '{scope}'",
                Capability::ManageIssue
            ),
        }
    }
}

/// Progress of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStage {
    Requested,
    Validated,
    ItemCreated,
    NotesCarried,
    Annotated,
    SourceClosed,
    Committed,
}

impl MoveStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Validated => "validated",
            Self::ItemCreated => "item_created",
            Self::NotesCarried => "notes_carried",
            Self::Annotated => "annotated",
            Self::SourceClosed => "source_closed",
            Self::Committed => "committed",
        }
    }
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunables for [`IssueMover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveConfig {
    pub allocation_retries: u32,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            allocation_retries: DEFAULT_ALLOCATION_RETRIES,
        }
    }
}

/// A request to move `issue` out of `source_scope`.
///
/// `attributes` is the caller's snapshot of the issue's persisted fields and
/// is the base for the new issue; it is not re-read from storage.
#[derive(Debug, Clone)]
pub struct MoveRequest<'a> {
    pub actor: &'a User,
    pub source_scope: &'a Scope,
    pub attributes: IssueAttributes,
    pub issue: &'a Issue,
    pub destination: Option<ScopeId>,
}

impl<'a> MoveRequest<'a> {
    /// Build a request using the issue's current fields as the snapshot.
    #[must_use]
    pub fn new(
        actor: &'a User,
        source_scope: &'a Scope,
        issue: &'a Issue,
        destination: Option<ScopeId>,
    ) -> Self {
        Self {
            actor,
            source_scope,
            attributes: issue.attributes(),
            issue,
            destination,
        }
    }
}

/// Result of a committed move.
#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    /// The new issue in the destination scope.
    pub issue: Issue,
    /// The source issue, now closed.
    pub source: Issue,
    /// Number of notes copied (excluding the two system notes).
    pub carried_notes: usize,
    /// Commit ranges that were qualified but do not resolve in the source scope.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dangling_commit_ranges: Vec<CommitRange>,
}

/// Check a request without writing anything.
///
/// Returns the destination scope, or why the move is refused.
///
/// # Errors
///
/// Returns an error only if a lookup fails.
pub fn validate(conn: &Connection, request: &MoveRequest<'_>) -> Result<std::result::Result<Scope, RejectReason>> {
    let Some(destination_id) = request.destination else {
        return Ok(Err(RejectReason::MissingDestination));
    };
    let source = request.source_scope;
    if destination_id == source.id {
        return Ok(Err(RejectReason::SameScope));
    }
    if request.issue.scope_id != source.id {
        return Ok(Err(RejectReason::IssueNotInScope {
            scope: source.handle.clone(),
        }));
    }
    let Some(destination) = fetch_scope(conn, destination_id)? else {
        return Ok(Err(RejectReason::DestinationNotFound {
            scope_id: destination_id,
        }));
    };

    if !can_move(conn, request.actor, source.id, destination.id)? {
        let denied = first_denied(
            conn,
            request.actor,
            &[source.id, destination.id],
            Capability::ManageIssue,
        )?;
        let scope_id = denied.unwrap_or(destination.id);
        let scope = if scope_id == source.id {
            source.handle.clone()
        } else {
            destination.handle.clone()
        };
        return Ok(Err(RejectReason::Forbidden { scope }));
    }

    Ok(Ok(destination))
}

/// Moves issues between scopes.
pub struct IssueMover<'s> {
    storage: &'s mut SqliteStorage,
    config: MoveConfig,
}

impl<'s> IssueMover<'s> {
    #[must_use]
    pub fn new(storage: &'s mut SqliteStorage, config: MoveConfig) -> Self {
        Self { storage, config }
    }

    /// Would `execute` accept this request right now?
    ///
    /// Read-only: never writes and never allocates an id.
    ///
    /// # Errors
    ///
    /// Returns an error only if a lookup fails.
    pub fn is_movable(&self, request: &MoveRequest<'_>) -> Result<bool> {
        if request.destination.is_none() {
            return Ok(false);
        }
        Ok(validate(self.storage.connection(), request)?.is_ok())
    }

    /// Move the issue, atomically.
    ///
    /// # Errors
    ///
    /// - `MoveRejected` if validation fails (nothing is written)
    /// - `DatabaseLocked` if the write lock cannot be taken
    /// - `MoveAborted` for any failure after validation (rolled back)
    pub fn execute(&mut self, request: &MoveRequest<'_>) -> Result<MoveOutcome> {
        let mut stage = MoveStage::Requested;
        let max_attempts = self.config.allocation_retries.saturating_add(1);

        let result = self.storage.mutate("move_issue", &request.actor.username, |tx, ctx| {
            // Re-checked under the write lock so permissions are current.
            let destination =
                validate(tx, request)?.map_err(|reason| MoverError::MoveRejected { reason })?;
            stage = MoveStage::Validated;
            debug!(%stage, issue_id = request.issue.id, destination = %destination.handle, "Move validated");

            let source_scope = request.source_scope;
            let rewriter = ReferenceRewriter::new(source_scope.to_reference());
            let attributes = &request.attributes;
            let mut commit_ranges = Vec::new();

            let description = attributes.description.as_deref().map(|text| {
                let rewritten = rewriter.rewrite(text);
                commit_ranges.extend(rewritten.commit_ranges);
                rewritten.text
            });
            let new_issue = NewIssue {
                scope_id: destination.id,
                title: attributes.title.clone(),
                description,
                author_id: attributes.author_id,
                assignee_ids: attributes.assignee_ids.clone(),
                // Labels and milestones belong to the source scope.
                label_ids: vec![],
                milestone_id: None,
            };
            let created = insert_issue_allocating(tx, &new_issue, Utc::now(), max_attempts)?;
            stage = MoveStage::ItemCreated;
            debug!(%stage, iid = created.iid, "Destination issue created");

            let source_ref = request.issue.to_reference(source_scope, Some(&destination));
            let destination_ref = created.to_reference(&destination, Some(source_scope));
            ctx.record_event(
                EventType::Created,
                created.id,
                Some(format!("Moved from {source_ref}")),
            );

            let carried = carry_notes(tx, request.issue, &created, &rewriter)?;
            commit_ranges.extend(carried.commit_ranges);
            stage = MoveStage::NotesCarried;
            debug!(%stage, notes = carried.count, "Notes carried");

            let (moved_from, moved_to) = annotate_move(
                tx,
                request.actor,
                source_scope,
                request.issue,
                &destination,
                &created,
            )?;
            ctx.record_event(EventType::Commented, created.id, Some(moved_from.body));
            ctx.record_event(EventType::Commented, request.issue.id, Some(moved_to.body));
            stage = MoveStage::Annotated;

            close_moved_issue(tx, request.issue.id, created.id, Utc::now())?;
            ctx.record_field_change(
                EventType::Moved,
                request.issue.id,
                Some(source_ref),
                Some(destination_ref),
                None,
            );
            ctx.record_event(EventType::Closed, request.issue.id, Some("moved".to_string()));
            stage = MoveStage::SourceClosed;

            let dangling = find_unresolved(&commit_ranges, source_scope.id, &**tx)?;
            for range in &dangling {
                warn!(
                    range = %range,
                    scope = %source_scope.handle,
                    "Commit range does not resolve in source scope"
                );
            }

            let source = fetch_issue(tx, request.issue.id)?.ok_or_else(|| MoverError::IssueNotFound {
                reference: request.issue.to_reference(source_scope, None),
            })?;

            Ok(MoveOutcome {
                issue: created,
                source,
                carried_notes: carried.count,
                dangling_commit_ranges: dangling,
            })
        });

        match result {
            Ok(outcome) => {
                stage = MoveStage::Committed;
                info!(
                    %stage,
                    from = %outcome.source.to_reference(request.source_scope, None),
                    to_scope = outcome.issue.scope_id,
                    iid = outcome.issue.iid,
                    notes = outcome.carried_notes,
                    "Issue moved"
                );
                Ok(outcome)
            }
            Err(err @ MoverError::MoveRejected { .. }) => Err(err),
            Err(err) if stage == MoveStage::Requested => Err(err),
            Err(err) => {
                warn!(%stage, error = %err, "Move rolled back");
                Err(MoverError::MoveAborted {
                    stage,
                    source: Box::new(err),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessLevel, IssueState};

    struct Fixture {
        storage: SqliteStorage,
        actor: User,
        p1: Scope,
        p2: Scope,
        issue: Issue,
    }

    fn fixture() -> Fixture {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let actor = storage.create_user("alice", "", false).unwrap();
        let p1 = storage.create_scope("P1", "").unwrap();
        let p2 = storage.create_scope("P2", "").unwrap();
        storage
            .set_membership(p1.id, actor.id, AccessLevel::Reporter)
            .unwrap();
        storage
            .set_membership(p2.id, actor.id, AccessLevel::Reporter)
            .unwrap();
        let mut new = NewIssue::new(p1.id, "Some issue", actor.id);
        new.description = Some("Some description #123".to_string());
        let issue = storage.create_issue(&new, "alice", 3).unwrap();
        Fixture {
            storage,
            actor,
            p1,
            p2,
            issue,
        }
    }

    #[test]
    fn test_reject_reason_codes() {
        let reason = RejectReason::Forbidden {
            scope: "P2".to_string(),
        };
        assert!(reason.is_permission());
        assert_eq!(reason.code(), "forbidden");
        assert!(reason.to_string().contains("manage_issue"));
        assert!(!RejectReason::SameScope.is_permission());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(MoveStage::NotesCarried.to_string(), "notes_carried");
        assert!(MoveStage::Validated < MoveStage::Committed);
    }

    #[test]
    fn test_is_movable_without_destination() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, None);
        let mover = IssueMover::new(&mut f.storage, MoveConfig::default());
        assert!(!mover.is_movable(&request).unwrap());
    }

    #[test]
    fn test_is_movable_does_not_allocate() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, Some(f.p2.id));
        let mover = IssueMover::new(&mut f.storage, MoveConfig::default());
        assert!(mover.is_movable(&request).unwrap());
        assert_eq!(
            crate::storage::internal_id::current_local_id(f.storage.connection(), f.p2.id)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_is_movable_follows_can_move() {
        let mut f = fixture();
        f.storage
            .set_membership(f.p2.id, f.actor.id, AccessLevel::Guest)
            .unwrap();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, Some(f.p2.id));
        assert!(!crate::policy::can_move(f.storage.connection(), &f.actor, f.p1.id, f.p2.id).unwrap());
        assert_eq!(
            validate(f.storage.connection(), &request).unwrap().unwrap_err(),
            RejectReason::Forbidden {
                scope: "P2".to_string()
            }
        );
        assert!(
            !IssueMover::new(&mut f.storage, MoveConfig::default())
                .is_movable(&request)
                .unwrap()
        );

        f.storage
            .set_membership(f.p2.id, f.actor.id, AccessLevel::Reporter)
            .unwrap();
        assert!(crate::policy::can_move(f.storage.connection(), &f.actor, f.p1.id, f.p2.id).unwrap());
        assert!(
            IssueMover::new(&mut f.storage, MoveConfig::default())
                .is_movable(&request)
                .unwrap()
        );
    }

    #[test]
    fn test_execute_moves_issue() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, Some(f.p2.id));
        let outcome = IssueMover::new(&mut f.storage, MoveConfig::default())
            .execute(&request)
            .unwrap();

        assert_eq!(outcome.issue.iid, 1);
        assert_eq!(outcome.issue.scope_id, f.p2.id);
        assert_eq!(outcome.issue.state, IssueState::Opened);
        assert_eq!(
            outcome.issue.description.as_deref(),
            Some("Some description P1#123")
        );
        assert_eq!(outcome.source.state, IssueState::Closed);
        assert_eq!(outcome.source.moved_to_id, Some(outcome.issue.id));
        assert_eq!(outcome.carried_notes, 0);
    }

    #[test]
    fn test_same_scope_is_rejected_without_writes() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, Some(f.p1.id));
        let err = IssueMover::new(&mut f.storage, MoveConfig::default())
            .execute(&request)
            .unwrap_err();
        assert!(matches!(
            err,
            MoverError::MoveRejected {
                reason: RejectReason::SameScope
            }
        ));
        let source = f.storage.get_issue(f.issue.id).unwrap().unwrap();
        assert_eq!(source.state, IssueState::Opened);
    }

    #[test]
    fn test_missing_destination_scope_is_rejected() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p1, &f.issue, Some(404));
        let err = IssueMover::new(&mut f.storage, MoveConfig::default())
            .execute(&request)
            .unwrap_err();
        assert!(matches!(
            err,
            MoverError::MoveRejected {
                reason: RejectReason::DestinationNotFound { scope_id: 404 }
            }
        ));
    }

    #[test]
    fn test_issue_from_other_scope_is_rejected() {
        let mut f = fixture();
        let request = MoveRequest::new(&f.actor, &f.p2, &f.issue, Some(f.p1.id));
        let err = IssueMover::new(&mut f.storage, MoveConfig::default())
            .execute(&request)
            .unwrap_err();
        assert!(matches!(
            err,
            MoverError::MoveRejected {
                reason: RejectReason::IssueNotInScope { .. }
            }
        ));
    }
}
