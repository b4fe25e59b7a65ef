//! Core data types for `issue_mover`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `Scope` - A project owning issues, identified by a short handle
//! - `Issue` - The work item, numbered per scope by `iid`
//! - `Note` - An entry in an issue's discussion thread
//! - `User` - Authors, assignees and scope members (including the ghost)
//! - `Event` - Audit log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub type ScopeId = i64;
pub type UserId = i64;
pub type IssueId = i64;
pub type NoteId = i64;

/// Issue lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    #[default]
    Opened,
    Closed,
}

impl IssueState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueState {
    type Err = crate::error::MoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opened" | "open" => Ok(Self::Opened),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::MoverError::validation(
                "state",
                format!("unknown state '{other}'"),
            )),
        }
    }
}

/// Membership level within a scope, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Guest => 10,
            Self::Reporter => 20,
            Self::Developer => 30,
            Self::Maintainer => 40,
            Self::Owner => 50,
        }
    }

    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            10 => Some(Self::Guest),
            20 => Some(Self::Reporter),
            30 => Some(Self::Developer),
            40 => Some(Self::Maintainer),
            50 => Some(Self::Owner),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Reporter => "reporter",
            Self::Developer => "developer",
            Self::Maintainer => "maintainer",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = crate::error::MoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "reporter" => Ok(Self::Reporter),
            "developer" => Ok(Self::Developer),
            "maintainer" => Ok(Self::Maintainer),
            "owner" => Ok(Self::Owner),
            other => Err(crate::error::MoverError::validation(
                "access_level",
                format!("unknown access level '{other}'"),
            )),
        }
    }
}

/// Account kind. Ghost accounts only ever receive reassigned records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    #[default]
    Human,
    Ghost,
}

impl UserKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ghost => "ghost",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "ghost" { Self::Ghost } else { Self::Human }
    }
}

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub kind: UserKind,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub const fn is_ghost(&self) -> bool {
        matches!(self.kind, UserKind::Ghost)
    }
}

/// A project scope owning issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    pub id: ScopeId,
    /// Display handle used to qualify references (e.g. "group/project").
    pub handle: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Scope {
    /// The prefix that qualifies references pointing into this scope.
    #[must_use]
    pub fn to_reference(&self) -> &str {
        &self.handle
    }
}

/// A scope-local milestone. Never carried across scopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    pub id: i64,
    pub scope_id: ScopeId,
    pub title: String,
}

/// A scope-local label. Never carried across scopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: i64,
    pub scope_id: ScopeId,
    pub title: String,
}

/// The primary issue entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Global row id.
    pub id: IssueId,

    /// Owning scope.
    pub scope_id: ScopeId,

    /// Scope-local sequence number, unique within `scope_id`.
    pub iid: i64,

    /// Title (1-255 chars).
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub author_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by_id: Option<UserId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignee_ids: Vec<UserId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,

    #[serde(default)]
    pub state: IssueState,

    /// Set on a source issue once it has been moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_to_id: Option<IssueId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Reference to this issue, qualified when `from` is a different scope.
    ///
    /// `scope` must be the scope that owns this issue.
    #[must_use]
    pub fn to_reference(&self, scope: &Scope, from: Option<&Scope>) -> String {
        match from {
            Some(from) if from.id == scope.id => format!("#{}", self.iid),
            _ => format!("{}#{}", scope.to_reference(), self.iid),
        }
    }

    /// Snapshot of the persisted fields a move uses as its base.
    #[must_use]
    pub fn attributes(&self) -> IssueAttributes {
        IssueAttributes {
            title: self.title.clone(),
            description: self.description.clone(),
            author_id: self.author_id,
            assignee_ids: self.assignee_ids.clone(),
            label_ids: self.label_ids.clone(),
            milestone_id: self.milestone_id,
        }
    }
}

/// Caller-supplied snapshot of an issue's persisted field values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueAttributes {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub author_id: UserId,
    #[serde(default)]
    pub assignee_ids: Vec<UserId>,
    #[serde(default)]
    pub label_ids: Vec<i64>,
    #[serde(default)]
    pub milestone_id: Option<i64>,
}

/// Fields for creating an issue; `iid` is allocated on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub scope_id: ScopeId,
    pub title: String,
    pub description: Option<String>,
    pub author_id: UserId,
    pub assignee_ids: Vec<UserId>,
    pub label_ids: Vec<i64>,
    pub milestone_id: Option<i64>,
}

impl NewIssue {
    #[must_use]
    pub fn new(scope_id: ScopeId, title: impl Into<String>, author_id: UserId) -> Self {
        Self {
            scope_id,
            title: title.into(),
            description: None,
            author_id,
            assignee_ids: vec![],
            label_ids: vec![],
            milestone_id: None,
        }
    }
}

/// An entry in an issue's discussion thread.
///
/// Notes on one issue are totally ordered by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub issue_id: IssueId,
    /// Copied from the parent issue at creation time.
    pub scope_id: ScopeId,
    pub author_id: UserId,
    pub body: String,
    /// Machine-generated audit text.
    #[serde(default)]
    pub system: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending a note; `id` is assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub issue_id: IssueId,
    pub scope_id: ScopeId,
    pub author_id: UserId,
    pub body: String,
    pub system: bool,
    /// Defaults to now. Carried notes keep their original timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

/// An epic: authored like an issue but not scoped or numbered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Epic {
    pub id: i64,
    pub title: String,
    pub author_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Audit event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Commented,
    Closed,
    Moved,
    Custom(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Commented => "commented",
            Self::Closed => "closed",
            Self::Moved => "moved",
            Self::Custom(value) => value,
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "created" => Self::Created,
            "commented" => Self::Commented,
            "closed" => Self::Closed,
            "moved" => Self::Moved,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// An event in the issue's history (audit log).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub issue_id: IssueId,
    pub event_type: EventType,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scope(id: ScopeId, handle: &str) -> Scope {
        Scope {
            id,
            handle: handle.to_string(),
            name: String::new(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn issue(scope_id: ScopeId, iid: i64) -> Issue {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Issue {
            id: 1,
            scope_id,
            iid,
            title: "Some issue".to_string(),
            description: None,
            author_id: 3,
            last_edited_by_id: None,
            assignee_ids: vec![4],
            label_ids: vec![9],
            milestone_id: Some(2),
            state: IssueState::Opened,
            moved_to_id: None,
            created_at: at,
            updated_at: at,
            closed_at: None,
        }
    }

    #[test]
    fn issue_reference_is_qualified_across_scopes() {
        let p1 = scope(1, "P1");
        let p2 = scope(2, "P2");
        let issue = issue(1, 12);
        assert_eq!(issue.to_reference(&p1, Some(&p1)), "#12");
        assert_eq!(issue.to_reference(&p1, Some(&p2)), "P1#12");
        assert_eq!(issue.to_reference(&p1, None), "P1#12");
    }

    #[test]
    fn attributes_snapshot_carries_scope_local_fields() {
        let attrs = issue(1, 1).attributes();
        assert_eq!(attrs.milestone_id, Some(2));
        assert_eq!(attrs.label_ids, vec![9]);
        assert_eq!(attrs.assignee_ids, vec![4]);
    }

    #[test]
    fn access_levels_are_ordered() {
        assert!(AccessLevel::Guest < AccessLevel::Reporter);
        assert!(AccessLevel::Owner > AccessLevel::Maintainer);
        for level in [
            AccessLevel::Guest,
            AccessLevel::Reporter,
            AccessLevel::Developer,
            AccessLevel::Maintainer,
            AccessLevel::Owner,
        ] {
            assert_eq!(AccessLevel::from_i32(level.as_i32()), Some(level));
            assert_eq!(level.as_str().parse::<AccessLevel>().unwrap(), level);
        }
        assert!("admin".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&IssueState::Opened).unwrap();
        assert_eq!(json, "\"opened\"");
        assert_eq!("open".parse::<IssueState>().unwrap(), IssueState::Opened);
    }

    #[test]
    fn event_type_custom_roundtrip() {
        let e = EventType::Custom("foobar".to_string());
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"foobar\"");
        let back: EventType = serde_json::from_str("\"moved\"").unwrap();
        assert_eq!(back, EventType::Moved);
    }
}
