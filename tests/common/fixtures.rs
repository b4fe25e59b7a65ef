#![allow(dead_code)]

use issue_mover::model::{AccessLevel, Issue, NewIssue, Scope, User};
use issue_mover::storage::SqliteStorage;

/// Two scopes, `P1` and `P2`, with `alice` as a reporter in both.
pub struct MoveWorld {
    pub storage: SqliteStorage,
    pub actor: User,
    pub p1: Scope,
    pub p2: Scope,
}

impl MoveWorld {
    pub fn new(mut storage: SqliteStorage) -> Self {
        let actor = storage.create_user("alice", "Alice", false).unwrap();
        let p1 = storage.create_scope("P1", "Project one").unwrap();
        let p2 = storage.create_scope("P2", "Project two").unwrap();
        storage
            .set_membership(p1.id, actor.id, AccessLevel::Reporter)
            .unwrap();
        storage
            .set_membership(p2.id, actor.id, AccessLevel::Reporter)
            .unwrap();
        Self {
            storage,
            actor,
            p1,
            p2,
        }
    }

    pub fn user(&mut self, username: &str) -> User {
        self.storage.create_user(username, username, false).unwrap()
    }

    /// Create an issue in `P1` authored by `alice`.
    pub fn issue(&mut self, title: &str, description: Option<&str>) -> Issue {
        let mut new = NewIssue::new(self.p1.id, title, self.actor.id);
        new.description = description.map(str::to_string);
        self.storage.create_issue(&new, "alice", 3).unwrap()
    }

    /// Create an issue in `P1` with a label, a milestone and an assignee.
    pub fn decorated_issue(&mut self, title: &str) -> Issue {
        let label = self.storage.create_label(self.p1.id, "bug").unwrap();
        let milestone = self.storage.create_milestone(self.p1.id, "v1.0").unwrap();
        let assignee = self.user("bob");
        let mut new = NewIssue::new(self.p1.id, title, self.actor.id);
        new.label_ids = vec![label.id];
        new.milestone_id = Some(milestone.id);
        new.assignee_ids = vec![assignee.id];
        self.storage.create_issue(&new, "alice", 3).unwrap()
    }

    pub fn note(&mut self, issue: &Issue, body: &str, system: bool) {
        let actor = self.actor.clone();
        self.storage.add_note(issue.id, &actor, body, system).unwrap();
    }
}
