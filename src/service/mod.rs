//! Operations composed from storage, policy and reference rewriting.

pub mod ghost;
pub mod move_issue;
pub mod notes;

pub use ghost::{GhostMigration, GhostReport, ReassignStep, ensure_ghost_user};
pub use move_issue::{IssueMover, MoveConfig, MoveOutcome, MoveRequest, MoveStage, RejectReason};
