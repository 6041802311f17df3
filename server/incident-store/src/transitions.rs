//! Workflow rules: which single-step status changes are legal.
//!
//! OPEN -> {INVESTIGATING, ARCHIVED}, INVESTIGATING -> {RESOLVED},
//! RESOLVED -> {ARCHIVED}, ARCHIVED -> {OPEN}. No self-loops.

use crate::types::Status;

/// Out-set of `current` in the workflow graph.
pub fn next_statuses(current: Status) -> &'static [Status] {
  match current {
    Status::Open => &[Status::Investigating, Status::Archived],
    Status::Investigating => &[Status::Resolved],
    Status::Resolved => &[Status::Archived],
    Status::Archived => &[Status::Open],
  }
}

pub fn can_transition(current: Status, next: Status) -> bool {
  next_statuses(current).contains(&next)
}

/// Archive is narrower than the graph: only from OPEN or RESOLVED.
pub fn can_archive(current: Status) -> bool {
  matches!(current, Status::Open | Status::Resolved)
}

pub fn can_reset(current: Status) -> bool {
  current == Status::Archived
}
