//! Structured error types for the incident store.

use serde::Serialize;
use thiserror::Error;

use crate::types::{IncidentId, Status};

/// One rejected field from validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
  pub field: String,
  pub reason: String,
}

impl ValidationError {
  pub fn new(field: &str, reason: &str) -> Self {
    Self {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("incident {id} not found")]
  NotFound { id: IncidentId },

  #[error("cannot move from {current} to {requested}")]
  InvalidTransition {
    current: Status,
    requested: Status,
    allowed: Vec<Status>,
  },

  #[error("cannot {operation} an incident in status {current}")]
  InvalidState {
    current: Status,
    operation: &'static str,
  },

  /// The in-memory mutation was applied but the durable write did not
  /// complete. The store stays dirty until a later save succeeds.
  #[error("persistence: {reason}")]
  Persistence { reason: String },

  #[error("corrupt durable record: {reason}")]
  Corrupt { reason: String },

  #[error("id generator kept returning ids already in use (last: {id})")]
  DuplicateId { id: IncidentId },

  #[error("store used before initialize()")]
  NotInitialized,

  #[error("store already initialized")]
  AlreadyInitialized,

  #[error("validation failed: {}", summarize(.errors))]
  Validation { errors: Vec<ValidationError> },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

fn summarize(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(|e| format!("{}: {}", e.field, e.reason))
    .collect::<Vec<_>>()
    .join("; ")
}

impl StoreError {
  pub fn not_found(id: &IncidentId) -> Self {
    Self::NotFound { id: id.clone() }
  }

  pub fn persistence(reason: impl Into<String>) -> Self {
    Self::Persistence {
      reason: reason.into(),
    }
  }

  pub fn corrupt(reason: impl Into<String>) -> Self {
    Self::Corrupt {
      reason: reason.into(),
    }
  }

  /// Expected, recoverable rejections reported back to the caller as-is.
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      Self::NotFound { .. }
        | Self::InvalidTransition { .. }
        | Self::InvalidState { .. }
        | Self::Validation { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn invalid_transition_message_names_both_statuses() {
    let err = StoreError::InvalidTransition {
      current: Status::Investigating,
      requested: Status::Archived,
      allowed: vec![Status::Resolved],
    };
    assert_eq!(err.to_string(), "cannot move from INVESTIGATING to ARCHIVED");
    assert!(err.is_rejection());
  }

  #[test]
  fn validation_message_lists_fields() {
    let err = StoreError::Validation {
      errors: vec![
        ValidationError::new("title", "required"),
        ValidationError::new("severity", "unknown value"),
      ],
    };
    let msg = err.to_string();
    assert!(msg.contains("title: required"));
    assert!(msg.contains("severity: unknown value"));
  }

  #[test]
  fn persistence_is_not_a_rejection() {
    assert!(!StoreError::persistence("disk full").is_rejection());
    assert!(!StoreError::NotInitialized.is_rejection());
  }
}
