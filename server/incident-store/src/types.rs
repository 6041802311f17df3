//! Core types for the incident store (durable record + JSON contracts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Opaque incident identifier. Assigned once by the store, never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub String);

impl IncidentId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IncidentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for IncidentId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Open,
  Investigating,
  Resolved,
  Archived,
}

impl Status {
  pub const ALL: [Status; 4] = [
    Status::Open,
    Status::Investigating,
    Status::Resolved,
    Status::Archived,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "OPEN",
      Self::Investigating => "INVESTIGATING",
      Self::Resolved => "RESOLVED",
      Self::Archived => "ARCHIVED",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown status {:?}", self.0)
  }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
  type Err = UnknownStatus;

  /// Case-insensitive; surrounding whitespace ignored.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "OPEN" => Ok(Self::Open),
      "INVESTIGATING" => Ok(Self::Investigating),
      "RESOLVED" => Ok(Self::Resolved),
      "ARCHIVED" => Ok(Self::Archived),
      _ => Err(UnknownStatus(s.to_string())),
    }
  }
}

// ---------------------------------------------------------------------------
// Incident record
// ---------------------------------------------------------------------------

/// One incident as held in memory and written to the durable record.
///
/// `id` and `reported_at` are fixed at creation. `status` only changes through
/// the store's transition operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
  pub id: IncidentId,
  pub title: String,
  pub description: String,
  pub category: String,
  pub severity: String,
  pub status: Status,
  pub reported_at: DateTime<Utc>,
}

/// Sanitized creation data. Only produced by validation (or trusted callers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
  pub title: String,
  pub description: String,
  pub category: String,
  pub severity: String,
}

/// Unvalidated candidate fields, e.g. one parsed CSV row or a request body.
/// Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawIncident {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub severity: Option<String>,
}

impl RawIncident {
  /// Pull the four fields out of an arbitrary JSON value. Numbers and bools
  /// become strings; anything else (or a non-object) leaves the field unset.
  pub fn from_json_loose(value: &serde_json::Value) -> Self {
    let field = |name: &str| match value.get(name) {
      Some(serde_json::Value::String(s)) => Some(s.clone()),
      Some(serde_json::Value::Number(n)) => Some(n.to_string()),
      Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
      _ => None,
    };
    Self {
      title: field("title"),
      description: field("description"),
      category: field("category"),
      severity: field("severity"),
    }
  }
}

/// Per-status totals for dashboard summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
  pub open: usize,
  pub investigating: usize,
  pub resolved: usize,
  pub archived: usize,
}

impl StatusCounts {
  pub fn record(&mut self, status: Status) {
    match status {
      Status::Open => self.open += 1,
      Status::Investigating => self.investigating += 1,
      Status::Resolved => self.resolved += 1,
      Status::Archived => self.archived += 1,
    }
  }

  pub fn total(&self) -> usize {
    self.open + self.investigating + self.resolved + self.archived
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_parses_loosely() {
    assert_eq!("investigating".parse::<Status>().unwrap(), Status::Investigating);
    assert_eq!(" OPEN ".parse::<Status>().unwrap(), Status::Open);
    assert!("CLOSED".parse::<Status>().is_err());
  }

  #[test]
  fn status_serializes_upper_case() {
    let json = serde_json::to_string(&Status::Investigating).unwrap();
    assert_eq!(json, "\"INVESTIGATING\"");
    let back: Status = serde_json::from_str("\"ARCHIVED\"").unwrap();
    assert_eq!(back, Status::Archived);
  }

  #[test]
  fn unknown_status_in_record_fails_to_deserialize() {
    let json = r#"{
      "id": "a", "title": "t", "description": "", "category": "IT",
      "severity": "LOW", "status": "CLOSED", "reportedAt": "2025-01-15T10:30:00Z"
    }"#;
    assert!(serde_json::from_str::<Incident>(json).is_err());
  }

  #[test]
  fn loose_rows_tolerate_odd_shapes() {
    let row = serde_json::json!({"title": 42, "category": "IT", "severity": null, "extra": [1]});
    let raw = RawIncident::from_json_loose(&row);
    assert_eq!(raw.title.as_deref(), Some("42"));
    assert_eq!(raw.category.as_deref(), Some("IT"));
    assert_eq!(raw.severity, None);

    assert_eq!(RawIncident::from_json_loose(&serde_json::json!("csv line")), RawIncident::default());
  }

  #[test]
  fn counts_track_every_status() {
    let mut counts = StatusCounts::default();
    for s in Status::ALL {
      counts.record(s);
    }
    counts.record(Status::Open);
    assert_eq!(counts.open, 2);
    assert_eq!(counts.total(), 5);
  }
}
