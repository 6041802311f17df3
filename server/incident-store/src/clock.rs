//! Id generation and time seams, injected into the store so tests can fix them.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::IncidentId;

pub trait IdGenerator: Send + Sync {
  fn next_id(&self) -> IncidentId;

  /// Called once per incident loaded at startup so stateful generators can
  /// resume past ids already handed out.
  fn observe(&self, _existing: &IncidentId) {}
}

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
  fn next_id(&self) -> IncidentId {
    IncidentId(uuid::Uuid::new_v4().to_string())
  }
}

/// `inc-1`, `inc-2`, ... Deterministic ids for tests and fixtures.
#[derive(Debug, Default)]
pub struct SequentialIds {
  next: AtomicU64,
}

impl IdGenerator for SequentialIds {
  fn next_id(&self) -> IncidentId {
    let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
    IncidentId(format!("inc-{}", n))
  }

  fn observe(&self, existing: &IncidentId) {
    if let Some(n) = existing.as_str().strip_prefix("inc-").and_then(|n| n.parse().ok()) {
      self.next.fetch_max(n, Ordering::Relaxed);
    }
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use std::collections::HashSet;

  #[test]
  fn sequential_ids_count_up() {
    let ids = SequentialIds::default();
    assert_eq!(ids.next_id().as_str(), "inc-1");
    assert_eq!(ids.next_id().as_str(), "inc-2");
  }

  #[test]
  fn sequential_ids_resume_after_observed_ids() {
    let ids = SequentialIds::default();
    for seen in ["inc-3", "inc-12", "inc-7", "legacy-99", "inc-x"] {
      ids.observe(&IncidentId::from(seen));
    }
    assert_eq!(ids.next_id().as_str(), "inc-13");
    assert_eq!(ids.next_id().as_str(), "inc-14");
  }

  #[test]
  fn uuid_ids_are_unique() {
    let gen = UuidGenerator;
    let ids: HashSet<IncidentId> = (0..100).map(|_| gen.next_id()).collect();
    assert_eq!(ids.len(), 100);
  }

  #[test]
  fn fixed_clock_does_not_move() {
    let t = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
    let clock = FixedClock(t);
    assert_eq!(clock.now(), t);
    assert_eq!(clock.now(), t);
  }
}
