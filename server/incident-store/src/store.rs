//! The incident store: sole owner of the collection and its durable record.
//!
//! Every mutating operation runs under the write half of one `RwLock` from
//! "mutate memory" through "persist", so readers never see a change that has
//! not at least been attempted on disk, and saves are strictly ordered.
//!
//! Persistence failure policy: the in-memory mutation is kept, the store is
//! marked dirty, and the caller receives `StoreError::Persistence`. The next
//! successful save (a later mutation or `flush()`) writes the full collection
//! and clears the flag. A mutating future dropped mid-write leaves the same
//! state behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, Snapshot};
use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::config::{Config, OnCorrupt};
use crate::error::StoreError;
use crate::transitions;
use crate::types::{Incident, IncidentId, NewIncident, Status, StatusCounts};

/// Attempts at drawing an unused id before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// In-memory collection. `index` maps id -> position in `incidents`.
#[derive(Debug, Default)]
struct Collection {
  incidents: Vec<Incident>,
  index: HashMap<IncidentId, usize>,
  revision: u64,
  dirty: bool,
}

impl Collection {
  fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
    let mut index = HashMap::with_capacity(snapshot.incidents.len());
    for (pos, incident) in snapshot.incidents.iter().enumerate() {
      if index.insert(incident.id.clone(), pos).is_some() {
        return Err(StoreError::corrupt(format!("duplicate id {}", incident.id)));
      }
    }
    Ok(Self {
      incidents: snapshot.incidents,
      index,
      revision: snapshot.revision,
      dirty: false,
    })
  }

  fn snapshot(&self) -> Snapshot {
    Snapshot {
      revision: self.revision,
      incidents: self.incidents.clone(),
    }
  }

  fn get(&self, id: &IncidentId) -> Option<&Incident> {
    self.index.get(id).map(|&pos| &self.incidents[pos])
  }

  fn get_mut(&mut self, id: &IncidentId) -> Option<&mut Incident> {
    match self.index.get(id) {
      Some(&pos) => self.incidents.get_mut(pos),
      None => None,
    }
  }

  fn push(&mut self, incident: Incident) {
    self.index.insert(incident.id.clone(), self.incidents.len());
    self.incidents.push(incident);
  }
}

/// Knobs the store reads from `Config`.
#[derive(Debug, Clone)]
struct PersistPolicy {
  auto_persist: bool,
  on_corrupt: OnCorrupt,
  timeout: Duration,
  retries: u32,
  backoff: Duration,
}

impl From<&Config> for PersistPolicy {
  fn from(config: &Config) -> Self {
    Self {
      auto_persist: config.auto_persist,
      on_corrupt: config.on_corrupt,
      timeout: config.persist_timeout,
      retries: config.persist_retries,
      backoff: config.retry_backoff,
    }
  }
}

pub struct IncidentStore {
  policy: PersistPolicy,
  backend: Arc<dyn Backend>,
  ids: Arc<dyn IdGenerator>,
  clock: Arc<dyn Clock>,
  state: RwLock<Option<Collection>>,
}

impl IncidentStore {
  /// Uses random UUIDs and the system clock. Call `initialize()` before use.
  pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Self {
    Self {
      policy: PersistPolicy::from(config),
      backend,
      ids: Arc::new(UuidGenerator),
      clock: Arc::new(SystemClock),
      state: RwLock::new(None),
    }
  }

  pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Load the durable record into memory. Must run exactly once.
  ///
  /// No record: start empty and write one. Corrupt record: fail or start
  /// empty according to `Config::on_corrupt`; partial data is never kept.
  pub async fn initialize(&self) -> Result<(), StoreError> {
    let mut guard = self.state.write().await;
    if guard.is_some() {
      return Err(StoreError::AlreadyInitialized);
    }

    let backend = Arc::clone(&self.backend);
    let loaded = tokio::task::spawn_blocking(move || backend.load())
      .await
      .map_err(|e| StoreError::persistence(format!("load task failed: {}", e)))?
      .and_then(|found| found.map(Collection::from_snapshot).transpose());

    let collection = match loaded {
      Ok(Some(collection)) => {
        for incident in &collection.incidents {
          self.ids.observe(&incident.id);
        }
        info!(
          incidents = collection.incidents.len(),
          revision = collection.revision,
          "loaded durable record"
        );
        collection
      }
      Ok(None) => {
        let collection = Collection::default();
        self.save(collection.snapshot()).await?;
        info!("no durable record found; created an empty one");
        collection
      }
      Err(StoreError::Corrupt { reason }) => match self.policy.on_corrupt {
        OnCorrupt::Fail => {
          error!(%reason, "durable record is corrupt; refusing to start");
          return Err(StoreError::Corrupt { reason });
        }
        OnCorrupt::Reset => {
          error!(%reason, "durable record is corrupt; moving it aside and starting empty");
          let backend = Arc::clone(&self.backend);
          tokio::task::spawn_blocking(move || backend.discard_corrupt())
            .await
            .map_err(|e| StoreError::persistence(format!("discard task failed: {}", e)))??;
          let collection = Collection::default();
          self.save(collection.snapshot()).await?;
          collection
        }
      },
      Err(e) => return Err(e),
    };

    *guard = Some(collection);
    Ok(())
  }

  // -------------------------------------------------------------------------
  // Reads
  // -------------------------------------------------------------------------

  /// Snapshot in insertion order. ARCHIVED incidents only when asked for.
  pub async fn list_all(&self, include_archived: bool) -> Result<Vec<Incident>, StoreError> {
    let guard = self.state.read().await;
    let collection = guard.as_ref().ok_or(StoreError::NotInitialized)?;
    Ok(
      collection
        .incidents
        .iter()
        .filter(|i| include_archived || i.status != Status::Archived)
        .cloned()
        .collect(),
    )
  }

  pub async fn find_by_id(&self, id: &IncidentId) -> Result<Incident, StoreError> {
    let guard = self.state.read().await;
    let collection = guard.as_ref().ok_or(StoreError::NotInitialized)?;
    collection
      .get(id)
      .cloned()
      .ok_or_else(|| StoreError::not_found(id))
  }

  pub async fn counts(&self) -> Result<StatusCounts, StoreError> {
    let guard = self.state.read().await;
    let collection = guard.as_ref().ok_or(StoreError::NotInitialized)?;
    let mut counts = StatusCounts::default();
    for incident in &collection.incidents {
      counts.record(incident.status);
    }
    Ok(counts)
  }

  /// True while memory holds changes the durable record does not.
  pub async fn is_dirty(&self) -> Result<bool, StoreError> {
    let guard = self.state.read().await;
    Ok(guard.as_ref().ok_or(StoreError::NotInitialized)?.dirty)
  }

  pub async fn revision(&self) -> Result<u64, StoreError> {
    let guard = self.state.read().await;
    Ok(guard.as_ref().ok_or(StoreError::NotInitialized)?.revision)
  }

  // -------------------------------------------------------------------------
  // Mutations
  // -------------------------------------------------------------------------

  /// Append a new OPEN incident with a fresh id and the current time.
  pub async fn create(&self, data: NewIncident) -> Result<Incident, StoreError> {
    let mut guard = self.state.write().await;
    let collection = guard.as_mut().ok_or(StoreError::NotInitialized)?;

    let id = self.fresh_id(collection)?;
    let incident = Incident {
      id,
      title: data.title,
      description: data.description,
      category: data.category,
      severity: data.severity,
      status: Status::Open,
      reported_at: self.clock.now(),
    };
    collection.push(incident.clone());
    debug!(id = %incident.id, "incident created");

    self.commit(collection).await?;
    Ok(incident)
  }

  /// Move along one edge of the workflow graph.
  pub async fn change_status(&self, id: &IncidentId, requested: Status) -> Result<Incident, StoreError> {
    let mut guard = self.state.write().await;
    let collection = guard.as_mut().ok_or(StoreError::NotInitialized)?;

    let incident = collection.get_mut(id).ok_or_else(|| StoreError::not_found(id))?;
    let current = incident.status;
    if !transitions::can_transition(current, requested) {
      warn!(%id, %current, %requested, "rejected status change");
      return Err(StoreError::InvalidTransition {
        current,
        requested,
        allowed: transitions::next_statuses(current).to_vec(),
      });
    }
    incident.status = requested;
    let updated = incident.clone();
    debug!(%id, from = %current, to = %requested, "status changed");

    self.commit(collection).await?;
    Ok(updated)
  }

  /// OPEN or RESOLVED -> ARCHIVED.
  pub async fn archive(&self, id: &IncidentId) -> Result<Incident, StoreError> {
    self
      .apply_rule(id, "archive", transitions::can_archive, Status::Archived)
      .await
  }

  /// ARCHIVED -> OPEN.
  pub async fn reset(&self, id: &IncidentId) -> Result<Incident, StoreError> {
    self
      .apply_rule(id, "reset", transitions::can_reset, Status::Open)
      .await
  }

  /// Write the full collection now, dirty or not.
  pub async fn flush(&self) -> Result<(), StoreError> {
    let mut guard = self.state.write().await;
    let collection = guard.as_mut().ok_or(StoreError::NotInitialized)?;
    self.persist(collection).await
  }

  async fn apply_rule(
    &self,
    id: &IncidentId,
    operation: &'static str,
    allowed: fn(Status) -> bool,
    target: Status,
  ) -> Result<Incident, StoreError> {
    let mut guard = self.state.write().await;
    let collection = guard.as_mut().ok_or(StoreError::NotInitialized)?;

    let incident = collection.get_mut(id).ok_or_else(|| StoreError::not_found(id))?;
    let current = incident.status;
    if !allowed(current) {
      warn!(%id, %current, operation, "rejected");
      return Err(StoreError::InvalidState { current, operation });
    }
    incident.status = target;
    let updated = incident.clone();
    debug!(%id, from = %current, to = %target, operation, "status changed");

    self.commit(collection).await?;
    Ok(updated)
  }

  fn fresh_id(&self, collection: &Collection) -> Result<IncidentId, StoreError> {
    let mut id = self.ids.next_id();
    for _ in 1..MAX_ID_ATTEMPTS {
      if !collection.index.contains_key(&id) {
        return Ok(id);
      }
      warn!(%id, "id generator returned an id already in use");
      id = self.ids.next_id();
    }
    if collection.index.contains_key(&id) {
      return Err(StoreError::DuplicateId { id });
    }
    Ok(id)
  }

  // -------------------------------------------------------------------------
  // Persistence
  // -------------------------------------------------------------------------

  /// Record an accepted mutation; persist it when auto-persist is on.
  async fn commit(&self, collection: &mut Collection) -> Result<(), StoreError> {
    collection.revision += 1;
    collection.dirty = true;
    if !self.policy.auto_persist {
      return Ok(());
    }
    self.persist(collection).await
  }

  async fn persist(&self, collection: &mut Collection) -> Result<(), StoreError> {
    let revision = collection.revision;
    match self.save(collection.snapshot()).await {
      Ok(()) => {
        collection.dirty = false;
        Ok(())
      }
      Err(e) => {
        error!(revision, error = %e, "durable write failed; memory is ahead of disk");
        Err(e)
      }
    }
  }

  /// Save with bounded retries; each attempt bounded by the timeout.
  async fn save(&self, snapshot: Snapshot) -> Result<(), StoreError> {
    let snapshot = Arc::new(snapshot);
    let mut delay = self.policy.backoff;
    let mut attempt = 0;
    loop {
      match self.save_once(Arc::clone(&snapshot)).await {
        Ok(()) => return Ok(()),
        Err(e) if attempt < self.policy.retries => {
          attempt += 1;
          warn!(attempt, error = %e, "durable write failed; retrying");
          tokio::time::sleep(delay).await;
          delay = delay.saturating_mul(2);
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn save_once(&self, snapshot: Arc<Snapshot>) -> Result<(), StoreError> {
    let backend = Arc::clone(&self.backend);
    let task = tokio::task::spawn_blocking(move || backend.save(&snapshot));
    match tokio::time::timeout(self.policy.timeout, task).await {
      Ok(Ok(result)) => result,
      Ok(Err(e)) => Err(StoreError::persistence(format!("write task failed: {}", e))),
      Err(_) => Err(StoreError::persistence(format!(
        "write timed out after {:?}",
        self.policy.timeout
      ))),
    }
  }
}
