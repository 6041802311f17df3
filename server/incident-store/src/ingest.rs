//! Bulk ingestion: feed candidate rows through validation into the store.
//!
//! Each row is its own unit of work. Invalid rows are counted and skipped;
//! rows created before a later failure stay created.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{StoreError, ValidationError};
use crate::store::IncidentStore;
use crate::types::RawIncident;
use crate::validate::ValidationRules;

/// Skipped rows beyond this many are counted but not itemized.
pub const MAX_REPORTED_ROWS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
  /// 1-based position in the input.
  pub row: usize,
  pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
  pub total_rows: usize,
  pub created: usize,
  pub skipped: usize,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub errors: Vec<RowError>,
}

/// The store refused a valid row (e.g. the durable write failed). `summary`
/// covers the rows handled before it, plus the failed row in `total_rows`.
#[derive(Debug, Error)]
#[error("ingestion stopped at row {row}: {source}")]
pub struct IngestAborted {
  pub row: usize,
  pub summary: IngestSummary,
  #[source]
  pub source: StoreError,
}

pub async fn ingest<I>(store: &IncidentStore, rules: &ValidationRules, rows: I) -> Result<IngestSummary, IngestAborted>
where
  I: IntoIterator<Item = RawIncident>,
{
  let mut summary = IngestSummary::default();

  for (idx, raw) in rows.into_iter().enumerate() {
    let row = idx + 1;
    summary.total_rows += 1;

    let value = match rules.validate_create(&raw) {
      Ok(v) => v,
      Err(errors) => {
        warn!(row, errors = errors.len(), "skipping invalid row");
        summary.skipped += 1;
        if summary.errors.len() < MAX_REPORTED_ROWS {
          summary.errors.push(RowError { row, errors });
        }
        continue;
      }
    };

    match store.create(value).await {
      Ok(_) => summary.created += 1,
      Err(source) => {
        warn!(row, error = %source, "bulk ingestion aborted");
        return Err(IngestAborted { row, summary, source });
      }
    }
  }

  info!(
    total = summary.total_rows,
    created = summary.created,
    skipped = summary.skipped,
    "bulk ingestion finished"
  );
  Ok(summary)
}
