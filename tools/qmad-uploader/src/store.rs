//! Document store abstraction and the two writes that make up an upload.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::types::{BuildMetrics, ProjectSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
  /// Replace the whole document.
  Replace,
  /// Update only the supplied field paths; nested maps merge leaf by leaf.
  Merge,
}

/// One document write. `server_timestamps` are dotted field paths the store
/// fills with its own request time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
  pub path: String,
  pub fields: Map<String, Value>,
  pub server_timestamps: Vec<String>,
  pub mode: WriteMode,
}

impl DocumentWrite {
  pub fn new<T: Serialize>(path: impl Into<String>, doc: &T, mode: WriteMode) -> Result<Self, StoreError> {
    let fields = match serde_json::to_value(doc)? {
      Value::Object(map) => map,
      other => {
        let mut map = Map::new();
        map.insert("value".to_string(), other);
        map
      }
    };
    Ok(Self {
      path: path.into(),
      fields,
      server_timestamps: Vec::new(),
      mode,
    })
  }

  pub fn with_server_timestamp(mut self, field_path: impl Into<String>) -> Self {
    self.server_timestamps.push(field_path.into());
    self
  }
}

pub trait DocumentStore {
  fn write(&self, write: &DocumentWrite) -> Result<(), StoreError>;
}

pub fn project_path(project_id: &str) -> String {
  format!("projects/{}", project_id)
}

pub fn metrics_path(project_id: &str, commit: &str) -> String {
  format!("projects/{}/metrics/{}", project_id, commit)
}

/// Replace the per-commit metrics document, then merge the project summary.
/// Either failure aborts; nothing is retried here.
pub fn upload<S: DocumentStore + ?Sized>(
  store: &S,
  project_id: &str,
  metrics: &BuildMetrics,
  summary: &ProjectSummary,
) -> Result<(), StoreError> {
  tracing::info!("Uploading data for project: {}", project_id);

  let metrics_write = DocumentWrite::new(metrics_path(project_id, &metrics.id), metrics, WriteMode::Replace)?
    .with_server_timestamp(BuildMetrics::TIMESTAMP_FIELD);
  store.write(&metrics_write)?;
  tracing::info!("Successfully wrote metrics to doc: {}", metrics.id);

  let summary_write = DocumentWrite::new(project_path(project_id), summary, WriteMode::Merge)?
    .with_server_timestamp(ProjectSummary::LAST_ANALYZED_FIELD)
    .with_server_timestamp(format!(
      "{}.{}",
      ProjectSummary::LATEST_METRICS_FIELD,
      BuildMetrics::TIMESTAMP_FIELD
    ));
  store.write(&summary_write)?;
  tracing::info!("Successfully updated project summary: {}", project_id);

  Ok(())
}
