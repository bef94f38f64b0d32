//! Scanner task report (`report-task.txt`) reader.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where sonar-scanner leaves the report: newer scanners first, then older ones.
pub const DEFAULT_REPORT_PATHS: [&str; 2] = [
  ".sonar/scanner-report/report-task.txt",
  ".sonar/scanner/report-task.txt",
];

pub const TASK_ID_KEY: &str = "ceTaskId";

pub fn default_report_paths() -> Vec<PathBuf> {
  DEFAULT_REPORT_PATHS.iter().map(PathBuf::from).collect()
}

/// Parse `key=value` lines. Splits on the first `=`; other lines are skipped.
pub fn parse_properties(contents: &str) -> HashMap<String, String> {
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.starts_with('#'))
    .filter_map(|line| line.split_once('='))
    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    .collect()
}

/// Compute-engine task id from the first report file that exists.
///
/// `None` means there is no analysis to wait for; it is not an error.
pub fn read_task_id(candidates: &[PathBuf]) -> Option<String> {
  let Some(path) = candidates.iter().find(|p| p.exists()) else {
    let last = candidates.last().map(|p| p.display().to_string()).unwrap_or_default();
    tracing::warn!("Sonar report file '{}' not found. Skipping Sonar metrics.", last);
    return None;
  };
  read_task_id_from(path)
}

fn read_task_id_from(path: &Path) -> Option<String> {
  let contents = match fs::read_to_string(path) {
    Ok(s) => s,
    Err(e) => {
      tracing::error!("Could not read Sonar report file at {}. Error: {}", path.display(), e);
      return None;
    }
  };
  let task_id = parse_properties(&contents)
    .remove(TASK_ID_KEY)
    .filter(|id| !id.is_empty());
  if task_id.is_none() {
    tracing::warn!("No {} in {}", TASK_ID_KEY, path.display());
  }
  task_id
}
