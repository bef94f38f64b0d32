//! Run configuration: required CI context plus the optional analysis-service settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Fixed-interval, fixed-count wait for the analysis task.
#[derive(Debug, Clone)]
pub struct PollPolicy {
  /// Status queries before giving up.
  pub attempts: u32,
  /// Wait after every unfinished or failed query.
  pub interval: Duration,
}

impl Default for PollPolicy {
  fn default() -> Self {
    Self {
      attempts: 20,
      interval: Duration::from_secs(5),
    }
  }
}

/// Credentials and coordinates for the analysis service.
#[derive(Debug, Clone)]
pub struct SonarSettings {
  pub host: String,
  pub token: String,
  pub project_key: String,
  pub organization: String,
}

impl SonarSettings {
  /// All three of token, project key and organization, or nothing.
  pub fn from_parts(
    host: &str,
    token: Option<String>,
    project_key: Option<String>,
    organization: Option<String>,
  ) -> Option<Self> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Some(Self {
      host: host.trim_end_matches('/').to_string(),
      token: non_empty(token)?,
      project_key: non_empty(project_key)?,
      organization: non_empty(organization)?,
    })
  }
}

/// Everything the pipeline needs to know about this build.
#[derive(Debug, Clone)]
pub struct Config {
  pub project_id: String,
  pub commit_sha: String,
  pub repository: String,
  pub run_id: String,
  pub test_result: String,
  pub github_server_url: String,
  pub coverage_file: PathBuf,
  /// Overrides the default scanner report locations.
  pub task_report: Option<PathBuf>,
  pub sonar: Option<SonarSettings>,
  pub poll: PollPolicy,
}

impl Config {
  /// Commit id used as document key: first 7 characters of the SHA.
  pub fn short_commit(&self) -> String {
    self.commit_sha.chars().take(7).collect()
  }

  pub fn repo_url(&self) -> String {
    format!("{}/{}", self.github_server_url.trim_end_matches('/'), self.repository)
  }

  pub fn run_url(&self) -> String {
    format!("{}/actions/runs/{}", self.repo_url(), self.run_id)
  }

  /// Reject empty required values (CI sets unset secrets to "").
  pub fn validate(&self) -> Result<(), ConfigError> {
    let required = [
      ("QMAD_PROJECT_ID", &self.project_id),
      ("GITHUB_SHA", &self.commit_sha),
      ("GITHUB_REPOSITORY", &self.repository),
      ("GITHUB_RUN_ID", &self.run_id),
      ("PYTEST_RESULT", &self.test_result),
    ];
    for (name, value) in required {
      if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
      }
    }
    Ok(())
  }
}
