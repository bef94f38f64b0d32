//! One run: local results → remote metrics → risk → upload.
//!
//! Each stage hands its result to the next by value; nothing is accumulated
//! in shared state.

use crate::config::{Config, PollPolicy};
use crate::coverage;
use crate::error::StoreError;
use crate::measures::{self, fetch_latest_measures, fetch_measures};
use crate::poll::{poll_analysis, Sleeper};
use crate::risk;
use crate::sonar::SonarApi;
use crate::store::{self, DocumentStore};
use crate::task_report;
use crate::types::{BuildMetrics, MetricsMap, ProjectSummary, RiskLevel, TestOutcome};

/// Documents produced by one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
  pub metrics: BuildMetrics,
  pub summary: ProjectSummary,
  pub risk: RiskLevel,
}

/// Resolve the analysis of this build and fetch its measures, falling back to
/// the project's latest measures when there is no task, the task never
/// finishes, or the scoped fetch comes back empty.
///
/// Unlike earlier releases of the uploader, an empty scoped result also falls
/// back instead of being uploaded as-is.
pub fn collect_remote_metrics<A, S>(
  api: &A,
  project_key: &str,
  task_id: Option<&str>,
  policy: &PollPolicy,
  sleeper: &S,
) -> MetricsMap
where
  A: SonarApi + ?Sized,
  S: Sleeper + ?Sized,
{
  let analysis_id = match task_id {
    Some(task_id) => {
      let id = poll_analysis(api, task_id, policy, sleeper);
      if id.is_none() {
        tracing::warn!("Could not get SonarCloud analysisId. Using fallback.");
      }
      id
    }
    None => {
      tracing::warn!("Could not find SonarCloud task ID. Using fallback.");
      None
    }
  };

  if let Some(id) = analysis_id {
    let metrics = fetch_measures(api, project_key, &id);
    if !metrics.is_empty() {
      return metrics;
    }
    tracing::warn!("No measures for analysis {}. Using fallback.", id);
  }
  fetch_latest_measures(api, project_key)
}

/// Merge local and remote signals into the two store documents.
pub fn build_report(config: &Config, local_coverage: f64, remote: &MetricsMap) -> Report {
  let test_result = TestOutcome::new(config.test_result.clone());
  let coverage = risk::select_coverage(local_coverage, remote.percent(measures::COVERAGE));
  let short_commit = config.short_commit();

  let metrics = BuildMetrics {
    id: short_commit.clone(),
    test_result: test_result.clone(),
    coverage,
    vulnerabilities: remote.count(measures::VULNERABILITIES),
    bugs: remote.count(measures::BUGS),
    code_smells: remote.count(measures::CODE_SMELLS),
    maintainability: remote.rating(&measures::MAINTAINABILITY_RATING),
    reliability: remote.rating(&[measures::RELIABILITY_RATING]),
    security: remote.rating(&[measures::SECURITY_RATING]),
    github_run_url: config.run_url(),
  };

  let risk = risk::evaluate(
    &test_result,
    metrics.coverage,
    metrics.vulnerabilities,
    metrics.bugs,
    metrics.security,
    metrics.maintainability,
  );

  let summary = ProjectSummary {
    project_name: config.repository.clone(),
    github_repo_url: config.repo_url(),
    latest_commit: short_commit,
    latest_status: test_result,
    risk_score: risk,
    latest_metrics: metrics.clone(),
  };

  Report {
    metrics,
    summary,
    risk,
  }
}

/// Run every stage. Only the final upload can fail.
///
/// `sonar` is `None` when the analysis service is not configured.
pub fn run<D: DocumentStore + ?Sized>(
  config: &Config,
  sonar: Option<&dyn SonarApi>,
  sleeper: &dyn Sleeper,
  store: &D,
) -> Result<Report, StoreError> {
  tracing::info!("Parsing local test and coverage results...");
  let local_coverage = coverage::parse_coverage(&config.coverage_file);
  tracing::info!("Test Result: {}, Coverage: {}%", config.test_result, local_coverage);

  let remote = match (sonar, &config.sonar) {
    (Some(api), Some(settings)) => {
      tracing::info!("Fetching SonarCloud analysis results...");
      let candidates = match &config.task_report {
        Some(path) => vec![path.clone()],
        None => task_report::default_report_paths(),
      };
      let task_id = task_report::read_task_id(&candidates);
      collect_remote_metrics(api, &settings.project_key, task_id.as_deref(), &config.poll, sleeper)
    }
    (None, Some(_)) => {
      tracing::warn!("SonarCloud is configured but no client is available. Skipping SonarCloud metrics.");
      MetricsMap::new()
    }
    (_, None) => {
      tracing::info!(
        "Skipping SonarCloud metrics: SONAR_TOKEN, SONAR_PROJECT_KEY, or SONAR_ORGANIZATION not set."
      );
      MetricsMap::new()
    }
  };

  let report = build_report(config, local_coverage, &remote);
  tracing::info!(
    "Build {} classified {} (coverage {}%)",
    report.metrics.id,
    report.risk,
    report.metrics.coverage
  );

  store::upload(store, &config.project_id, &report.metrics, &report.summary)?;
  Ok(report)
}
