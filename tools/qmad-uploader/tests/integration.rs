//! End-to-end runs of the pipeline against a scripted analysis service and an
//! in-memory document store.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use qmad_uploader::sonar::{AuthScheme, TaskStatus};
use qmad_uploader::types::RawMeasure;
use qmad_uploader::{
  pipeline, Config, DocumentStore, DocumentWrite, PollPolicy, RemoteError, RiskLevel, Sleeper,
  SonarApi, SonarSettings, StoreError, WriteMode,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeSonar {
  /// Statuses returned in order; the last one repeats.
  statuses: Vec<TaskStatus>,
  task_calls: Cell<usize>,
  measures: Vec<(&'static str, &'static str)>,
  reject_bearer: bool,
  /// Analysis-scoped queries come back with no measures.
  empty_scoped: bool,
  measure_calls: RefCell<Vec<(Option<String>, AuthScheme)>>,
}

impl FakeSonar {
  fn new(statuses: Vec<TaskStatus>, measures: Vec<(&'static str, &'static str)>) -> Self {
    Self {
      statuses,
      task_calls: Cell::new(0),
      measures,
      reject_bearer: false,
      empty_scoped: false,
      measure_calls: RefCell::new(Vec::new()),
    }
  }
}

impl SonarApi for FakeSonar {
  fn task_status(&self, task_id: &str) -> Result<TaskStatus, RemoteError> {
    assert_eq!(task_id, "AYx1-task");
    let i = self.task_calls.get();
    self.task_calls.set(i + 1);
    let status = self.statuses.get(i).or(self.statuses.last()).cloned();
    status.ok_or_else(|| RemoteError::decode("no status scripted"))
  }

  fn measures(
    &self,
    project_key: &str,
    analysis_id: Option<&str>,
    auth: AuthScheme,
  ) -> Result<Vec<RawMeasure>, RemoteError> {
    assert_eq!(project_key, "acme_app");
    self
      .measure_calls
      .borrow_mut()
      .push((analysis_id.map(str::to_string), auth));
    if self.reject_bearer && auth == AuthScheme::Bearer {
      return Err(RemoteError::Unauthorized);
    }
    if self.empty_scoped && analysis_id.is_some() {
      return Ok(Vec::new());
    }
    Ok(
      self
        .measures
        .iter()
        .map(|(metric, value)| RawMeasure {
          metric: metric.to_string(),
          value: Some(value.to_string()),
        })
        .collect(),
    )
  }
}

#[derive(Default)]
struct NoSleep {
  naps: Cell<u32>,
}

impl Sleeper for NoSleep {
  fn sleep(&self, _duration: Duration) {
    self.naps.set(self.naps.get() + 1);
  }
}

/// Applies writes the way the hosted store does: replace or leaf-merge.
#[derive(Default)]
struct MemoryStore {
  docs: RefCell<BTreeMap<String, serde_json::Map<String, serde_json::Value>>>,
  writes: RefCell<Vec<DocumentWrite>>,
  fail: bool,
}

fn merge_into(target: &mut serde_json::Map<String, serde_json::Value>, src: &serde_json::Map<String, serde_json::Value>) {
  for (k, v) in src {
    match (target.get_mut(k), v) {
      (Some(serde_json::Value::Object(t)), serde_json::Value::Object(s)) => merge_into(t, s),
      _ => {
        target.insert(k.clone(), v.clone());
      }
    }
  }
}

impl DocumentStore for MemoryStore {
  fn write(&self, write: &DocumentWrite) -> Result<(), StoreError> {
    if self.fail {
      return Err(StoreError::Rejected {
        path: write.path.clone(),
        status: 503,
        body: "UNAVAILABLE".into(),
      });
    }
    self.writes.borrow_mut().push(write.clone());
    let mut docs = self.docs.borrow_mut();
    match write.mode {
      WriteMode::Replace => {
        docs.insert(write.path.clone(), write.fields.clone());
      }
      WriteMode::Merge => merge_into(docs.entry(write.path.clone()).or_default(), &write.fields),
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn workspace(line_rate: Option<&str>, with_task_report: bool) -> tempfile::TempDir {
  let dir = tempfile::tempdir().unwrap();
  if let Some(rate) = line_rate {
    fs::write(
      dir.path().join("coverage.xml"),
      format!(r#"<?xml version="1.0" ?><coverage line-rate="{}"></coverage>"#, rate),
    )
    .unwrap();
  }
  if with_task_report {
    fs::write(
      dir.path().join("report-task.txt"),
      "projectKey=acme_app\nceTaskId=AYx1-task\n",
    )
    .unwrap();
  }
  dir
}

fn config(dir: &Path, sonar: bool) -> Config {
  Config {
    project_id: "acme-app".into(),
    commit_sha: "f00dbabe1234567890".into(),
    repository: "acme/app".into(),
    run_id: "4242".into(),
    test_result: "PASS".into(),
    github_server_url: "https://github.com".into(),
    coverage_file: dir.join("coverage.xml"),
    task_report: Some(dir.join("report-task.txt")),
    sonar: if sonar {
      SonarSettings::from_parts(
        "https://sonarcloud.io",
        Some("tok".into()),
        Some("acme_app".into()),
        Some("acme".into()),
      )
    } else {
      None
    },
    poll: PollPolicy::default(),
  }
}

fn healthy_measures() -> Vec<(&'static str, &'static str)> {
  vec![
    ("bugs", "2"),
    ("vulnerabilities", "0"),
    ("code_smells", "31"),
    ("coverage", "77.7"),
    ("security_rating", "1.0"),
    ("reliability_rating", "2.0"),
    ("sqale_rating", "1.0"),
  ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn completed_analysis_produces_both_documents() {
  let dir = workspace(Some("0.856"), true);
  let sonar = FakeSonar::new(
    vec![
      TaskStatus::Pending("PENDING".into()),
      TaskStatus::Pending("IN_PROGRESS".into()),
      TaskStatus::Success {
        analysis_id: Some("AN-7".into()),
      },
    ],
    healthy_measures(),
  );
  let sleeper = NoSleep::default();
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), Some(&sonar), &sleeper, &store).unwrap();

  assert_eq!(report.risk, RiskLevel::Green);
  assert_eq!(sleeper.naps.get(), 2);
  assert_eq!(
    sonar.measure_calls.borrow().as_slice(),
    &[(Some("AN-7".to_string()), AuthScheme::Bearer)]
  );

  let docs = store.docs.borrow();
  let metrics = &docs["projects/acme-app/metrics/f00dbab"];
  assert_eq!(metrics["id"], "f00dbab");
  assert_eq!(metrics["coverage"], 85.6);
  assert_eq!(metrics["bugs"], 2);
  assert_eq!(metrics["codeSmells"], 31);
  assert_eq!(metrics["security"], "A");
  assert_eq!(metrics["reliability"], "B");
  assert_eq!(metrics["maintainability"], "A");
  assert_eq!(metrics["githubRunUrl"], "https://github.com/acme/app/actions/runs/4242");

  let summary = &docs["projects/acme-app"];
  assert_eq!(summary["projectName"], "acme/app");
  assert_eq!(summary["latestCommit"], "f00dbab");
  assert_eq!(summary["latestStatus"], "PASS");
  assert_eq!(summary["riskScore"], "GREEN");
  assert_eq!(summary["latestMetrics"]["coverage"], 85.6);

  let writes = store.writes.borrow();
  assert!(writes[0].server_timestamps.contains(&"timestamp".to_string()));
  assert!(writes[1].server_timestamps.contains(&"lastAnalyzed".to_string()));
}

#[test]
fn summary_merge_preserves_unrelated_fields() {
  let dir = workspace(Some("0.9"), false);
  let store = MemoryStore::default();
  store.docs.borrow_mut().insert(
    "projects/acme-app".into(),
    serde_json::from_str(r#"{"owner":"team-a","riskScore":"RED","latestMetrics":{"legacy":true}}"#).unwrap(),
  );

  pipeline::run(&config(dir.path(), false), None, &NoSleep::default(), &store).unwrap();

  let docs = store.docs.borrow();
  let summary = &docs["projects/acme-app"];
  assert_eq!(summary["owner"], "team-a");
  assert_eq!(summary["riskScore"], "GREEN");
  assert_eq!(summary["latestMetrics"]["legacy"], true);
  assert_eq!(summary["latestMetrics"]["id"], "f00dbab");
}

#[test]
fn reprocessing_a_commit_replaces_its_metrics_document() {
  let dir = workspace(Some("0.9"), false);
  let store = MemoryStore::default();
  store.docs.borrow_mut().insert(
    "projects/acme-app/metrics/f00dbab".into(),
    serde_json::from_str(r#"{"stale":1}"#).unwrap(),
  );

  pipeline::run(&config(dir.path(), false), None, &NoSleep::default(), &store).unwrap();

  let docs = store.docs.borrow();
  let metrics = &docs["projects/acme-app/metrics/f00dbab"];
  assert!(metrics.get("stale").is_none());
  assert_eq!(metrics["security"], "N/A");
}

#[test]
fn without_sonar_config_only_local_signals_count() {
  let dir = workspace(Some("0.65"), true);
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), false), None, &NoSleep::default(), &store).unwrap();

  assert_eq!(report.metrics.coverage, 65.0);
  assert_eq!(report.metrics.vulnerabilities, 0);
  assert_eq!(report.risk, RiskLevel::Yellow);
}

#[test]
fn timed_out_analysis_falls_back_to_latest_measures() {
  let dir = workspace(None, true);
  let sonar = FakeSonar::new(vec![TaskStatus::Pending("IN_PROGRESS".into())], healthy_measures());
  let sleeper = NoSleep::default();
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), Some(&sonar), &sleeper, &store).unwrap();

  assert_eq!(sonar.task_calls.get(), 20);
  assert_eq!(sleeper.naps.get(), 20);
  assert_eq!(sonar.measure_calls.borrow().as_slice(), &[(None, AuthScheme::Bearer)]);
  // No local report, so the service's coverage is used.
  assert_eq!(report.metrics.coverage, 77.7);
  assert_eq!(report.risk, RiskLevel::Green);
}

#[test]
fn failed_analysis_falls_back_without_waiting() {
  let dir = workspace(Some("0.8"), true);
  let sonar = FakeSonar::new(vec![TaskStatus::Failed], vec![("vulnerabilities", "3")]);
  let sleeper = NoSleep::default();
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), Some(&sonar), &sleeper, &store).unwrap();

  assert_eq!(sonar.task_calls.get(), 1);
  assert_eq!(sleeper.naps.get(), 0);
  assert_eq!(report.metrics.vulnerabilities, 3);
  assert_eq!(report.risk, RiskLevel::Red);
}

#[test]
fn missing_task_report_uses_fallback_with_basic_auth_retry() {
  let dir = workspace(Some("0.8"), false);
  let mut sonar = FakeSonar::new(vec![], healthy_measures());
  sonar.reject_bearer = true;
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), Some(&sonar), &NoSleep::default(), &store).unwrap();

  assert_eq!(sonar.task_calls.get(), 0);
  assert_eq!(
    sonar.measure_calls.borrow().as_slice(),
    &[(None, AuthScheme::Bearer), (None, AuthScheme::Basic)]
  );
  assert_eq!(report.metrics.bugs, 2);
}

#[test]
fn empty_scoped_measures_fall_back_to_latest() {
  let dir = workspace(Some("0.8"), true);
  let mut sonar = FakeSonar::new(
    vec![TaskStatus::Success {
      analysis_id: Some("AN-9".into()),
    }],
    healthy_measures(),
  );
  sonar.empty_scoped = true;
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), Some(&sonar), &NoSleep::default(), &store).unwrap();

  assert_eq!(
    sonar.measure_calls.borrow().as_slice(),
    &[(Some("AN-9".to_string()), AuthScheme::Bearer), (None, AuthScheme::Bearer)]
  );
  assert_eq!(report.metrics.bugs, 2);
  assert_eq!(report.metrics.code_smells, 31);
}

#[test]
fn configured_sonar_without_client_keeps_local_signals() {
  let dir = workspace(Some("0.65"), true);
  let store = MemoryStore::default();

  let report = pipeline::run(&config(dir.path(), true), None, &NoSleep::default(), &store).unwrap();

  assert_eq!(report.metrics.coverage, 65.0);
  assert_eq!(report.metrics.vulnerabilities, 0);
  assert_eq!(store.docs.borrow()["projects/acme-app/metrics/f00dbab"]["security"], "N/A");
}

#[test]
fn store_failure_is_returned() {
  let dir = workspace(Some("0.8"), false);
  let store = MemoryStore {
    fail: true,
    ..Default::default()
  };

  let err = pipeline::run(&config(dir.path(), false), None, &NoSleep::default(), &store).unwrap_err();
  assert!(err.to_string().contains("503"));
}
