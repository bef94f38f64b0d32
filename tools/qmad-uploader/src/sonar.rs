//! SonarCloud / SonarQube Web API client (task status + component measures).

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::RemoteError;
use crate::types::RawMeasure;

pub const DEFAULT_HOST: &str = "https://sonarcloud.io";

/// Measures requested for every build. `sqale_rating` is the maintainability rating.
pub const METRIC_KEYS: &str =
  "bugs,vulnerabilities,code_smells,coverage,security_rating,reliability_rating,sqale_rating";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
  /// `Authorization: Bearer <token>`.
  Bearer,
  /// Token as user name, empty password.
  Basic,
}

/// Compute-engine task state, reduced to what the poller acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
  Success { analysis_id: Option<String> },
  Failed,
  Canceled,
  /// Anything else (`PENDING`, `IN_PROGRESS`, missing status).
  Pending(String),
}

/// The two read-only endpoints the uploader needs.
pub trait SonarApi {
  fn task_status(&self, task_id: &str) -> Result<TaskStatus, RemoteError>;

  fn measures(
    &self,
    project_key: &str,
    analysis_id: Option<&str>,
    auth: AuthScheme,
  ) -> Result<Vec<RawMeasure>, RemoteError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaskResponse {
  #[serde(default)]
  task: Option<CeTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CeTask {
  #[serde(default)]
  status: Option<String>,
  #[serde(default)]
  analysis_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeasuresResponse {
  #[serde(default)]
  component: Option<Component>,
}

#[derive(Debug, Deserialize)]
struct Component {
  #[serde(default)]
  measures: Vec<RawMeasure>,
}

pub fn parse_task_response(body: &str) -> Result<TaskStatus, RemoteError> {
  let resp: TaskResponse =
    serde_json::from_str(body).map_err(|e| RemoteError::decode(format!("task response: {}", e)))?;
  let task = resp.task.unwrap_or(CeTask {
    status: None,
    analysis_id: None,
  });
  Ok(match task.status.as_deref() {
    Some("SUCCESS") => TaskStatus::Success {
      analysis_id: task.analysis_id,
    },
    Some("FAILED") => TaskStatus::Failed,
    Some("CANCELED") => TaskStatus::Canceled,
    Some(other) => TaskStatus::Pending(other.to_string()),
    None => TaskStatus::Pending("unknown".to_string()),
  })
}

pub fn parse_measures_response(body: &str) -> Result<Vec<RawMeasure>, RemoteError> {
  let resp: MeasuresResponse = serde_json::from_str(body)
    .map_err(|e| RemoteError::decode(format!("measures response: {}", e)))?;
  Ok(resp.component.map(|c| c.measures).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct SonarClient {
  http: Client,
  host: String,
  token: String,
}

impl SonarClient {
  pub fn new(host: &str, token: &str) -> Result<Self, RemoteError> {
    let http = Client::builder().user_agent("qmad-uploader").build()?;
    Ok(Self {
      http,
      host: host.trim_end_matches('/').to_string(),
      token: token.to_string(),
    })
  }

  fn authorize(&self, req: RequestBuilder, auth: AuthScheme) -> RequestBuilder {
    match auth {
      AuthScheme::Bearer => req.bearer_auth(&self.token),
      AuthScheme::Basic => req.basic_auth(&self.token, Some("")),
    }
  }

  /// Body of a successful response; 401 is reported separately from other statuses.
  fn read_body(resp: Response) -> Result<String, RemoteError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
      return Err(RemoteError::Unauthorized);
    }
    let body = resp.text()?;
    if !status.is_success() {
      return Err(RemoteError::Status {
        status: status.as_u16(),
        body,
      });
    }
    Ok(body)
  }
}

impl SonarApi for SonarClient {
  fn task_status(&self, task_id: &str) -> Result<TaskStatus, RemoteError> {
    let url = format!("{}/api/ce/task", self.host);
    let req = self.http.get(&url).query(&[("id", task_id)]);
    let resp = self.authorize(req, AuthScheme::Bearer).send()?;
    parse_task_response(&Self::read_body(resp)?)
  }

  fn measures(
    &self,
    project_key: &str,
    analysis_id: Option<&str>,
    auth: AuthScheme,
  ) -> Result<Vec<RawMeasure>, RemoteError> {
    let url = format!("{}/api/measures/component", self.host);
    let mut params = vec![("component", project_key), ("metricKeys", METRIC_KEYS)];
    if let Some(id) = analysis_id {
      params.push(("analysisId", id));
    }
    let req = self.http.get(&url).query(&params);
    let resp = self.authorize(req, auth).send()?;
    parse_measures_response(&Self::read_body(resp)?)
  }
}
