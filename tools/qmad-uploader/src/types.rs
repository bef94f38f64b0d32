//! Core types for the uploader (store documents + normalized metrics).

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Stored in place of a rating the analysis service did not report.
pub const UNKNOWN_RATING: &str = "N/A";

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

/// Letter grade used by the analysis service. Declaration order is severity
/// order: `A` is best, `E` is worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rating {
  A,
  B,
  C,
  D,
  E,
}

impl Rating {
  /// Accepts letter grades and the numeric form the measures API returns
  /// for rating metrics (`"1.0"` is A, `"5.0"` is E).
  pub fn parse(s: &str) -> Option<Self> {
    let s = s.trim();
    match s.to_ascii_uppercase().as_str() {
      "A" => return Some(Self::A),
      "B" => return Some(Self::B),
      "C" => return Some(Self::C),
      "D" => return Some(Self::D),
      "E" => return Some(Self::E),
      _ => {}
    }
    let n: f64 = s.parse().ok()?;
    match n.round() as i64 {
      1 => Some(Self::A),
      2 => Some(Self::B),
      3 => Some(Self::C),
      4 => Some(Self::D),
      5 => Some(Self::E),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::A => "A",
      Self::B => "B",
      Self::C => "C",
      Self::D => "D",
      Self::E => "E",
    }
  }
}

impl fmt::Display for Rating {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn rating_or_unknown<S: Serializer>(rating: &Option<Rating>, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(rating.map_or(UNKNOWN_RATING, Rating::as_str))
}

// ---------------------------------------------------------------------------
// Test outcome + risk level
// ---------------------------------------------------------------------------

/// Test outcome token exactly as handed over by CI (e.g. `PASS`, `FAIL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TestOutcome(String);

impl TestOutcome {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_failure(&self) -> bool {
    matches!(
      self.0.trim().to_ascii_uppercase().as_str(),
      "FAIL" | "FAILED" | "FAILURE"
    )
  }
}

impl fmt::Display for TestOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
  Green,
  Yellow,
  Red,
}

impl fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Green => "GREEN",
      Self::Yellow => "YELLOW",
      Self::Red => "RED",
    })
  }
}

// ---------------------------------------------------------------------------
// Remote metrics (normalized)
// ---------------------------------------------------------------------------

/// One measure as returned by the analysis service. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMeasure {
  pub metric: String,
  #[serde(default)]
  pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
  Rating(String),
  Percent(f64),
  Count(i64),
}

/// Normalized remote metrics keyed by the service's metric key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsMap(BTreeMap<String, MetricValue>);

impl MetricsMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, key: &str) -> Option<&MetricValue> {
    self.0.get(key)
  }

  /// Non-negative count for `key`; 0 when absent or not a count.
  pub fn count(&self, key: &str) -> u64 {
    match self.0.get(key) {
      Some(MetricValue::Count(n)) => (*n).max(0) as u64,
      _ => 0,
    }
  }

  /// Percentage for `key`; 0.0 when absent or not a percentage.
  pub fn percent(&self, key: &str) -> f64 {
    match self.0.get(key) {
      Some(MetricValue::Percent(p)) => *p,
      _ => 0.0,
    }
  }

  /// First of `keys` holding a recognizable rating.
  pub fn rating(&self, keys: &[&str]) -> Option<Rating> {
    keys.iter().find_map(|k| match self.0.get(*k) {
      Some(MetricValue::Rating(s)) => Rating::parse(s),
      _ => None,
    })
  }
}

impl FromIterator<(String, MetricValue)> for MetricsMap {
  fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl fmt::Display for MetricsMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      match v {
        MetricValue::Rating(s) => write!(f, "{}: {}", k, s)?,
        MetricValue::Percent(p) => write!(f, "{}: {}", k, p)?,
        MetricValue::Count(n) => write!(f, "{}: {}", k, n)?,
      }
    }
    f.write_str("}")
  }
}

// ---------------------------------------------------------------------------
// Store documents (camelCase field names are the dashboard's contract)
// ---------------------------------------------------------------------------

/// Per-commit metrics document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetrics {
  pub id: String,
  pub test_result: TestOutcome,
  pub coverage: f64,
  pub vulnerabilities: u64,
  pub bugs: u64,
  pub code_smells: u64,
  #[serde(serialize_with = "rating_or_unknown")]
  pub maintainability: Option<Rating>,
  #[serde(serialize_with = "rating_or_unknown")]
  pub reliability: Option<Rating>,
  #[serde(serialize_with = "rating_or_unknown")]
  pub security: Option<Rating>,
  pub github_run_url: String,
}

impl BuildMetrics {
  /// Server-assigned creation time.
  pub const TIMESTAMP_FIELD: &'static str = "timestamp";
}

/// Rolling per-project summary, merged on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
  pub project_name: String,
  pub github_repo_url: String,
  pub latest_commit: String,
  pub latest_status: TestOutcome,
  pub risk_score: RiskLevel,
  pub latest_metrics: BuildMetrics,
}

impl ProjectSummary {
  pub const LAST_ANALYZED_FIELD: &'static str = "lastAnalyzed";
  pub const LATEST_METRICS_FIELD: &'static str = "latestMetrics";
}
