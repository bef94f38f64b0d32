//! Fetch component measures and normalize them into a [`MetricsMap`].

use crate::coverage::round2;
use crate::error::RemoteError;
use crate::sonar::{AuthScheme, SonarApi};
use crate::types::{MetricValue, MetricsMap, RawMeasure};

pub const BUGS: &str = "bugs";
pub const VULNERABILITIES: &str = "vulnerabilities";
pub const CODE_SMELLS: &str = "code_smells";
pub const COVERAGE: &str = "coverage";
pub const SECURITY_RATING: &str = "security_rating";
pub const RELIABILITY_RATING: &str = "reliability_rating";
/// Both spellings of the maintainability rating; the API reports `sqale_rating`.
pub const MAINTAINABILITY_RATING: [&str; 2] = ["maintainability_rating", "sqale_rating"];

fn is_rating_key(key: &str) -> bool {
  key == SECURITY_RATING || key == RELIABILITY_RATING || MAINTAINABILITY_RATING.contains(&key)
}

/// Ratings pass through untouched, coverage becomes a 2-decimal float, every
/// other measure an integer count. Unparsable values become zero.
pub fn normalize_measures(measures: &[RawMeasure]) -> MetricsMap {
  measures
    .iter()
    .map(|m| {
      let raw = m.value.as_deref().unwrap_or("0");
      let value = if is_rating_key(&m.metric) {
        MetricValue::Rating(raw.to_string())
      } else if m.metric == COVERAGE {
        MetricValue::Percent(
          raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(round2)
            .unwrap_or(0.0),
        )
      } else {
        MetricValue::Count(raw.trim().parse::<i64>().unwrap_or(0))
      };
      (m.metric.clone(), value)
    })
    .collect()
}

/// Measures of one completed analysis. Any failure yields an empty map.
pub fn fetch_measures<A: SonarApi + ?Sized>(api: &A, project_key: &str, analysis_id: &str) -> MetricsMap {
  match api.measures(project_key, Some(analysis_id), AuthScheme::Bearer) {
    Ok(measures) => {
      let metrics = normalize_measures(&measures);
      tracing::info!("Successfully fetched SonarCloud metrics: {}", metrics);
      metrics
    }
    Err(e) => {
      tracing::error!("Error fetching SonarCloud metrics: {}", e);
      MetricsMap::new()
    }
  }
}

/// Latest measures of the project, used when no analysis id is available.
///
/// A bearer token rejected with 401 is retried once as basic auth.
pub fn fetch_latest_measures<A: SonarApi + ?Sized>(api: &A, project_key: &str) -> MetricsMap {
  tracing::info!("Using SonarCloud fallback metrics API...");
  let result = match api.measures(project_key, None, AuthScheme::Bearer) {
    Err(RemoteError::Unauthorized) => {
      tracing::warn!("Bearer token failed. Trying basic auth.");
      api.measures(project_key, None, AuthScheme::Basic)
    }
    other => other,
  };

  match result {
    Ok(measures) => {
      let metrics = normalize_measures(&measures);
      tracing::info!("Successfully fetched SonarCloud (fallback) metrics: {}", metrics);
      metrics
    }
    Err(e) => {
      tracing::error!("Error fetching SonarCloud fallback metrics: {}", e);
      MetricsMap::new()
    }
  }
}
