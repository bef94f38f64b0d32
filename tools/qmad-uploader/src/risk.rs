//! Build risk classification and coverage source selection.

use crate::types::{Rating, RiskLevel, TestOutcome};

/// Coverage below this is at least YELLOW.
pub const MIN_COVERAGE: f64 = 70.0;
/// More bugs than this is at least YELLOW.
pub const MAX_BUGS: u64 = 5;
/// Security worse than this is RED.
pub const WORST_ACCEPTABLE_SECURITY: Rating = Rating::C;
/// Maintainability worse than this is at least YELLOW.
pub const WORST_ACCEPTABLE_MAINTAINABILITY: Rating = Rating::B;

/// First matching rule wins: RED, then YELLOW, else GREEN.
///
/// An unknown rating (`None`) never raises the level.
pub fn evaluate(
  test_outcome: &TestOutcome,
  coverage: f64,
  vulnerabilities: u64,
  bugs: u64,
  security: Option<Rating>,
  maintainability: Option<Rating>,
) -> RiskLevel {
  let worse_than = |rating: Option<Rating>, limit: Rating| rating.is_some_and(|r| r > limit);

  if test_outcome.is_failure() || vulnerabilities > 0 || worse_than(security, WORST_ACCEPTABLE_SECURITY) {
    RiskLevel::Red
  } else if coverage < MIN_COVERAGE
    || bugs > MAX_BUGS
    || worse_than(maintainability, WORST_ACCEPTABLE_MAINTAINABILITY)
  {
    RiskLevel::Yellow
  } else {
    RiskLevel::Green
  }
}

/// Local coverage wins unless it is exactly zero and the service has a value.
pub fn select_coverage(local: f64, remote: f64) -> f64 {
  if local == 0.0 && remote > 0.0 {
    remote
  } else {
    local
  }
}
