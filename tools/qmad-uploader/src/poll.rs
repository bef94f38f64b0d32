//! Wait for the analysis task to finish and resolve its analysis id.

use std::time::Duration;

use crate::config::PollPolicy;
use crate::sonar::{SonarApi, TaskStatus};

/// Blocking wait between polls. Injected so tests never sleep.
pub trait Sleeper {
  fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
  fn sleep(&self, duration: Duration) {
    std::thread::sleep(duration);
  }
}

/// Poll the task until it succeeds, fails, or the budget runs out.
///
/// `FAILED` and `CANCELED` end polling at once. Unfinished tasks and request
/// errors are retried after `policy.interval`. `None` sends the caller to the
/// latest-measures fallback.
pub fn poll_analysis<A, S>(api: &A, task_id: &str, policy: &PollPolicy, sleeper: &S) -> Option<String>
where
  A: SonarApi + ?Sized,
  S: Sleeper + ?Sized,
{
  for attempt in 1..=policy.attempts {
    match api.task_status(task_id) {
      Ok(TaskStatus::Success { analysis_id }) => {
        tracing::info!("SonarCloud analysis is complete (Attempt {}).", attempt);
        if analysis_id.is_none() {
          tracing::warn!("SonarCloud task {} reported no analysisId.", task_id);
        }
        return analysis_id;
      }
      Ok(TaskStatus::Failed) => {
        tracing::error!("SonarCloud analysis FAILED.");
        return None;
      }
      Ok(TaskStatus::Canceled) => {
        tracing::error!("SonarCloud analysis CANCELED.");
        return None;
      }
      Ok(TaskStatus::Pending(status)) => {
        tracing::info!(
          "SonarCloud analysis in progress (Status: {}). Waiting {} seconds...",
          status,
          policy.interval.as_secs()
        );
      }
      Err(e) => {
        tracing::error!("Error polling SonarCloud API: {}", e);
      }
    }
    sleeper.sleep(policy.interval);
  }

  tracing::error!("SonarCloud analysis timed out.");
  None
}
