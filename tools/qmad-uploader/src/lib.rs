//! Q-MAD uploader — collects the quality signals of one CI build and
//! publishes them to the dashboard's Firestore database.
//!
//! Reads the local coverage report, waits for the SonarCloud analysis of the
//! build and fetches its measures, classifies the build GREEN / YELLOW / RED,
//! then writes the per-commit metrics document and merges the project summary.
//!
//! Strictly sequential; the only wait is the fixed-interval analysis poll.

pub mod config;
pub mod coverage;
pub mod error;
pub mod firestore;
pub mod measures;
pub mod pipeline;
pub mod poll;
pub mod risk;
pub mod sonar;
pub mod store;
pub mod task_report;
pub mod types;

pub use config::{Config, PollPolicy, SonarSettings};
pub use error::{ConfigError, RemoteError, StoreError, UploaderError};
pub use pipeline::{run, Report};
pub use poll::{Sleeper, ThreadSleeper};
pub use sonar::{SonarApi, SonarClient};
pub use store::{DocumentStore, DocumentWrite, WriteMode};
pub use types::{BuildMetrics, MetricsMap, ProjectSummary, Rating, RiskLevel, TestOutcome};
