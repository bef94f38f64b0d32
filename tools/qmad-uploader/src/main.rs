//! Binary entrypoint: read the CI environment, run the pipeline, exit non-zero
//! on configuration or store failures.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use qmad_uploader::firestore::{FirestoreStore, ServiceAccount};
use qmad_uploader::{pipeline, Config, PollPolicy, Report, SonarApi, SonarClient, SonarSettings};
use qmad_uploader::{ThreadSleeper, UploaderError};

#[derive(Parser)]
#[command(name = "qmad-uploader", about = "Upload build quality metrics to the Q-MAD dashboard")]
struct Cli {
  /// Dashboard project document id
  #[arg(long, env = "QMAD_PROJECT_ID")]
  project_id: String,

  /// Full commit SHA of the build
  #[arg(long, env = "GITHUB_SHA")]
  commit_sha: String,

  /// Repository as owner/name
  #[arg(long, env = "GITHUB_REPOSITORY")]
  repository: String,

  /// CI run id, used for the run link
  #[arg(long, env = "GITHUB_RUN_ID")]
  run_id: String,

  /// Service-account key JSON for the Firestore project
  #[arg(long, env = "QMAD_FIREBASE_SERVICE_ACCOUNT", hide_env_values = true)]
  service_account: String,

  /// Test outcome token (PASS / FAIL)
  #[arg(long, env = "PYTEST_RESULT")]
  test_result: String,

  #[arg(long, env = "SONAR_TOKEN", hide_env_values = true)]
  sonar_token: Option<String>,

  #[arg(long, env = "SONAR_PROJECT_KEY")]
  sonar_project_key: Option<String>,

  #[arg(long, env = "SONAR_ORGANIZATION")]
  sonar_organization: Option<String>,

  #[arg(long, env = "SONAR_HOST_URL", default_value = qmad_uploader::sonar::DEFAULT_HOST)]
  sonar_host: String,

  #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
  github_server_url: String,

  /// Cobertura coverage report
  #[arg(long, env = "QMAD_COVERAGE_FILE", default_value = "coverage.xml")]
  coverage_file: PathBuf,

  /// Scanner report-task.txt (defaults to the scanner's known locations)
  #[arg(long, env = "QMAD_TASK_REPORT")]
  task_report: Option<PathBuf>,

  /// host:port of a Firestore emulator
  #[arg(long, env = "FIRESTORE_EMULATOR_HOST")]
  firestore_emulator_host: Option<String>,
}

impl Cli {
  fn config(&self) -> Config {
    Config {
      project_id: self.project_id.clone(),
      commit_sha: self.commit_sha.clone(),
      repository: self.repository.clone(),
      run_id: self.run_id.clone(),
      test_result: self.test_result.clone(),
      github_server_url: self.github_server_url.clone(),
      coverage_file: self.coverage_file.clone(),
      task_report: self.task_report.clone(),
      sonar: SonarSettings::from_parts(
        &self.sonar_host,
        self.sonar_token.clone(),
        self.sonar_project_key.clone(),
        self.sonar_organization.clone(),
      ),
      poll: PollPolicy::default(),
    }
  }

  fn log_loaded(&self) {
    tracing::info!("Loaded config QMAD_PROJECT_ID: {}", self.project_id);
    tracing::info!("Loaded config GITHUB_SHA: {}", self.commit_sha);
    tracing::info!("Loaded config GITHUB_REPOSITORY: {}", self.repository);
    tracing::info!("Loaded config GITHUB_RUN_ID: {}", self.run_id);
    tracing::info!("Successfully loaded secret QMAD_FIREBASE_SERVICE_ACCOUNT.");
    if self.sonar_token.as_deref().is_some_and(|t| !t.is_empty()) {
      tracing::info!("Successfully loaded secret SONAR_TOKEN.");
    }
    if let Some(key) = &self.sonar_project_key {
      tracing::info!("Loaded config SONAR_PROJECT_KEY: {}", key);
    }
    if let Some(org) = &self.sonar_organization {
      tracing::info!("Loaded config SONAR_ORGANIZATION: {}", org);
    }
    tracing::info!("Loaded config PYTEST_RESULT: {}", self.test_result);
  }
}

fn init_tracing() {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
  if std::env::var("LOG_FORMAT").unwrap_or_default() == "json" {
    tracing_subscriber::fmt()
      .json()
      .with_env_filter(filter)
      .with_writer(std::io::stdout)
      .init();
  } else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_target(false)
      .with_writer(std::io::stdout)
      .init();
  }
}

fn main() -> ExitCode {
  init_tracing();
  let cli = Cli::parse();
  tracing::info!("Starting Q-MAD data uploader...");

  match run_binary(&cli) {
    Ok(report) => {
      tracing::info!(
        "Q-MAD upload complete ({} is {}). Check your dashboard.",
        report.metrics.id,
        report.risk
      );
      ExitCode::SUCCESS
    }
    Err(e) => {
      tracing::error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn run_binary(cli: &Cli) -> Result<Report, UploaderError> {
  let config = cli.config();
  config.validate()?;
  cli.log_loaded();

  let account = ServiceAccount::from_json(&cli.service_account)?;
  let store = FirestoreStore::connect(&account, cli.firestore_emulator_host.as_deref())?;
  tracing::info!("Firebase connection successful.");

  let sonar = config.sonar.as_ref().and_then(|s| match SonarClient::new(&s.host, &s.token) {
    Ok(client) => Some(client),
    Err(e) => {
      tracing::warn!("Could not create SonarCloud client, skipping remote metrics: {}", e);
      None
    }
  });

  let report = pipeline::run(
    &config,
    sonar.as_ref().map(|c| c as &dyn SonarApi),
    &ThreadSleeper,
    &store,
  )?;
  Ok(report)
}
