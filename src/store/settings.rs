//! Store settings and transaction options
//!
//! `Settings` configures the REST adapter and is also the place where
//! transaction retry and listen polling behavior live, so every engine reads
//! them from one struct.

use crate::error::EatsError;
use rand::Rng;
use std::time::Duration;

/// Retry behavior for `run_transaction`
///
/// The read-compute-write cycle is retried on commit conflicts until it
/// commits or `max_attempts` is reached, at which point
/// `EatsError::TransactionConflict` is returned.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `initial_backoff`: 10ms
/// - `max_backoff`: 1 second
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOptions {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap for exponential backoff
    pub max_backoff: Duration,
    /// Backoff growth factor
    pub multiplier: f64,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl TransactionOptions {
    /// Options with a different attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Options with a different initial backoff
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (0-based), capped at `max_backoff`
    ///
    /// Uses exponential backoff with up to 50% random jitter so racing writers
    /// spread out.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Settings for connecting to the document store
#[derive(Debug, Clone)]
pub struct Settings {
    /// Google Cloud project ID
    pub project_id: String,

    /// Database ID
    ///
    /// Default: "(default)"
    pub database_id: String,

    /// Base URL of the REST endpoint
    ///
    /// Default: "https://firestore.googleapis.com"
    pub host: String,

    /// Firebase ID token sent as a bearer token, if any
    pub id_token: Option<String>,

    /// Web API key appended as `key=` query parameter, if any
    pub api_key: Option<String>,

    /// Per-request timeout
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Transaction retry behavior, used by aggregators built over this store
    pub transaction: TransactionOptions,

    /// How often a live query re-reads the store when the engine has no
    /// push channel
    ///
    /// Default: 2 seconds
    pub listen_poll_interval: Duration,

    /// Consecutive transient failures tolerated by a live query before the
    /// error is reported and the feed stops
    ///
    /// The poll delay doubles after each failure in a row.
    ///
    /// Default: 3
    pub listen_max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_id: "(default)".to_string(),
            host: "https://firestore.googleapis.com".to_string(),
            id_token: None,
            api_key: None,
            request_timeout: Duration::from_secs(30),
            transaction: TransactionOptions::default(),
            listen_poll_interval: Duration::from_secs(2),
            listen_max_retries: 3,
        }
    }
}

impl Settings {
    /// Creates default settings for a project
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Read settings from environment variables
    ///
    /// - `FIRESTORE_PROJECT_ID` (required)
    /// - `FIRESTORE_DATABASE_ID`
    /// - `FIRESTORE_EMULATOR_HOST` (e.g. `localhost:8080`; switches to plain HTTP)
    /// - `FIRESTORE_ID_TOKEN`
    /// - `FIRESTORE_API_KEY`
    pub fn from_env() -> Result<Self, EatsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EatsError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(project_id) = non_empty("FIRESTORE_PROJECT_ID") else {
            return Err(EatsError::invalid_argument(
                "FIRESTORE_PROJECT_ID must be set",
            ));
        };

        let mut settings = Self::new(project_id);
        if let Some(database_id) = non_empty("FIRESTORE_DATABASE_ID") {
            settings.database_id = database_id;
        }
        if let Some(emulator) = non_empty("FIRESTORE_EMULATOR_HOST") {
            settings.host = format!("http://{}", emulator);
            // The emulator accepts this token as an admin credential
            settings.id_token = Some("owner".to_string());
        }
        if let Some(token) = non_empty("FIRESTORE_ID_TOKEN") {
            settings.id_token = Some(token);
        }
        settings.api_key = non_empty("FIRESTORE_API_KEY");
        Ok(settings)
    }

    /// Database resource name: `projects/{project}/databases/{database}`
    pub fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }
}
