//! Core types for Nimbus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single set of flower measurements, the unit of prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl PredictionRecord {
    /// Column names in the order models expect them
    pub const FEATURE_NAMES: [&'static str; 4] =
        ["sepal_length", "sepal_width", "petal_length", "petal_width"];

    /// Number of features in a record
    pub const NUM_FEATURES: usize = 4;

    /// Create a new record
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// The record as one row of the tabular model input
    pub fn to_row(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

/// Opaque batch job identifier issued by the task queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random job id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue-visible lifecycle of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submitted but not picked up by a worker (also reported for unknown ids)
    Pending,
    /// A worker has taken the job
    Started,
    /// The model is available and prediction is underway
    Progress,
    /// Finished with a `Complete` outcome
    Success,
    /// Finished with a `Failed` outcome
    Failure,
}

impl JobState {
    /// Whether the job has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Intermediate progress marker published by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }
}

/// Terminal payload of a batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum BatchOutcome {
    /// Every record was predicted
    Complete { count: usize, results: Vec<i64> },

    /// No model was available or prediction failed; no partial results
    Failed { error: String },
}

impl BatchOutcome {
    /// Build a successful outcome from the predicted labels
    pub fn complete(results: Vec<i64>) -> Self {
        Self::Complete {
            count: results.len(),
            results,
        }
    }

    /// Build a failed outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// The job state this outcome settles into
    pub fn job_state(&self) -> JobState {
        match self {
            Self::Complete { .. } => JobState::Success,
            Self::Failed { .. } => JobState::Failure,
        }
    }
}

/// Result payload visible while polling a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Outcome(BatchOutcome),
    Progress(Progress),
}

/// Bookkeeping record for a batch job, as returned by queue queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted (or unknown) job
    pub fn pending(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state: JobState::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the job as taken by a worker
    pub fn start(&mut self) {
        self.state = JobState::Started;
        self.result = None;
        self.touch();
    }

    /// Publish an intermediate progress marker
    pub fn progress(&mut self, progress: Progress) {
        self.state = JobState::Progress;
        self.result = Some(JobResult::Progress(progress));
        self.touch();
    }

    /// Settle the job with its terminal outcome
    pub fn finish(&mut self, outcome: BatchOutcome) {
        self.state = outcome.job_state();
        self.result = Some(JobResult::Outcome(outcome));
        self.touch();
    }

    /// The terminal outcome, if the job has one
    pub fn outcome(&self) -> Option<&BatchOutcome> {
        match &self.result {
            Some(JobResult::Outcome(outcome)) => Some(outcome),
            _ => None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Message carried by the task queue from the server to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub job_id: JobId,
    pub records: Vec<PredictionRecord>,
}

impl TaskMessage {
    pub fn new(job_id: JobId, records: Vec<PredictionRecord>) -> Self {
        Self { job_id, records }
    }
}
