//! The Import API contract consumed by the tracker.

/// reqwest-backed implementation.
pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    error::{Operation, TrackerError},
    jobs::{ImportJob, JobId, JobPage, ListQuery},
    validation::ImportFile,
};

pub use http::HttpImportApi;

/// Remote import service. Every call is independent; implementations must be
/// safe to call concurrently from several polling loops.
#[async_trait]
pub trait ImportApi: Send + Sync {
    /// Upload a file and return the id of the created job.
    async fn create_import(&self, file: &ImportFile) -> Result<JobId, TrackerError>;

    /// Fetch one page of jobs.
    async fn list_jobs(&self, query: &ListQuery) -> Result<JobPage, TrackerError>;

    /// Fetch the current state of a single job.
    async fn get_job(&self, job_id: &JobId) -> Result<ImportJob, TrackerError>;

    /// Ask the server to cancel a job. The server may refuse.
    async fn cancel_job(&self, job_id: &JobId) -> Result<(), TrackerError>;
}

/// `{ "data": ... }` on success, `{ "error": { "message": ... } }` on failure.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Error payload inside the envelope.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, treating an `error` member as an API rejection.
    pub fn into_data(self, operation: Operation) -> Result<T, TrackerError> {
        if let Some(err) = self.error {
            return Err(TrackerError::api(operation, err.message));
        }
        self.data.ok_or_else(|| TrackerError::Decode {
            operation,
            message: "response has no data".into(),
        })
    }

    /// Like `into_data` for calls whose success payload is empty.
    pub fn into_unit(self, operation: Operation) -> Result<(), TrackerError> {
        match self.error {
            Some(err) => Err(TrackerError::api(operation, err.message)),
            None => Ok(()),
        }
    }
}
