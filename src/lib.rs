//! Client-side tracker for bulk product-import jobs run by a remote Import API.

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod jobs;
pub mod poller;
pub mod registry;
pub mod tracker;
pub mod validation;
pub mod view;

pub use api::{HttpImportApi, ImportApi};
pub use config::Config;
pub use error::{Operation, TrackerError};
pub use events::{StopReason, TrackerEvent};
pub use jobs::{ImportJob, JobId, JobPage, JobStatus, ListQuery, Sort};
pub use poller::PollHandle;
pub use tracker::{ImportTracker, TrackerSettings, ViewSnapshot};
pub use validation::ImportFile;
