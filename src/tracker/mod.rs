//! Import job tracker: submits imports, keeps the reconciled job list, and
//! polls in-flight jobs until the server reports a terminal status.

mod worker;


use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    api::ImportApi,
    config::Config,
    error::TrackerError,
    events::TrackerEvent,
    jobs::{ImportJob, JobId, JobPage, ListQuery, Sort},
    poller::PollHandle,
    validation::{ImportFile, validate_import_file},
};

use worker::{TrackerCmd, Worker};

/// Knobs the tracker needs from the config.
#[derive(Clone, Debug)]
pub struct TrackerSettings {
    /// Delay between the end of one status fetch and the next.
    pub poll_interval: Duration,
    /// Extensions accepted by the advisory upload check.
    pub allowed_extensions: Vec<String>,
    /// Query used for internal refreshes before any list was requested.
    pub default_query: ListQuery,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            allowed_extensions: vec!["csv".into()],
            default_query: ListQuery::first_page(10, Sort::default()),
        }
    }
}

impl From<&Config> for TrackerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.polling.interval(),
            allowed_extensions: cfg.upload.allowed_extensions.clone(),
            default_query: cfg.listing.first_page(),
        }
    }
}

/// Point-in-time copy of the tracker state.
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    /// Query of the applied page.
    pub query: Option<ListQuery>,
    /// Applied page with polled data merged in.
    pub page: Option<JobPage>,
    /// Job shown as live progress.
    pub active_job: Option<ImportJob>,
    /// Ids with a running polling loop.
    pub polling: Vec<JobId>,
}

/// Cloneable handle to a running tracker.
///
/// All state lives in one worker task; API calls for direct actions run in
/// the caller's task and only their results are handed to the worker. The
/// worker stops when `shutdown` is called or the last handle is dropped.
#[derive(Clone)]
pub struct ImportTracker {
    cmd_tx: mpsc::Sender<TrackerCmd>,
    events: broadcast::Sender<TrackerEvent>,
    api: Arc<dyn ImportApi>,
    settings: TrackerSettings,
    list_seq: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl ImportTracker {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(api: Arc<dyn ImportApi>, settings: TrackerSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(256);
        let list_seq = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let worker = Worker::new(
            api.clone(),
            settings.clone(),
            events.clone(),
            list_seq.clone(),
            shutdown.clone(),
        );
        tokio::spawn(worker.run(cmd_rx));
        tracing::info!("import tracker started");

        Self {
            cmd_tx,
            events,
            api,
            settings,
            list_seq,
            shutdown,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Validate and upload `file`, then poll the new job as the active one.
    ///
    /// Nothing in the tracker changes when validation or the upload fails.
    /// Once the upload succeeds the new id is always returned.
    pub async fn submit_import(&self, file: ImportFile) -> Result<JobId, TrackerError> {
        self.ensure_open()?;
        if let Err(e) = validate_import_file(&file, &self.settings.allowed_extensions) {
            tracing::warn!("import rejected before upload: {e}");
            return Err(e);
        }

        let job_id = match self.api.create_import(&file).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("upload of {} failed: {e}", file.file_name);
                return Err(e);
            }
        };
        tracing::info!("import job {job_id} created from {}", file.file_name);

        // The job exists on the server now, so its id is returned even if
        // the tracker shut down in the meantime.
        if let Err(e) = self.poll_job(job_id.clone(), true).await {
            tracing::warn!("job {job_id} created but not polled: {e}");
        }
        Ok(job_id)
    }

    /// Fetch one page, make it the current snapshot, and start polling every
    /// unfinished job on it. Returns the page merged with polled data.
    pub async fn list_jobs(&self, query: ListQuery) -> Result<JobPage, TrackerError> {
        self.ensure_open()?;
        // Taken before dispatch so a slower, older response can be dropped.
        let seq = self.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let page = self.api.list_jobs(&query).await.inspect_err(|e| {
            tracing::error!("list jobs failed: {e}");
        })?;
        self.request(|reply| TrackerCmd::ApplyPage {
            seq,
            query,
            page,
            reply,
        })
        .await
    }

    /// Re-fetch the list with the current query (or the default one).
    pub async fn refresh(&self) -> Result<JobPage, TrackerError> {
        let query = self
            .request(|reply| TrackerCmd::CurrentQuery { reply })
            .await?
            .unwrap_or_else(|| self.settings.default_query.clone());
        self.list_jobs(query).await
    }

    /// Poll `job_id` until it is terminal. If a loop already runs for this id
    /// its handle is returned instead of starting another one.
    pub async fn poll_job(&self, job_id: JobId, primary: bool) -> Result<PollHandle, TrackerError> {
        self.ensure_open()?;
        self.request(|reply| TrackerCmd::StartPoll {
            job_id,
            primary,
            reply,
        })
        .await
    }

    /// Ask the server to cancel a job and refresh the list on success.
    ///
    /// A job the tracker already knows to be terminal is left alone and
    /// `Ok(())` returned without contacting the server.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<(), TrackerError> {
        if let Some(job) = self.job(job_id).await?
            && job.status.is_terminal()
        {
            tracing::info!("cancel skipped: job {job_id} already {}", job.status);
            return Ok(());
        }

        if let Err(e) = self.api.cancel_job(job_id).await {
            tracing::error!("cancel of job {job_id} failed: {e}");
            return Err(e);
        }
        tracing::info!("cancel requested for job {job_id}");

        // The cancel itself succeeded; a failed refresh only delays the view.
        if let Err(e) = self.refresh().await {
            tracing::warn!("refresh after cancel failed: {e}");
        }
        Ok(())
    }

    /// Freshest known state of one job.
    pub async fn job(&self, job_id: &JobId) -> Result<Option<ImportJob>, TrackerError> {
        let job_id = job_id.clone();
        self.request(|reply| TrackerCmd::Lookup { job_id, reply })
            .await
    }

    /// The job shown as live progress, if any.
    pub async fn active_job(&self) -> Result<Option<ImportJob>, TrackerError> {
        Ok(self.snapshot().await?.active_job)
    }

    /// Ids that currently have a polling loop.
    pub async fn polling_ids(&self) -> Result<Vec<JobId>, TrackerError> {
        Ok(self.snapshot().await?.polling)
    }

    pub async fn snapshot(&self) -> Result<ViewSnapshot, TrackerError> {
        self.request(|reply| TrackerCmd::Snapshot { reply }).await
    }

    /// Stop every polling loop and the worker. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        let _ = self.request(|reply| TrackerCmd::Shutdown { reply }).await;
        tracing::info!("import tracker stopped");
    }

    fn ensure_open(&self) -> Result<(), TrackerError> {
        if self.shutdown.is_cancelled() {
            Err(TrackerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Send a command and wait for the worker's reply.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> TrackerCmd,
    ) -> Result<T, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| TrackerError::Closed)?;
        rx.await.map_err(|_| TrackerError::Closed)
    }
}
