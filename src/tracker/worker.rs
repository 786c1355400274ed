//! Background worker owning the tracker state.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{TrackerSettings, ViewSnapshot};
use crate::{
    api::ImportApi,
    error::TrackerError,
    events::{StopReason, TrackerEvent},
    jobs::{ImportJob, JobId, JobPage, ListQuery},
    poller::{self, PollHandle, PollMsg},
    registry::PollRegistry,
    view::JobCollectionView,
};

/// Commands sent from tracker handles to the worker.
#[derive(Debug)]
pub(crate) enum TrackerCmd {
    /// Start (or reuse) the polling loop for a job.
    StartPoll {
        job_id: JobId,
        primary: bool,
        reply: oneshot::Sender<PollHandle>,
    },
    /// A page fetched by a handle, to be applied.
    ApplyPage {
        seq: u64,
        query: ListQuery,
        page: JobPage,
        reply: oneshot::Sender<JobPage>,
    },
    /// Query of the applied page.
    CurrentQuery {
        reply: oneshot::Sender<Option<ListQuery>>,
    },
    /// Freshest known state of one job.
    Lookup {
        job_id: JobId,
        reply: oneshot::Sender<Option<ImportJob>>,
    },
    Snapshot {
        reply: oneshot::Sender<ViewSnapshot>,
    },
    /// Cancel every loop and stop.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Result of a refresh the worker started on its own.
struct Refreshed {
    seq: u64,
    query: ListQuery,
    result: Result<JobPage, TrackerError>,
}

pub(crate) struct Worker {
    api: Arc<dyn ImportApi>,
    settings: TrackerSettings,
    view: JobCollectionView,
    registry: PollRegistry,
    events: broadcast::Sender<TrackerEvent>,
    list_seq: Arc<AtomicU64>,
    shutdown: CancellationToken,
    poll_tx: mpsc::Sender<PollMsg>,
    poll_rx: mpsc::Receiver<PollMsg>,
    refresh_tx: mpsc::Sender<Refreshed>,
    refresh_rx: mpsc::Receiver<Refreshed>,
}

impl Worker {
    pub(crate) fn new(
        api: Arc<dyn ImportApi>,
        settings: TrackerSettings,
        events: broadcast::Sender<TrackerEvent>,
        list_seq: Arc<AtomicU64>,
        shutdown: CancellationToken,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(256);
        let (refresh_tx, refresh_rx) = mpsc::channel(16);
        Self {
            api,
            settings,
            view: JobCollectionView::new(),
            registry: PollRegistry::new(),
            events,
            list_seq,
            shutdown,
            poll_tx,
            poll_rx,
            refresh_tx,
            refresh_rx,
        }
    }

    /// Main loop: apply commands and loop results one at a time so state is
    /// only touched from this task.
    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::Receiver<TrackerCmd>) {
        tracing::info!("tracker worker started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(TrackerCmd::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_cmd(cmd),
                    // Every handle is gone.
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(msg) = self.poll_rx.recv() => self.handle_poll(msg),
                Some(done) = self.refresh_rx.recv() => self.handle_refresh(done),
            }
        }
        tracing::info!("tracker worker stopped");
    }

    fn handle_cmd(&mut self, cmd: TrackerCmd) {
        match cmd {
            TrackerCmd::StartPoll {
                job_id,
                primary,
                reply,
            } => {
                let handle = self.start_poll(&job_id, primary);
                let _ = reply.send(handle);
            }
            TrackerCmd::ApplyPage {
                seq,
                query,
                page,
                reply,
            } => {
                let merged = self.apply_page(seq, query, page);
                let _ = reply.send(merged);
            }
            TrackerCmd::CurrentQuery { reply } => {
                let _ = reply.send(self.view.query().cloned());
            }
            TrackerCmd::Lookup { job_id, reply } => {
                let _ = reply.send(self.view.job(&job_id).cloned());
            }
            TrackerCmd::Snapshot { reply } => {
                let _ = reply.send(ViewSnapshot {
                    query: self.view.query().cloned(),
                    page: self.view.effective_page(),
                    active_job: self.view.active_job().cloned(),
                    polling: self.registry.ids(),
                });
            }
            TrackerCmd::Shutdown { reply } => {
                // Handled in `run`; kept exhaustive for the match.
                let _ = reply.send(());
            }
        }
    }

    fn handle_poll(&mut self, msg: PollMsg) {
        match msg {
            PollMsg::Tick {
                job_id,
                generation,
                job,
            } => self.on_tick(job_id, generation, job),
            PollMsg::GaveUp {
                job_id,
                generation,
                error,
            } => {
                // The job itself did not fail; its displayed state just stops
                // updating until the next list refresh.
                if self.registry.finish(&job_id, generation) {
                    tracing::warn!("polling job {job_id} stopped: {error}");
                    self.emit(TrackerEvent::PollStopped {
                        job_id,
                        reason: StopReason::GaveUp(error.to_string()),
                    });
                }
            }
            PollMsg::Cancelled { job_id, generation } => {
                if self.registry.finish(&job_id, generation) {
                    tracing::info!("polling job {job_id} cancelled");
                    self.emit(TrackerEvent::PollStopped {
                        job_id,
                        reason: StopReason::Cancelled,
                    });
                }
            }
        }
    }

    fn on_tick(&mut self, job_id: JobId, generation: u64, job: ImportJob) {
        if !self.registry.is_current(&job_id, generation) {
            tracing::debug!("dropping tick from stale loop: job {job_id} (gen {generation})");
            return;
        }
        let primary = self.registry.is_primary(&job_id);
        let terminal = job.status.is_terminal();

        if !self.view.record_poll(job.clone(), primary) {
            tracing::debug!("job {job_id} reported {} behind known state", job.status);
            return;
        }
        tracing::debug!(
            "job {job_id}: {} ({}/{})",
            job.status,
            job.success_count.unwrap_or(0) + job.error_count.unwrap_or(0),
            job.total_records.unwrap_or(0)
        );
        self.emit(TrackerEvent::JobUpdated(job.clone()));
        if primary {
            self.emit(TrackerEvent::ActiveJobUpdated(job.clone()));
        }

        if terminal {
            self.registry.finish(&job_id, generation);
            tracing::info!("job {job_id} finished: {}", job.status);
            self.emit(TrackerEvent::JobTerminal(job));
            self.spawn_refresh();
        }
    }

    fn handle_refresh(&mut self, done: Refreshed) {
        match done.result {
            Ok(page) => {
                self.apply_page(done.seq, done.query, page);
            }
            Err(e) => tracing::warn!("list refresh failed: {e}"),
        }
    }

    /// Start a loop for `job_id` unless one is live, in which case its
    /// handle is returned.
    fn start_poll(&mut self, job_id: &JobId, primary: bool) -> PollHandle {
        let (handle, started) = self.registry.ensure(job_id, primary, &self.shutdown);
        if started {
            tracing::info!("polling job {job_id} (primary: {primary})");
            tokio::spawn(poller::run(
                self.api.clone(),
                handle.clone(),
                self.settings.poll_interval,
                self.poll_tx.clone(),
            ));
        }
        handle
    }

    /// Apply a page and return it merged with polled data.
    fn apply_page(&mut self, seq: u64, query: ListQuery, page: JobPage) -> JobPage {
        if let Some(issue) = page.consistency_issue(&query) {
            tracing::warn!("inconsistent job page: {issue}");
        }
        let fetched = page.clone();
        let registry = &self.registry;
        if !self
            .view
            .apply_page(seq, query, page, |id| registry.is_polling(id))
        {
            tracing::debug!("dropping list response #{seq}: a newer page is applied");
            return self.view.effective_page().unwrap_or(fetched);
        }

        // Loops for jobs the page shows as already finished are not needed.
        for id in self.registry.ids() {
            if let Some(job) = self.view.job(&id).filter(|j| j.status.is_terminal()).cloned()
                && let Some(handle) = self.registry.handle(&id)
            {
                self.registry.finish(&id, handle.generation());
                tracing::info!("job {id} finished: {} (seen in list)", job.status);
                self.emit(TrackerEvent::JobTerminal(job));
            }
        }
        for id in self.view.unfinished_ids() {
            self.start_poll(&id, false);
        }

        let merged = self.view.effective_page().unwrap_or(fetched);
        self.emit(TrackerEvent::ListRefreshed(merged.clone()));
        merged
    }

    /// List again with the current query without blocking the worker.
    fn spawn_refresh(&self) {
        let query = self
            .view
            .query()
            .cloned()
            .unwrap_or_else(|| self.settings.default_query.clone());
        let seq = self.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let api = self.api.clone();
        let tx = self.refresh_tx.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                r = api.list_jobs(&query) => r,
            };
            let _ = tx.send(Refreshed { seq, query, result }).await;
        });
    }

    fn teardown(&mut self) {
        self.shutdown.cancel();
        self.registry.cancel_all();
    }

    fn emit(&self, ev: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }
}
