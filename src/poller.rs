//! Per-job polling loop and its cancellation handle.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    api::ImportApi,
    error::TrackerError,
    jobs::{ImportJob, JobId},
};

/// Handle to one polling loop. Cloning shares the same loop.
#[derive(Clone, Debug)]
pub struct PollHandle {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
}

impl PollHandle {
    pub(crate) fn new(job_id: JobId, generation: u64, token: CancellationToken) -> Self {
        Self {
            job_id,
            generation,
            token,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the loop. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the loop was cancelled or has finished.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Messages a loop sends back to the tracker worker.
#[derive(Debug)]
pub(crate) enum PollMsg {
    Tick {
        job_id: JobId,
        generation: u64,
        job: ImportJob,
    },
    GaveUp {
        job_id: JobId,
        generation: u64,
        error: TrackerError,
    },
    Cancelled {
        job_id: JobId,
        generation: u64,
    },
}

/// Fetch the job now, then again `interval` after each fetch completes, until
/// the status is terminal, a fetch fails, or the handle is cancelled.
///
/// Only one fetch per loop is ever in flight.
pub(crate) async fn run(
    api: Arc<dyn ImportApi>,
    handle: PollHandle,
    interval: Duration,
    tx: mpsc::Sender<PollMsg>,
) {
    let PollHandle {
        job_id,
        generation,
        token,
    } = handle;
    tracing::debug!("poll loop started: job {job_id} (gen {generation})");

    loop {
        let fetched = tokio::select! {
            _ = token.cancelled() => break,
            r = api.get_job(&job_id) => r,
        };

        match fetched {
            Ok(job) => {
                let terminal = job.status.is_terminal();
                let msg = PollMsg::Tick {
                    job_id: job_id.clone(),
                    generation,
                    job,
                };
                if tx.send(msg).await.is_err() || terminal {
                    return;
                }
            }
            Err(error) => {
                let _ = tx
                    .send(PollMsg::GaveUp {
                        job_id,
                        generation,
                        error,
                    })
                    .await;
                return;
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!("poll loop cancelled: job {job_id} (gen {generation})");
    // The worker must see this to drop the registry entry.
    let _ = tx.send(PollMsg::Cancelled { job_id, generation }).await;
}
