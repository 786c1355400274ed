//! Client-held job list: the last page snapshot plus fresher polled data.

use std::collections::HashMap;

use crate::jobs::{ImportJob, JobId, JobPage, ListQuery};

/// Paginated snapshot reconciled with a side-table of polled jobs.
///
/// The side-table entry for a job always wins for display; it is written on
/// every poll tick while the snapshot only changes when a page is applied.
#[derive(Debug, Default)]
pub struct JobCollectionView {
    /// Parameters of the last applied page.
    query: Option<ListQuery>,
    /// Last applied page as the server returned it.
    page: Option<JobPage>,
    /// Latest polled state per job id.
    latest: HashMap<JobId, ImportJob>,
    /// Job shown as live progress (the most recent primary poll).
    active: Option<JobId>,
    /// Sequence number of the applied page; older responses are dropped.
    applied_seq: u64,
}

impl JobCollectionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query to reuse when a refresh is triggered internally.
    pub fn query(&self) -> Option<&ListQuery> {
        self.query.as_ref()
    }

    /// Apply a fetched page. `seq` is taken when the request was dispatched;
    /// a page older than the applied one is ignored and `false` returned.
    ///
    /// Side-table entries for jobs on the page are reconciled without ever
    /// moving a status backwards: an entry for a job that is no longer polled
    /// takes the page's copy unless the entry is further along, and an entry
    /// still being polled only does so when the page is strictly ahead.
    ///
    /// Entries for jobs that are off the page, not polled and not active are
    /// dropped.
    pub fn apply_page(
        &mut self,
        seq: u64,
        query: ListQuery,
        page: JobPage,
        is_polling: impl Fn(&JobId) -> bool,
    ) -> bool {
        if seq < self.applied_seq {
            return false;
        }
        for job in &page.content {
            if let Some(known) = self.latest.get(&job.id) {
                let (stage, known_stage) = (job.status.stage(), known.status.stage());
                let replace = if is_polling(&job.id) {
                    stage > known_stage
                } else {
                    stage >= known_stage
                };
                if replace {
                    self.latest.insert(job.id.clone(), job.clone());
                }
            }
        }
        let active = self.active.clone();
        self.latest.retain(|id, _| {
            page.content.iter().any(|j| &j.id == id)
                || is_polling(id)
                || active.as_ref() == Some(id)
        });
        self.applied_seq = seq;
        self.query = Some(query);
        self.page = Some(page);
        true
    }

    /// Record a polled job; `primary` also makes it the active job.
    ///
    /// Status only moves forward: a report behind the known stage is dropped
    /// and `false` returned.
    pub fn record_poll(&mut self, job: ImportJob, primary: bool) -> bool {
        if self
            .job(&job.id)
            .is_some_and(|known| known.status.stage() > job.status.stage())
        {
            return false;
        }
        if primary {
            self.active = Some(job.id.clone());
        }
        self.latest.insert(job.id.clone(), job);
        true
    }

    /// Freshest known state of a job.
    pub fn job(&self, id: &JobId) -> Option<&ImportJob> {
        self.latest.get(id).or_else(|| {
            self.page
                .as_ref()
                .and_then(|p| p.content.iter().find(|j| &j.id == id))
        })
    }

    /// The job currently shown as live progress.
    pub fn active_job(&self) -> Option<&ImportJob> {
        self.active.as_ref().and_then(|id| self.latest.get(id))
    }

    /// The applied page with side-table entries substituted in.
    pub fn effective_page(&self) -> Option<JobPage> {
        let mut page = self.page.clone()?;
        for job in &mut page.content {
            if let Some(fresh) = self.latest.get(&job.id) {
                *job = fresh.clone();
            }
        }
        Some(page)
    }

    /// Ids on the current page whose effective status is not terminal.
    pub fn unfinished_ids(&self) -> Vec<JobId> {
        self.page
            .iter()
            .flat_map(|p| p.content.iter())
            .filter_map(|j| self.job(&j.id))
            .filter(|j| !j.status.is_terminal())
            .map(|j| j.id.clone())
            .collect()
    }
}
