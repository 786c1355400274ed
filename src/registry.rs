//! Active polling set: at most one live loop per job id.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::{jobs::JobId, poller::PollHandle};

#[derive(Debug)]
struct ActivePoll {
    generation: u64,
    primary: bool,
    token: CancellationToken,
}

impl ActivePoll {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// Tracks which job ids have a running polling loop.
///
/// Each registration gets a fresh generation number so messages from a loop
/// that was cancelled and replaced can be told apart from the current one.
/// Entries whose token was cancelled count as absent even before the loop
/// reports back.
#[derive(Debug, Default)]
pub struct PollRegistry {
    polls: HashMap<JobId, ActivePoll>,
    next_generation: u64,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the live loop of `job_id`, if any.
    pub fn handle(&self, job_id: &JobId) -> Option<PollHandle> {
        self.polls
            .get(job_id)
            .filter(|p| p.is_live())
            .map(|p| PollHandle::new(job_id.clone(), p.generation, p.token.clone()))
    }

    /// Handle for the live loop of `job_id`, registering a new loop when
    /// there is none. The flag is true when a loop was registered and still
    /// has to be spawned. A new loop's token is a child of `parent`, so
    /// cancelling the parent stops every loop.
    pub fn ensure(
        &mut self,
        job_id: &JobId,
        primary: bool,
        parent: &CancellationToken,
    ) -> (PollHandle, bool) {
        if let Some(existing) = self.handle(job_id) {
            if primary {
                self.promote(job_id);
            }
            return (existing, false);
        }
        self.next_generation += 1;
        let poll = ActivePoll {
            generation: self.next_generation,
            primary,
            token: parent.child_token(),
        };
        let handle = PollHandle::new(job_id.clone(), poll.generation, poll.token.clone());
        self.polls.insert(job_id.clone(), poll);
        (handle, true)
    }

    /// Mark a live loop as the primary one.
    pub fn promote(&mut self, job_id: &JobId) {
        if let Some(p) = self.polls.get_mut(job_id).filter(|p| p.is_live()) {
            p.primary = true;
        }
    }

    /// True when `generation` is the live loop for `job_id`.
    pub fn is_current(&self, job_id: &JobId, generation: u64) -> bool {
        self.polls
            .get(job_id)
            .is_some_and(|p| p.generation == generation && p.is_live())
    }

    pub fn is_primary(&self, job_id: &JobId) -> bool {
        self.polls.get(job_id).is_some_and(|p| p.primary)
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.polls.get(job_id).is_some_and(ActivePoll::is_live)
    }

    /// Drop the entry for a loop that ended. A newer generation is left alone.
    pub fn finish(&mut self, job_id: &JobId, generation: u64) -> bool {
        if self
            .polls
            .get(job_id)
            .is_some_and(|p| p.generation == generation)
        {
            if let Some(p) = self.polls.remove(job_id) {
                p.token.cancel();
            }
            return true;
        }
        false
    }

    /// Ids with a live loop, sorted for stable output.
    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .polls
            .iter()
            .filter(|(_, p)| p.is_live())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cancel and forget every loop.
    pub fn cancel_all(&mut self) {
        for (_, p) in self.polls.drain() {
            p.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_ensure_reuses_loop() {
        let root = CancellationToken::new();
        let mut reg = PollRegistry::new();
        let id = JobId::from(1);

        let (first, started) = reg.ensure(&id, false, &root);
        assert!(started);
        let (again, started) = reg.ensure(&id, false, &root);
        assert!(!started);
        assert_eq!(again.generation(), first.generation());
        assert!(!reg.is_primary(&id));
        assert_eq!(reg.ids(), vec![id]);
    }

    #[test]
    fn test_cancelled_entry_can_be_replaced() {
        let root = CancellationToken::new();
        let mut reg = PollRegistry::new();
        let id = JobId::from(1);

        let (first, _) = reg.ensure(&id, false, &root);
        first.cancel();
        first.cancel();
        assert!(!reg.is_polling(&id));
        assert!(reg.ids().is_empty());

        let (second, started) = reg.ensure(&id, false, &root);
        assert!(started);
        assert_ne!(first.generation(), second.generation());
        assert!(!reg.is_current(&id, first.generation()));
        assert!(reg.is_current(&id, second.generation()));

        // The old loop reporting back must not evict the new one.
        assert!(!reg.finish(&id, first.generation()));
        assert!(reg.is_polling(&id));
    }

    #[test]
    fn test_finish_cancels_token() {
        let root = CancellationToken::new();
        let mut reg = PollRegistry::new();
        let id = JobId::from(3);

        let (handle, _) = reg.ensure(&id, true, &root);
        assert!(reg.finish(&id, handle.generation()));
        assert!(handle.is_cancelled());
        assert!(!reg.is_polling(&id));
    }

    #[test]
    fn test_parent_cancel_stops_all() {
        let root = CancellationToken::new();
        let mut reg = PollRegistry::new();
        let (a, _) = reg.ensure(&JobId::from(1), false, &root);
        let (b, _) = reg.ensure(&JobId::from(2), false, &root);

        root.cancel();
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(reg.ids().is_empty());
    }

    #[test]
    fn test_primary_request_promotes_existing_loop() {
        let root = CancellationToken::new();
        let mut reg = PollRegistry::new();
        let id = JobId::from(5);
        reg.ensure(&id, false, &root);
        let (_, started) = reg.ensure(&id, true, &root);
        assert!(!started);
        assert!(reg.is_primary(&id));
    }
}
