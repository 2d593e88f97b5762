use std::collections::HashMap;
use std::time::Instant;

use crate::backend::JobId;
use crate::types::CompilationJob;

/// A job posted to the worker and still waiting for its reply.
#[derive(Debug)]
pub(crate) struct PendingJob {
  pub job: CompilationJob,
  pub started_at: Option<Instant>,
}

/// Correlates worker replies with the request that produced them. Ids increase monotonically
/// for the life of the registry, including across [`JobRegistry::clear`].
#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
  next_id: JobId,
  pending: HashMap<JobId, PendingJob>,
}

impl JobRegistry {
  pub(crate) fn register(&mut self, job: PendingJob) -> JobId {
    let id = self.next_id;
    self.next_id += 1;
    self.pending.insert(id, job);
    id
  }

  pub(crate) fn take(&mut self, id: JobId) -> Option<PendingJob> {
    self.pending.remove(&id)
  }

  /// Forget every pending job, returning how many were dropped.
  pub(crate) fn clear(&mut self) -> usize {
    let dropped = self.pending.len();
    self.pending.clear();
    dropped
  }

  /// Remove every pending job, oldest first.
  pub(crate) fn drain(&mut self) -> Vec<PendingJob> {
    let mut pending: Vec<_> = self.pending.drain().collect();
    pending.sort_unstable_by_key(|(id, _)| *id);
    pending.into_iter().map(|(_, job)| job).collect()
  }

  pub(crate) fn len(&self) -> usize {
    self.pending.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}
