//! Cooperative cancellation for scheduled jobs
//!
//! A cancelled token is advisory: the job pump checks it before running a
//! job and long-running work may poll it mid-flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::JobId;

/// Shared cancellation flag.
///
/// Clones observe each other's state.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; all clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Maps job IDs to their cancellation tokens.
///
/// Tokens stay registered until the job completes or is cancelled out of
/// the queue, so running jobs can still be cancelled by ID.
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()) }
    }

    /// Create and store a token for a job, returning a clone for the
    /// eventual runner.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().unwrap().insert(job_id, token.clone());
        token
    }

    /// Cancel a job's token. Returns `false` when the job is unknown.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens.lock().unwrap().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel several jobs; returns how many were found.
    pub fn cancel_many(&self, job_ids: &[JobId]) -> usize {
        let tokens = self.tokens.lock().unwrap();
        job_ids
            .iter()
            .filter(|id| {
                if let Some(token) = tokens.get(id) {
                    token.cancel();
                    true
                } else {
                    false
                }
            })
            .count()
    }

    /// Cancel every registered token; returns the count.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock().unwrap();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Remove a job from the registry. Returns `true` if it was present.
    pub fn unregister(&self, job_id: JobId) -> bool {
        self.tokens.lock().unwrap().remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        self.tokens.lock().unwrap().get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().unwrap().is_empty()
    }

    /// Drop all tokens without cancelling them.
    pub fn clear(&self) {
        self.tokens.lock().unwrap().clear();
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
