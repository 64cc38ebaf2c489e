use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::retry::{PollPolicy, RetryPolicy};
use super::submission::{Submission, SubmissionSnapshot};
use crate::core::{AccessKey, Document};

/// Shared handle to one submission.
pub type SharedSubmission = Arc<Mutex<Submission>>;

/// Concurrent registry of submissions keyed by access key.
///
/// Operations on one document are serialized by its mutex; different
/// documents proceed in parallel. Cloning the desk shares the registry.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDesk {
    entries: Arc<DashMap<AccessKey, SharedSubmission>>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl SubmissionDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(retry: RetryPolicy, poll: PollPolicy) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            retry,
            poll,
        }
    }

    /// Register a document, or return the submission already registered
    /// under its access key.
    pub fn open(&self, document: Document) -> SharedSubmission {
        let key = document.access_key();
        self.entries
            .entry(key)
            .or_insert_with(|| {
                debug!(access_key = %document.access_key(), "opening submission");
                Arc::new(Mutex::new(Submission::with_policies(
                    document,
                    self.retry.clone(),
                    self.poll.clone(),
                )))
            })
            .clone()
    }

    pub fn get(&self, key: &AccessKey) -> Option<SharedSubmission> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &AccessKey) -> Option<SharedSubmission> {
        self.entries.remove(key).map(|(_, submission)| submission)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots of every registered submission, ordered by access key.
    pub async fn snapshots(&self) -> Vec<SubmissionSnapshot> {
        let handles: Vec<SharedSubmission> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.access_key.cmp(&b.access_key));
        snapshots
    }
}
