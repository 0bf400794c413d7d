//! Deferred write jobs.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// One shadow write pushed off the request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum SyncJob {
    /// Re-read an entity from the source and save it.
    Sync {
        /// Entity id.
        entity_id: EntityId,
        /// Entity type.
        entity_type: String,
    },
    /// Remove an entity from its shadow table.
    Delete {
        /// Entity id.
        entity_id: EntityId,
        /// Entity type.
        entity_type: String,
    },
}

impl SyncJob {
    /// Returns the job name used when enqueueing.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "shadowdb_async_sync",
            Self::Delete { .. } => "shadowdb_async_delete",
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        match self {
            Self::Sync { entity_id, .. } | Self::Delete { entity_id, .. } => *entity_id,
        }
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Sync { entity_type, .. } | Self::Delete { entity_type, .. } => entity_type,
        }
    }
}

/// An asynchronous job runner owned by the host.
///
/// Jobs enqueued here come back through
/// [`SyncOrchestrator::process_job`](crate::SyncOrchestrator::process_job).
pub trait JobQueue: Send + Sync + fmt::Debug {
    /// Queues a job.
    fn enqueue(&self, job: SyncJob) -> CoreResult<()>;
}

/// FIFO [`JobQueue`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<SyncJob>>,
    closed: bool,
}

impl MemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that rejects every job.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            jobs: Mutex::default(),
            closed: true,
        }
    }

    /// Takes the oldest job.
    pub fn pop(&self) -> Option<SyncJob> {
        self.jobs.lock().pop_front()
    }

    /// Takes every queued job.
    pub fn drain(&self) -> Vec<SyncJob> {
        self.jobs.lock().drain(..).collect()
    }

    /// Returns the number of queued jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: SyncJob) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::queue(format!("queue closed, dropped {}", job.name())));
        }
        self.jobs.lock().push_back(job);
        Ok(())
    }
}
