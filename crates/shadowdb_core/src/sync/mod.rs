//! Keeping shadow rows in step with the source of truth.
//!
//! Every write the host makes to a shadowed record reaches the
//! [`SyncOrchestrator`] either directly ([`SyncOrchestrator::sync_entity`])
//! or through a schedule call. Scheduling picks one of three paths from the
//! settings and the context:
//!
//! | `async_write` | queue attached | path                                   |
//! |---------------|----------------|----------------------------------------|
//! | yes           | yes            | [`Schedule::Queued`]                   |
//! | yes           | no             | [`Schedule::Deferred`] until `finish`  |
//! | no            | any            | [`Schedule::Inline`]                   |

mod interceptor;
mod job;

pub use interceptor::{HostEvent, WriteInterceptor};
pub use job::{JobQueue, MemoryJobQueue, SyncJob};

use crate::context::ShadowContext;
use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::source::canonical_attributes;
use serde::{Deserialize, Serialize};

/// What a schedule call did with a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Handed to the job queue.
    Queued,
    /// Held until the end of the unit of work.
    Deferred,
    /// Performed before returning.
    Inline,
    /// Already scheduled in this unit of work.
    Debounced,
    /// Nothing to do: the type is not shadowed or has no table.
    Skipped,
}

/// Write synchronization between the source of truth and shadow tables.
#[derive(Debug, Clone, Copy)]
pub struct SyncOrchestrator<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> SyncOrchestrator<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Copies one record from the source of truth into its shadow table
    /// and caches the result.
    ///
    /// Returns `None` when the record is gone or its type has no shadow
    /// table.
    pub fn sync_entity(&self, id: EntityId) -> CoreResult<Option<Entity>> {
        let source = self.ctx.source();
        let Some(record) = source.get_record(id)? else {
            tracing::debug!(%id, "record missing from source, nothing to sync");
            return Ok(None);
        };
        if !self.ctx.table_exists(&record.entity_type)? {
            return Ok(None);
        }

        let raw = source.get_attributes(id)?;
        let attributes = canonical_attributes(source.as_ref(), raw, &self.ctx.config().internal_keys);
        let entity = Entity::new(id, record.entity_type, record.content, attributes);

        self.ctx.repository(entity.entity_type())?.save(&entity)?;
        self.ctx.cache().set(entity.clone());
        tracing::debug!(%id, entity_type = entity.entity_type(), "synced entity");
        Ok(Some(entity))
    }

    /// Removes an entity's shadow row and its cache entry.
    ///
    /// Returns `true` if a row was removed.
    pub fn delete_entity(&self, id: EntityId, entity_type: &str) -> CoreResult<bool> {
        let removed = if self.ctx.table_exists(entity_type)? {
            self.ctx.repository(entity_type)?.remove(id)?
        } else {
            false
        };
        self.ctx.cache().delete(id);
        tracing::debug!(%id, entity_type, removed, "deleted entity");
        Ok(removed)
    }

    /// Creates the shadow table of a type if needed and syncs every record
    /// of the type, `batch` ids at a time.
    ///
    /// `progress` is called after each page with the number synced so far
    /// and the source total. Returns the number of records processed.
    pub fn migrate_all(
        &self,
        entity_type: &str,
        batch: usize,
        mut progress: impl FnMut(u64, u64),
    ) -> CoreResult<u64> {
        let batch = batch.max(1);
        self.ctx.tables().create(&self.ctx.schema(entity_type))?;

        let source = self.ctx.source();
        let total = source.count(entity_type)?;
        let mut migrated = 0u64;
        let mut offset = 0;
        loop {
            let ids = source.list_ids(entity_type, batch, offset)?;
            if ids.is_empty() {
                break;
            }
            for id in &ids {
                self.sync_entity(*id)?;
            }
            migrated += ids.len() as u64;
            progress(migrated, total);
            if ids.len() < batch {
                break;
            }
            offset += batch;
        }

        self.ctx.notify_complete(entity_type, migrated);
        Ok(migrated)
    }

    /// Drops the shadow storage of a type and flushes the cache.
    pub fn rollback(&self, entity_type: &str) -> CoreResult<()> {
        self.ctx.tables().drop(entity_type)?;
        self.ctx.cache().flush();
        tracing::info!(entity_type, "rolled back shadow storage");
        Ok(())
    }

    /// Schedules a sync of one record.
    ///
    /// Only the first call per id in a unit of work schedules anything.
    pub fn schedule_sync(&self, id: EntityId, entity_type: &str) -> CoreResult<Schedule> {
        if !self.ctx.claim_sync(id) {
            return Ok(Schedule::Debounced);
        }
        self.schedule(SyncJob::Sync {
            entity_id: id,
            entity_type: entity_type.to_string(),
        })
    }

    /// Schedules removal of one record.
    pub fn schedule_delete(&self, id: EntityId, entity_type: &str) -> CoreResult<Schedule> {
        self.schedule(SyncJob::Delete {
            entity_id: id,
            entity_type: entity_type.to_string(),
        })
    }

    /// Runs a job taken from a queue or the deferred list.
    pub fn process_job(&self, job: &SyncJob) -> CoreResult<()> {
        match job {
            SyncJob::Sync { entity_id, .. } => {
                self.sync_entity(*entity_id)?;
            }
            SyncJob::Delete {
                entity_id,
                entity_type,
            } => {
                self.delete_entity(*entity_id, entity_type)?;
            }
        }
        Ok(())
    }

    fn schedule(&self, job: SyncJob) -> CoreResult<Schedule> {
        if !self.ctx.table_exists(job.entity_type())? {
            return Ok(Schedule::Skipped);
        }
        let id = job.entity_id();

        let outcome = if self.ctx.settings().async_write {
            match self.ctx.job_queue() {
                Some(queue) => {
                    queue.enqueue(job)?;
                    Schedule::Queued
                }
                None => {
                    self.ctx.defer(job);
                    Schedule::Deferred
                }
            }
        } else {
            self.process_job(&job)?;
            Schedule::Inline
        };

        if outcome != Schedule::Inline {
            self.ctx.cache().delete(id);
        }
        Ok(outcome)
    }
}
