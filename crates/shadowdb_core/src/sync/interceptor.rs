//! Host write events.

use super::Schedule;
use crate::context::ShadowContext;
use crate::entity::EntityId;
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

/// Status of records the host has not really created yet.
const AUTO_DRAFT: &str = "auto-draft";

/// A write the host made to the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// A record was created or updated.
    RecordSaved {
        /// Record id.
        id: EntityId,
        /// Record type.
        entity_type: String,
        /// Publication status.
        status: String,
        /// Whether the record is a revision of another.
        is_revision: bool,
    },
    /// A record was deleted.
    RecordDeleted {
        /// Record id.
        id: EntityId,
        /// Record type.
        entity_type: String,
    },
    /// An attribute of a record was added, changed or removed.
    AttributeChanged {
        /// Record id.
        id: EntityId,
    },
}

/// Turns host events into scheduled shadow writes.
#[derive(Debug, Clone, Copy)]
pub struct WriteInterceptor<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> WriteInterceptor<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Handles one event.
    ///
    /// Events for disabled or unconfigured types, revisions and auto-drafts
    /// are [`Schedule::Skipped`].
    pub fn handle(&self, event: &HostEvent) -> CoreResult<Schedule> {
        match event {
            HostEvent::RecordSaved {
                id,
                entity_type,
                status,
                is_revision,
            } => {
                if !self.intercepts(entity_type) || *is_revision || status == AUTO_DRAFT {
                    return Ok(Schedule::Skipped);
                }
                self.ctx.sync().schedule_sync(*id, entity_type)
            }
            HostEvent::RecordDeleted { id, entity_type } => {
                if !self.intercepts(entity_type) {
                    return Ok(Schedule::Skipped);
                }
                self.ctx.sync().schedule_delete(*id, entity_type)
            }
            HostEvent::AttributeChanged { id } => {
                let Some(record) = self.ctx.source().get_record(*id)? else {
                    return Ok(Schedule::Skipped);
                };
                if !self.intercepts(&record.entity_type) {
                    return Ok(Schedule::Skipped);
                }
                self.ctx.sync().schedule_sync(*id, &record.entity_type)
            }
        }
    }

    fn intercepts(&self, entity_type: &str) -> bool {
        let settings = self.ctx.settings();
        settings.enabled && settings.is_configured(entity_type)
    }
}
