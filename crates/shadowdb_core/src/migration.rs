//! Resumable batch migration.
//!
//! A migration is a [`MigrationState`] persisted in the option store under
//! [`migration_key`]. Each [`BatchMigration::step`] syncs one page of ids
//! and writes the state back, so a migration survives process restarts and
//! can be driven one request at a time.

use crate::context::ShadowContext;
use crate::error::CoreResult;
use crate::options::migration_key;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Phase of a persisted migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Steps remain.
    Running,
    /// Every page was processed.
    Completed,
}

/// Persisted progress of one type's migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Entity type being migrated.
    pub entity_type: String,
    /// Source record count when the migration started.
    pub total: u64,
    /// Records processed so far.
    pub migrated: u64,
    /// Offset of the next page.
    pub offset: usize,
    /// Current phase.
    pub status: MigrationStatus,
    /// Start time, seconds since the Unix epoch.
    pub started_at: u64,
}

impl MigrationState {
    /// Returns progress in percent, 100 for an empty source.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.migrated as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

/// Result of one [`BatchMigration::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A page was processed and more may remain.
    Advanced(MigrationState),
    /// The source is exhausted.
    Completed(MigrationState),
    /// No migration is running for the type.
    NoMigration,
}

impl StepOutcome {
    /// Returns the state after the step, if any.
    #[must_use]
    pub fn state(&self) -> Option<&MigrationState> {
        match self {
            Self::Advanced(state) | Self::Completed(state) => Some(state),
            Self::NoMigration => None,
        }
    }

    /// Returns an operator-facing message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Advanced(state) => format!(
                "Migrated {} of {} {} records",
                state.migrated, state.total, state.entity_type
            ),
            Self::Completed(state) => format!(
                "Migration of {} completed: {} records",
                state.entity_type, state.migrated
            ),
            Self::NoMigration => "No migration in progress".to_string(),
        }
    }
}

/// Drives migrations one page at a time.
#[derive(Debug, Clone, Copy)]
pub struct BatchMigration<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> BatchMigration<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Creates the shadow table and starts a migration of a type,
    /// replacing any persisted state.
    pub fn start(&self, entity_type: &str) -> CoreResult<MigrationState> {
        self.ctx.tables().create(&self.ctx.schema(entity_type))?;
        let state = MigrationState {
            entity_type: entity_type.to_string(),
            total: self.ctx.source().count(entity_type)?,
            migrated: 0,
            offset: 0,
            status: MigrationStatus::Running,
            started_at: unix_now(),
        };
        self.ctx.options().save(&migration_key(entity_type), &state)?;
        tracing::info!(entity_type, total = state.total, "started batch migration");
        Ok(state)
    }

    /// Syncs the next page of a running migration.
    pub fn step(&self, entity_type: &str) -> CoreResult<StepOutcome> {
        let key = migration_key(entity_type);
        let Some(mut state) = self.progress(entity_type)? else {
            return Ok(StepOutcome::NoMigration);
        };
        if state.status != MigrationStatus::Running {
            return Ok(StepOutcome::NoMigration);
        }

        let batch = self.ctx.config().migration_batch_size.max(1);
        let ids = self.ctx.source().list_ids(entity_type, batch, state.offset)?;
        if ids.is_empty() {
            return self.complete(&key, state);
        }

        let sync = self.ctx.sync();
        for id in &ids {
            sync.sync_entity(*id)?;
        }
        state.migrated += ids.len() as u64;
        state.offset += batch;

        // a short page, or reaching the count taken at start, ends the source
        if ids.len() < batch || state.offset as u64 >= state.total {
            return self.complete(&key, state);
        }
        self.ctx.options().save(&key, &state)?;
        tracing::debug!(entity_type, migrated = state.migrated, total = state.total, "migration step");
        Ok(StepOutcome::Advanced(state))
    }

    fn complete(&self, key: &str, mut state: MigrationState) -> CoreResult<StepOutcome> {
        state.status = MigrationStatus::Completed;
        self.ctx.options().save(key, &state)?;
        self.ctx.notify_complete(&state.entity_type, state.migrated);
        Ok(StepOutcome::Completed(state))
    }

    /// Returns the persisted state of a type's migration.
    pub fn progress(&self, entity_type: &str) -> CoreResult<Option<MigrationState>> {
        self.ctx.options().load(&migration_key(entity_type))
    }

    /// Forgets a type's migration. Rows already synced stay.
    pub fn cancel(&self, entity_type: &str) -> CoreResult<()> {
        self.ctx.options().delete(&migration_key(entity_type))?;
        tracing::info!(entity_type, "cancelled batch migration");
        Ok(())
    }

    /// Returns true if a migration of the type is running.
    pub fn is_migrating(&self, entity_type: &str) -> CoreResult<bool> {
        Ok(self
            .progress(entity_type)?
            .is_some_and(|s| s.status == MigrationStatus::Running))
    }
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShadowConfig;
    use crate::context::test_support::{harness_with, inline_settings, seed};

    fn small_batches() -> crate::context::test_support::Harness {
        harness_with(inline_settings(), |b| {
            b.config(ShadowConfig::new().migration_batch_size(2))
        })
    }

    #[test]
    fn steps_until_completed() {
        let h = small_batches();
        for n in 1..=3 {
            seed(&h.source, n, "post", &[]);
        }
        let migration = h.ctx.migration();

        let state = migration.start("post").unwrap();
        assert_eq!(state.total, 3);
        assert!(migration.is_migrating("post").unwrap());

        let first = migration.step("post").unwrap();
        assert_eq!(first.state().map(|s| s.migrated), Some(2));
        assert!(matches!(first, StepOutcome::Advanced(_)));

        let done = migration.step("post").unwrap();
        assert!(matches!(done, StepOutcome::Completed(_)));
        assert_eq!(done.state().map(|s| s.offset), Some(4));
        assert_eq!(done.state().map(MigrationState::percent), Some(100.0));
        assert!(!migration.is_migrating("post").unwrap());
        assert_eq!(migration.step("post").unwrap(), StepOutcome::NoMigration);
        assert_eq!(h.ctx.tables().stats("post").unwrap().count, 3);
    }

    #[test]
    fn full_last_page_completes_in_the_same_step() {
        let h = small_batches();
        for n in 1..=4 {
            seed(&h.source, n, "post", &[]);
        }
        let migration = h.ctx.migration();
        migration.start("post").unwrap();

        assert!(matches!(migration.step("post").unwrap(), StepOutcome::Advanced(_)));
        let done = migration.step("post").unwrap();
        assert!(matches!(done, StepOutcome::Completed(_)), "{done:?}");
        assert_eq!(done.state().map(|s| s.migrated), Some(4));
        assert_eq!(
            migration.progress("post").unwrap().map(|s| s.status),
            Some(MigrationStatus::Completed)
        );
    }

    #[test]
    fn empty_source_completes_on_first_step() {
        let h = small_batches();
        let migration = h.ctx.migration();
        migration.start("post").unwrap();
        let done = migration.step("post").unwrap();
        assert_eq!(done.state().map(|s| s.migrated), Some(0));
        assert!(matches!(done, StepOutcome::Completed(_)));
    }

    #[test]
    fn step_without_start() {
        let h = small_batches();
        let outcome = h.ctx.migration().step("post").unwrap();
        assert_eq!(outcome.message(), "No migration in progress");
    }

    #[test]
    fn cancel_keeps_synced_rows() {
        let h = small_batches();
        for n in 1..=5 {
            seed(&h.source, n, "post", &[]);
        }
        let migration = h.ctx.migration();
        migration.start("post").unwrap();
        migration.step("post").unwrap();
        migration.cancel("post").unwrap();

        assert_eq!(migration.progress("post").unwrap(), None);
        assert_eq!(h.ctx.tables().stats("post").unwrap().count, 2);
    }

    #[test]
    fn state_serializes_lowercase_status() {
        let state = MigrationState {
            entity_type: "post".into(),
            total: 0,
            migrated: 0,
            offset: 0,
            status: MigrationStatus::Running,
            started_at: 1,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(state.percent(), 100.0);
    }
}
