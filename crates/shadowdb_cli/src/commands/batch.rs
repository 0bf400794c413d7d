//! Batch migration commands.

use super::CliResult;
use shadowdb_core::{MigrationState, ShadowContext, StepOutcome};

/// Batch migration commands for one entity type.
pub struct Batch<'a> {
    ctx: &'a ShadowContext,
    entity_type: &'a str,
}

impl<'a> Batch<'a> {
    /// Binds the commands to a type.
    pub fn new(ctx: &'a ShadowContext, entity_type: &'a str) -> Self {
        Self { ctx, entity_type }
    }

    /// Starts a migration.
    pub fn start(&self) -> CliResult<()> {
        let state = self.ctx.migration().start(self.entity_type)?;
        println!(
            "✓ Started migration of '{}' ({} records)",
            self.entity_type, state.total
        );
        Ok(())
    }

    /// Runs one step.
    pub fn step(&self) -> CliResult<()> {
        let outcome = self.ctx.migration().step(self.entity_type)?;
        println!("{}", outcome.message());
        if outcome == StepOutcome::NoMigration {
            return Err(format!("No migration running for '{}'", self.entity_type).into());
        }
        Ok(())
    }

    /// Prints the persisted progress.
    pub fn progress(&self) -> CliResult<()> {
        match self.ctx.migration().progress(self.entity_type)? {
            Some(state) => print_state(&state),
            None => println!("No migration in progress"),
        }
        Ok(())
    }

    /// Cancels the migration.
    pub fn cancel(&self) -> CliResult<()> {
        self.ctx.migration().cancel(self.entity_type)?;
        println!("✓ Migration of '{}' cancelled", self.entity_type);
        Ok(())
    }
}

fn print_state(state: &MigrationState) {
    println!("Migration of '{}'", state.entity_type);
    println!("  Status:   {:?}", state.status);
    println!(
        "  Progress: {}/{} ({:.1}%)",
        state.migrated,
        state.total,
        state.percent()
    );
    println!("  Offset:   {}", state.offset);
    println!("  Started:  {}", state.started_at);
}
