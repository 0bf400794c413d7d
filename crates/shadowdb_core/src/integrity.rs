//! Drift detection between shadow rows and the source of truth.

use crate::context::ShadowContext;
use crate::entity::{Attributes, EntityId};
use crate::error::CoreResult;
use crate::migration::unix_now;
use crate::options::{issues_key, last_check_key};
use crate::source::canonical_attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shadowdb_storage::SqlValue;
use std::collections::BTreeMap;

/// Outcome class of an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// The type has no shadow table.
    NoTable,
    /// The shadow table has no rows.
    Empty,
    /// Every sampled row matched.
    Ok,
    /// At least one sampled row differed.
    IssuesFound,
}

/// One attribute whose shadow and source values differ. A side that lacks
/// the key holds `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMismatch {
    /// Value in the shadow row.
    pub shadow: Value,
    /// Value recomputed from the source.
    pub source: Value,
}

/// Mismatches of one entity, by attribute key.
pub type EntityIssues = BTreeMap<String, AttributeMismatch>;

/// Result of [`IntegrityChecker::check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Outcome class.
    pub status: IntegrityStatus,
    /// Number of rows compared.
    pub checked: usize,
    /// Number of rows with at least one mismatch.
    pub issues_count: usize,
    /// The first offending rows, up to the configured limit.
    pub issues: BTreeMap<EntityId, EntityIssues>,
    /// Check time, seconds since the Unix epoch.
    pub timestamp: u64,
}

impl IntegrityReport {
    fn bare(status: IntegrityStatus) -> Self {
        Self {
            status,
            checked: 0,
            issues_count: 0,
            issues: BTreeMap::new(),
            timestamp: unix_now(),
        }
    }
}

/// Samples shadow rows and compares them against freshly canonicalized
/// source attributes.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityChecker<'a> {
    ctx: &'a ShadowContext,
}

impl<'a> IntegrityChecker<'a> {
    pub(crate) const fn new(ctx: &'a ShadowContext) -> Self {
        Self { ctx }
    }

    /// Compares up to `sample` random shadow rows of a type with the source.
    ///
    /// `Ok` and `IssuesFound` reports are persisted, together with the full
    /// issue map (or its removal when nothing differs).
    pub fn check(&self, entity_type: &str, sample: usize) -> CoreResult<IntegrityReport> {
        if !self.ctx.tables().exists(entity_type)? {
            return Ok(IntegrityReport::bare(IntegrityStatus::NoTable));
        }

        let repository = self.ctx.repository(entity_type)?;
        let backend = self.ctx.backend();
        let sql = format!(
            "SELECT entity_id FROM {} ORDER BY {} LIMIT ?",
            repository.table(),
            backend.dialect().random_function()
        );
        let limit = i64::try_from(sample).unwrap_or(i64::MAX);
        let ids: Vec<EntityId> = backend
            .query(&sql, &[SqlValue::Integer(limit)])?
            .iter()
            .filter_map(|row| row.get_i64("entity_id").ok())
            .filter_map(EntityId::from_i64)
            .collect();
        if ids.is_empty() {
            return Ok(IntegrityReport::bare(IntegrityStatus::Empty));
        }

        let source = self.ctx.source();
        let internal_keys = &self.ctx.config().internal_keys;
        let mut issues = BTreeMap::new();
        let mut checked = 0;
        for id in ids {
            let Some(shadow) = repository.find(id)? else {
                continue;
            };
            let expected = canonical_attributes(source.as_ref(), source.get_attributes(id)?, internal_keys);
            let mismatches = compare(shadow.attributes(), &expected);
            if !mismatches.is_empty() {
                issues.insert(id, mismatches);
            }
            checked += 1;
        }

        let status = if issues.is_empty() {
            IntegrityStatus::Ok
        } else {
            IntegrityStatus::IssuesFound
        };
        let report = IntegrityReport {
            status,
            checked,
            issues_count: issues.len(),
            issues: issues
                .iter()
                .take(self.ctx.config().issue_sample_limit)
                .map(|(id, found)| (*id, found.clone()))
                .collect(),
            timestamp: unix_now(),
        };

        let options = self.ctx.options();
        options.save(&last_check_key(entity_type), &report)?;
        if issues.is_empty() {
            options.delete(&issues_key(entity_type))?;
        } else {
            options.save(&issues_key(entity_type), &issues)?;
        }

        match status {
            IntegrityStatus::IssuesFound => {
                tracing::warn!(entity_type, checked, issues = report.issues_count, "integrity drift found");
            }
            _ => tracing::info!(entity_type, checked, "integrity check passed"),
        }
        Ok(report)
    }

    /// Checks every configured entity type with the configured sample size.
    pub fn check_all(&self) -> CoreResult<BTreeMap<String, IntegrityReport>> {
        let sample = self.ctx.config().integrity_sample_size;
        self.ctx
            .settings()
            .entity_types
            .into_iter()
            .map(|t| {
                let report = self.check(&t, sample)?;
                Ok((t, report))
            })
            .collect()
    }

    /// Re-syncs one entity from the source. Returns `false` when the type
    /// has no shadow table.
    pub fn repair_entity(&self, id: EntityId, entity_type: &str) -> CoreResult<bool> {
        if !self.ctx.tables().exists(entity_type)? {
            return Ok(false);
        }
        self.ctx.sync().sync_entity(id)?;
        tracing::info!(%id, entity_type, "repaired entity");
        Ok(true)
    }

    /// Returns the last persisted report of a type.
    pub fn last_check(&self, entity_type: &str) -> CoreResult<Option<IntegrityReport>> {
        self.ctx.options().load(&last_check_key(entity_type))
    }

    /// Returns true if the last check of a type found drift.
    pub fn has_issues(&self, entity_type: &str) -> CoreResult<bool> {
        Ok(self.issues_count(entity_type)? > 0)
    }

    /// Returns the number of drifted entities found by the last check.
    pub fn issues_count(&self, entity_type: &str) -> CoreResult<usize> {
        Ok(self
            .ctx
            .options()
            .load::<BTreeMap<EntityId, EntityIssues>>(&issues_key(entity_type))?
            .map_or(0, |issues| issues.len()))
    }
}

/// Compares two attribute maps over the union of their keys.
fn compare(shadow: &Attributes, source: &Attributes) -> EntityIssues {
    let mut mismatches = EntityIssues::new();
    for key in shadow.keys().chain(source.keys()) {
        if mismatches.contains_key(key) {
            continue;
        }
        let left = shadow.get(key).unwrap_or(&Value::Null);
        let right = source.get(key).unwrap_or(&Value::Null);
        if !same_value(left, right) {
            mismatches.insert(
                key.clone(),
                AttributeMismatch {
                    shadow: left.clone(),
                    source: right.clone(),
                },
            );
        }
    }
    mismatches
}

/// JSON equality that ignores integer/float representation.
fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| same_value(x, y)))
        }
        _ => left == right,
    }
}
