//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] drives writes through host events, the way a host
//! would, and keeps its own model of what every shadow row should hold.

use crate::fixtures::TestEnv;
use shadowdb_core::{canonical_attributes, Attributes, EntityId, HostEvent, Schedule, SourceOfTruth};
use std::collections::BTreeMap;

/// Differences found by [`IntegrationHarness::verify_all`].
#[derive(Debug, Default, PartialEq)]
pub struct ConsistencyReport {
    /// Number of ids checked.
    pub checked: usize,
    /// Ids whose shadow row is missing.
    pub missing: Vec<EntityId>,
    /// Ids that have a shadow row but should not.
    pub unexpected: Vec<EntityId>,
    /// Ids whose shadow attributes differ from the model.
    pub mismatched: Vec<EntityId>,
}

impl ConsistencyReport {
    /// Returns true if the shadow matches the model.
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }
}

/// Host-event driven writes with a model of the expected shadow.
pub struct IntegrationHarness {
    /// The environment.
    pub env: TestEnv,
    entity_type: String,
    expected: BTreeMap<EntityId, Option<Attributes>>,
}

impl IntegrationHarness {
    /// Creates a harness over an environment, with the shadow table of
    /// `entity_type` already created.
    pub fn new(env: TestEnv, entity_type: &str) -> Self {
        env.tables()
            .create(&env.schema(entity_type))
            .expect("Failed to create shadow table");
        Self {
            env,
            entity_type: entity_type.to_string(),
            expected: BTreeMap::new(),
        }
    }

    /// Writes a record to the source and reports the save.
    pub fn save(&mut self, id: u64, attributes: &[(&str, &str)]) -> Schedule {
        let id = EntityId::new(id);
        self.env.source.insert_record(id, self.entity_type.as_str(), "body");
        for (key, value) in attributes {
            self.env.source.set_attribute(id, *key, *value);
        }
        self.expected.insert(id, Some(self.canonical(id)));
        self.dispatch(&HostEvent::RecordSaved {
            id,
            entity_type: self.entity_type.clone(),
            status: "publish".to_string(),
            is_revision: false,
        })
    }

    /// Changes one attribute in the source and reports it.
    pub fn set_attribute(&mut self, id: u64, key: &str, value: &str) -> Schedule {
        let id = EntityId::new(id);
        self.env.source.set_attribute(id, key, value);
        if self.expected.get(&id).is_some_and(Option::is_some) {
            self.expected.insert(id, Some(self.canonical(id)));
        }
        self.dispatch(&HostEvent::AttributeChanged { id })
    }

    /// Deletes a record from the source and reports it.
    pub fn delete(&mut self, id: u64) -> Schedule {
        let id = EntityId::new(id);
        self.env.source.remove_record(id);
        self.expected.insert(id, None);
        self.dispatch(&HostEvent::RecordDeleted {
            id,
            entity_type: self.entity_type.clone(),
        })
    }

    /// Ends the unit of work: runs deferred writes and drains the queue.
    pub fn settle(&self) {
        self.env.finish().expect("Deferred writes failed");
        if let Some(queue) = &self.env.queue {
            let sync = self.env.sync();
            for job in queue.drain() {
                sync.process_job(&job).expect("Queued job failed");
            }
        }
        self.env.begin_unit_of_work();
    }

    /// Compares every tracked id with its shadow row.
    pub fn verify_all(&self) -> ConsistencyReport {
        let repository = self.env.shadow(&self.entity_type);
        let mut report = ConsistencyReport::default();
        for (id, expected) in &self.expected {
            report.checked += 1;
            let actual = repository.find(*id).expect("Shadow read failed");
            match (expected, actual) {
                (Some(_), None) => report.missing.push(*id),
                (None, Some(_)) => report.unexpected.push(*id),
                (Some(attributes), Some(entity)) if entity.attributes() != attributes => {
                    report.mismatched.push(*id);
                }
                _ => {}
            }
        }
        report
    }

    fn canonical(&self, id: EntityId) -> Attributes {
        let source: &dyn SourceOfTruth = self.env.source.as_ref();
        let raw = source.get_attributes(id).expect("Source read failed");
        canonical_attributes(source, raw, &self.env.config().internal_keys)
    }

    fn dispatch(&self, event: &HostEvent) -> Schedule {
        self.env.interceptor().handle(event).expect("Event handling failed")
    }
}
