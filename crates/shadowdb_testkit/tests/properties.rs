//! End-to-end properties of the shadow engine.

use proptest::prelude::*;
use serde_json::json;
use shadowdb_core::{
    CacheLookup, Entity, EntityId, IntegrityStatus, MetaPredicate, MetaQuery, QueryClauses, Schema, ShadowConfig,
    StepOutcome,
};
use shadowdb_testkit::prelude::*;

#[test]
fn sync_is_idempotent() {
    with_each_driver(|env| {
        env.seed(1, "post", &[("color", "red"), ("size", "L")]);
        env.source.add_attribute(EntityId::new(1), "tag", "a");
        env.source.add_attribute(EntityId::new(1), "tag", "b");
        env.tables().create(&Schema::new("post")).unwrap();

        let first = env.sync().sync_entity(EntityId::new(1)).unwrap();
        let second = env.sync().sync_entity(EntityId::new(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(env.tables().stats("post").unwrap().count, 1);
        assert_eq!(env.shadow("post").find(EntityId::new(1)).unwrap(), second);

        let by_tag = env.shadow("post").find_by_meta("color", "red").unwrap();
        assert_eq!(by_tag.len(), 1, "driver {}", env.driver_name());
    });
}

#[test]
fn find_many_returns_only_stored_ids() {
    with_each_driver(|env| {
        env.seed(2, "post", &[("a", "1")]);
        env.migrate("post");

        let ids = [EntityId::new(1), EntityId::new(2), EntityId::new(3)];
        let found = env.shadow("post").find_many(&ids).unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![EntityId::new(2)]);
        assert!(env.shadow("post").find_many(&[]).unwrap().is_empty());
    });
}

#[test]
fn schema_table_names() {
    assert_eq!(Schema::new("product").table_name("wp_"), "wp_shadow_product");
    assert_eq!(
        Schema::new("product-variation").table_name("wp_"),
        "wp_shadow_product_variation"
    );
    assert_eq!(
        Schema::new("product").lookup_table_name("wp_"),
        "wp_shadow_product_lookup"
    );
}

#[test]
fn translation_without_keyed_predicates_is_a_no_op() {
    with_each_driver(|env| {
        env.tables().create(&Schema::new("post")).unwrap();
        let clauses = QueryClauses {
            join: " LEFT JOIN wp_term_relationships tr ON tr.object_id = wp_posts.ID".into(),
            where_: "1=1 AND wp_posts.post_type = 'post'".into(),
            groupby: String::new(),
            params: Vec::new(),
        };

        let untouched = env.translate("post", clauses.clone(), &MetaQuery::new()).unwrap();
        assert_eq!(untouched, clauses);

        let keyed = MetaQuery::new().with(MetaPredicate::eq("color", "red"));
        let rewritten = env.translate("post", clauses.clone(), &keyed).unwrap();
        assert!(rewritten.join.starts_with(&clauses.join));
        assert!(rewritten.where_.starts_with(&clauses.where_));
        assert!(!rewritten.params.is_empty());
    });
}

#[test]
fn integrity_detects_drift() {
    with_each_driver(|env| {
        env.seed(1, "product", &[("price", "10")]);
        env.migrate("product");

        let drifted = Entity::new(EntityId::new(1), "product", "content of 1", serde_json::from_value(json!({"price": 10})).unwrap());
        env.shadow("product").save(&drifted).unwrap();
        env.source.set_attribute(EntityId::new(1), "price", "20");

        let report = env.integrity().check("product", 10).unwrap();
        assert_eq!(report.status, IntegrityStatus::IssuesFound);
        let mismatch = &report.issues[&EntityId::new(1)]["price"];
        assert_eq!(mismatch.shadow, json!(10));
        assert_eq!(mismatch.source, json!("20"));
    });
}

#[test]
fn migration_state_survives_reopen() {
    let env = TestEnv::file();
    for id in 1..=5 {
        env.seed(id, "post", &[]);
    }
    env.migration().start("post").unwrap();

    let reopened = env.reopen();
    let state = reopened.migration().progress("post").unwrap().unwrap();
    assert_eq!((state.total, state.migrated), (5, 0));
    match reopened.migration().step("post").unwrap() {
        StepOutcome::Completed(state) => assert_eq!(state.migrated, 5),
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(!env.migration().is_migrating("post").unwrap());
}

#[test]
fn queued_writes_apply_when_drained() {
    let mut harness = IntegrationHarness::new(TestEnv::queued(), "page");
    assert_eq!(harness.save(7, &[("title", "About")]), shadowdb_core::Schedule::Queued);
    assert_eq!(harness.env.queue.as_ref().map(|q| q.len()), Some(1));
    harness.settle();
    assert!(harness.verify_all().is_consistent());
}

#[derive(Debug, Clone)]
enum CacheOp {
    Sync(u64),
    Delete(u64),
    Read(u64),
}

fn cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (1u64..6).prop_map(CacheOp::Sync),
        (1u64..6).prop_map(CacheOp::Delete),
        (1u64..9).prop_map(CacheOp::Read),
    ]
}

proptest! {
    #![proptest_config(PropTestConfig::database().to_proptest_config())]

    #[test]
    fn repository_round_trip(entity in entity_strategy("post")) {
        for env in TestEnv::both() {
            env.tables().create(&Schema::new("post")).unwrap();
            let repository = env.shadow("post");
            repository.save(&entity).unwrap();
            prop_assert_eq!(repository.find(entity.id()).unwrap(), Some(entity.clone()));
            prop_assert!(repository.remove(entity.id()).unwrap());
            prop_assert!(!repository.exists(entity.id()).unwrap());
        }
    }

    #[test]
    fn migration_is_monotonic(count in 0u64..25, batch in 1usize..8) {
        let env = TestEnv::with_config(ShadowConfig::new().migration_batch_size(batch));
        for id in 1..=count {
            env.seed(id, "post", &[]);
        }
        let migration = env.migration();
        migration.start("post").unwrap();

        // an empty source still takes one call to notice
        let expected_calls = (count as usize).div_ceil(batch).max(1);
        let mut last = (0usize, 0u64);
        for call in 1..=expected_calls {
            let outcome = migration.step("post").unwrap();
            let state = outcome.state().cloned().expect("migration vanished");
            prop_assert!(state.migrated <= count);
            if call < expected_calls {
                prop_assert!(matches!(outcome, StepOutcome::Advanced(_)), "call {} of {}", call, expected_calls);
                prop_assert!(state.offset > last.0);
                prop_assert!(state.migrated > last.1);
                last = (state.offset, state.migrated);
            } else {
                prop_assert!(matches!(outcome, StepOutcome::Completed(_)), "call {} of {}", call, expected_calls);
                prop_assert_eq!(state.migrated, count);
                prop_assert!((state.percent() - 100.0).abs() < f64::EPSILON);
            }
        }
        prop_assert_eq!(env.tables().stats("post").unwrap().count, count);
        prop_assert!(matches!(migration.step("post").unwrap(), StepOutcome::NoMigration));
    }

    #[test]
    fn cache_entries_are_exclusive(ops in prop::collection::vec(cache_op(), 1..24)) {
        let env = TestEnv::native();
        for id in 1..6 {
            env.seed(id, "post", &[("n", "1")]);
        }
        env.tables().create(&Schema::new("post")).unwrap();

        for op in ops {
            match op {
                CacheOp::Sync(id) => {
                    env.sync().sync_entity(EntityId::new(id)).unwrap();
                }
                CacheOp::Delete(id) => {
                    env.sync().delete_entity(EntityId::new(id), "post").unwrap();
                }
                CacheOp::Read(id) => {
                    env.reader().load(EntityId::new(id), "post").unwrap();
                }
            }
            for id in 1..9 {
                let id = EntityId::new(id);
                let cached = env.cache().has(id);
                let absent = env.cache().is_marked_not_found(id);
                prop_assert!(!(cached && absent));
                if let CacheLookup::Hit(entity) = env.cache().lookup(id) {
                    prop_assert_eq!(env.shadow("post").find(id).unwrap(), Some(entity));
                }
            }
        }
    }
}
