#![allow(clippy::unwrap_used)]
// Availability lifecycle, metadata and commands through `PoolClient`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;

use poolsync_core::{
    Availability, Command, CoreError, CreateElementRequest, DiscardReason, ElementKind, EntityKind,
    Identified, MemorySource, PoolClient, PoolConfig, ReconcileOutcome,
};

use common::{available_client, config, lines, motor, populated_source};

// ── Bootstrap ───────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_loads_every_collection() {
    let source = populated_source();
    let client = PoolClient::new(config(), source.clone());
    assert_eq!(*client.availability().borrow(), Availability::Unavailable);

    let report = client.set_available().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.epoch, 1);
    assert_eq!(
        report.loaded.keys().copied().collect::<Vec<_>>(),
        EntityKind::BOOTSTRAP_ORDER.to_vec()
    );
    assert_eq!(report.loaded[&EntityKind::Motors], 2);
    assert_eq!(report.loaded[&EntityKind::ExperimentChannels], 3);
    assert!(client.is_available());
    assert!(client.last_refresh().is_some());

    let store = client.store();
    let ctrl1 = store.controller("ctrl1").unwrap();
    assert_eq!(ctrl1.element_count(), 2);
    assert_eq!(ctrl1.class().unwrap().key(), "icepap.py/IcepapCtrl");
    assert_eq!(store.controller("sumctrl").unwrap().element_count(), 1);
    // `total` is listed twice but owned once.
    assert_eq!(store.controller_element_count(), 5);
    assert_eq!(
        store.find_element("mnt").unwrap().member_names(),
        vec!["ct01", "ct02", "total"]
    );
    assert_eq!(store.controllers_in_library("icepap.py").len(), 1);
}

#[tokio::test]
async fn bootstrap_fetches_metadata() {
    let client = available_client(&populated_source()).await;
    let report = client.last_report().await.unwrap();
    // No class info for Sum, no instance info for ctctrl and sumctrl.
    assert_eq!(report.metadata_failures, 3);

    let store = client.store();
    let icepap = store.class_by_qualified_name("icepap.IcepapCtrl").unwrap();
    assert!(Arc::ptr_eq(&icepap, &store.class_by_file("icepap.py", "IcepapCtrl").unwrap()));
    assert_eq!(icepap.info().description, "IcePAP motor controller");

    let dummy = store.class_by_file("dummyct.py", "DummyCounterTimer").unwrap();
    assert_eq!(dummy.info().description, "Dummy counter/timer");

    let ctrl1 = store.controller("ctrl1").unwrap();
    assert_eq!(ctrl1.property_value("Host").as_deref(), Some("icepap02"));

    let settings = store
        .element(EntityKind::MeasurementGroups, "mnt")
        .unwrap()
        .settings()
        .unwrap();
    assert_eq!(settings.timer.as_deref(), Some("ct01"));
    assert_eq!(settings.monitor, None, "monitor must be one of the group's channels");
    assert_eq!(settings.integration_time, Some(0.5));
}

#[tokio::test]
async fn failed_collection_is_reported_and_others_load() {
    let source = populated_source();
    source.fail_list(EntityKind::ExperimentChannels, "device timeout");
    let client = available_client(&source).await;

    let report = client.last_report().await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failed.keys().copied().collect::<Vec<_>>(), vec![EntityKind::ExperimentChannels]);
    assert!(report.failed[&EntityKind::ExperimentChannels].contains("device timeout"));

    let store = client.store();
    assert!(store.elements_snapshot(EntityKind::ExperimentChannels).is_empty());
    assert_eq!(store.elements_snapshot(EntityKind::Motors).len(), 2);
    // The measurement group exists but only resolves what loaded.
    let mnt = store.element(EntityKind::MeasurementGroups, "mnt").unwrap();
    assert_eq!(mnt.member_names(), vec!["total"]);
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn teardown_empties_collections_and_observers() {
    let client = available_client(&populated_source()).await;
    let mut motors = client.subscribe(EntityKind::Motors).await.unwrap();
    let mut groups = client.subscribe(EntityKind::MotorGroups).await.unwrap();
    let mot1 = client.store().element(EntityKind::Motors, "mot1").unwrap();

    client.set_unavailable().await;

    assert_eq!(*client.availability().borrow(), Availability::Unavailable);
    let status = client.status().await.unwrap();
    assert_eq!(status.total_entities(), 0);
    assert_eq!(status.total_observers(), 0);
    for kind in EntityKind::BOOTSTRAP_ORDER {
        assert!(client.store().snapshot(kind).is_empty(), "{kind} not cleared");
    }
    assert!(!mot1.is_active());
    assert!(mot1.controller().is_none());
    assert!(motors.recv().await.is_none());
    assert!(groups.recv().await.is_none());
}

#[tokio::test]
async fn snapshot_while_unavailable_is_discarded() {
    let client = available_client(&MemorySource::new()).await;
    client.set_unavailable().await;

    let outcome = client
        .push_snapshot(EntityKind::Motors, vec![motor("mot1", "ctrl1", 1)])
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Discarded(DiscardReason::Unavailable));
    assert!(client.store().elements_snapshot(EntityKind::Motors).is_empty());
}

#[tokio::test]
async fn recovery_rebuilds_every_entity() {
    let source = populated_source();
    let client = available_client(&source).await;
    let before = client.store().element(EntityKind::Motors, "mot1").unwrap();

    client.set_unavailable().await;
    let report = client.set_available().await.unwrap();
    assert_eq!(report.epoch, 2);

    let after = client.store().element(EntityKind::Motors, "mot1").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(!before.is_active());
    assert!(after.is_active());
    assert_eq!(after.controller().unwrap().name(), "ctrl1");
}

#[tokio::test]
async fn observers_may_register_in_any_state() {
    let client = PoolClient::new(config(), MemorySource::new());
    let early = client.subscribe(EntityKind::Motors).await.unwrap();
    assert!(client.unsubscribe(early.id()).await.unwrap());
    assert!(!client.unsubscribe(early.id()).await.unwrap());
}

// ── Store readers ───────────────────────────────────────────────────

#[tokio::test]
async fn store_readers_see_bootstrap_without_the_engine() {
    let client = PoolClient::new(config(), populated_source());
    let mut waiting = client.store().elements(EntityKind::Motors).unwrap();
    let reader = tokio::spawn(async move { waiting.wait_for("mot2").await.map(|m| m.name().to_owned()) });

    let mut motors = client.store().elements(EntityKind::Motors).unwrap();
    assert!(motors.snapshot().is_empty());

    client.set_available().await.unwrap();
    assert_eq!(reader.await.unwrap().as_deref(), Some("mot2"));

    let mot1 = motors.wait_for("mot1").await.unwrap();
    assert!(Arc::ptr_eq(&mot1, &client.store().element(EntityKind::Motors, "mot1").unwrap()));

    client.set_unavailable().await;
    assert!(motors.changed().await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_stream_starts_with_current_contents() {
    let client = available_client(&populated_source()).await;
    let mut controllers = client.store().controllers().into_stream();

    let first = controllers.next().await.unwrap();
    assert_eq!(first.iter().map(|c| c.identity()).collect::<Vec<_>>(), vec!["ctrl1", "ctctrl", "sumctrl"]);

    client.set_unavailable().await;
    assert!(controllers.next().await.unwrap().is_empty());
}

// ── Synthetic notifications ─────────────────────────────────────────

#[tokio::test]
async fn replace_collection_notifies_even_without_change() {
    let client = available_client(&populated_source()).await;
    let mut sub = client.subscribe(EntityKind::Motors).await.unwrap();
    let same = vec![motor("mot1", "ctrl1", 1), motor("mot2", "ctrl1", 2)];

    let outcome = client.replace_collection(EntityKind::Motors, same).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);

    let notice = sub.try_recv().unwrap();
    assert_eq!(notice.kind, EntityKind::Motors);
    assert_eq!(notice.snapshot.names(), vec!["mot1", "mot2"]);
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_picks_up_new_entities_and_their_metadata() {
    let source = populated_source();
    let client = available_client(&source).await;

    source.set_list(
        EntityKind::Controllers,
        lines(&[
            common::CTRL1,
            common::CTCTRL,
            common::SUMCTRL,
            "ctrl2 (icepap.IcepapCtrl/icepap.py) - Motor Python (icepap.py)",
        ]),
    );
    source.set_instance_info(
        "ctrl2",
        lines(&["", "", "", "", "1", "Host", "PyTango.DevString", "", "icepap09"]),
    );

    let outcomes = client.refresh(&[EntityKind::Controllers, EntityKind::Motors]).await.unwrap();
    assert!(outcomes[&EntityKind::Controllers].is_applied());
    assert_eq!(outcomes[&EntityKind::Motors], ReconcileOutcome::Unchanged);

    let ctrl2 = client.store().controller("ctrl2").unwrap();
    assert_eq!(ctrl2.property_value("Host").as_deref(), Some("icepap09"));
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_follows_the_source() {
    let source = populated_source();
    let mut cfg = PoolConfig::new("test-pool", "pool/test/1");
    cfg.refresh_interval = Duration::from_secs(3);
    let client = PoolClient::new(cfg, source.clone());
    client.set_available().await.unwrap();
    let mut sub = client.subscribe(EntityKind::Motors).await.unwrap();

    source.set_list(
        EntityKind::Motors,
        [motor("mot1", "ctrl1", 1), motor("mot2", "ctrl1", 2), motor("mot3", "ctrl1", 3)],
    );

    let notice = tokio::time::timeout(Duration::from_secs(10), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.snapshot.len(), 3);
    client.shutdown().await;
}

#[tokio::test]
async fn refresh_requires_availability() {
    let client = PoolClient::new(config(), populated_source());
    let err = client.refresh_all().await.unwrap_err();
    assert!(matches!(err, CoreError::Unavailable { .. }));
}

// ── Source-driven availability ──────────────────────────────────────

#[tokio::test]
async fn client_follows_source_availability() {
    let source = populated_source();
    let client = PoolClient::new(config(), source.clone());
    let mut availability = client.availability();

    source.set_available(true);
    availability
        .wait_for(|a| *a == Availability::Available)
        .await
        .unwrap();
    assert_eq!(client.store().elements_snapshot(EntityKind::Motors).len(), 2);

    source.set_available(false);
    availability
        .wait_for(|a| *a == Availability::Unavailable)
        .await
        .unwrap();
    assert!(client.store().elements_snapshot(EntityKind::Motors).is_empty());
    client.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

fn create_mot3() -> Command {
    Command::CreateElement(CreateElementRequest {
        kind: ElementKind::Motor,
        index: 3,
        name: "mot3".into(),
        controller: "ctrl1".into(),
    })
}

#[tokio::test]
async fn command_refreshes_affected_collections() {
    let source = populated_source();
    let client = available_client(&source).await;
    // The pool lists the new motor once the command went through.
    source.set_list(
        EntityKind::Motors,
        [motor("mot1", "ctrl1", 1), motor("mot2", "ctrl1", 2), motor("mot3", "ctrl1", 3)],
    );

    let result = client.execute(create_mot3()).await.unwrap();
    assert_eq!(result.command, "CreateMotor");
    let ReconcileOutcome::Applied(changes) = &result.refreshed[&EntityKind::Motors] else {
        panic!("motors were not refreshed");
    };
    assert_eq!(changes.added, vec!["mot3"]);

    let recorded = source.commands();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].args, vec!["3", "mot3", "ctrl1"]);
    assert_eq!(client.store().controller("ctrl1").unwrap().element_count(), 3);
}

#[tokio::test]
async fn rejected_command_surfaces_the_source_error() {
    let source = populated_source();
    source.reject_command("CreateMotor", "axis 3 already in use");
    let client = available_client(&source).await;

    let err = client.execute(create_mot3()).await.unwrap_err();
    assert!(matches!(err, CoreError::Source(_)));
    assert!(err.to_string().contains("axis 3 already in use"));
}

#[tokio::test]
async fn commands_need_an_available_pool() {
    let client = PoolClient::new(config(), MemorySource::new());
    let err = client.execute(create_mot3()).await.unwrap_err();
    assert!(matches!(err, CoreError::Unavailable { .. }));

    let invalid = Command::DeleteController { name: String::new() };
    assert!(matches!(
        client.execute(invalid).await.unwrap_err(),
        CoreError::ValidationFailed { .. }
    ));
}

#[tokio::test]
async fn oneshot_bootstraps_and_leaves() {
    let count = PoolClient::oneshot(config(), populated_source(), |client, report| async move {
        assert!(report.is_complete());
        Ok(client.store().controllers_snapshot().len())
    })
    .await
    .unwrap();
    assert_eq!(count, 3);
}
