mod support;

use std::sync::Arc;

use rthistory_core::RetrievalError;
use rthistory_core::retrieval::{
    ContourSelection, MoveGranularity, ReceiveBuffer, RetrievalConfig,
    RetrievalPorts, RetrievalScheduler, TaskItem, TaskStatus,
};
use rthistory_model::{
    Contour, ImageModality, InstanceReference, PatientId, RecordClass,
    RecordKind, RoiContour, Uid, class_uids,
};

use support::{
    InMemoryCache, ScriptedArchive, ct_slice, dose, plan,
    single_fraction_patient, structure_set, structure_set_with_regions,
    treated_patient, treatment_record,
};

struct Harness {
    archive: Arc<ScriptedArchive>,
    cache: Arc<InMemoryCache>,
    buffer: ReceiveBuffer,
    scheduler: RetrievalScheduler,
}

fn harness(
    configure: impl FnOnce(ScriptedArchive) -> ScriptedArchive,
    config: RetrievalConfig,
) -> Harness {
    let buffer = ReceiveBuffer::new();
    let archive = Arc::new(configure(ScriptedArchive::new(buffer.clone())));
    let cache = Arc::new(InMemoryCache::new());
    let ports =
        RetrievalPorts::new(archive.clone(), cache.clone(), Arc::new(buffer.clone()));
    Harness {
        archive,
        cache,
        buffer,
        scheduler: RetrievalScheduler::new(ports, config),
    }
}

fn plan_task(patient: &str, instance: &str) -> TaskItem {
    TaskItem::new(
        RecordKind::Plan,
        PatientId::new(patient),
        Uid::new("1.1"),
        Uid::empty(),
        Uid::new(instance),
        RecordClass::new(class_uids::RT_PLAN),
    )
}

fn structure_set_task(patient: &str, instance: &str) -> TaskItem {
    TaskItem::new(
        RecordKind::StructureSet,
        PatientId::new(patient),
        Uid::new("1.1"),
        Uid::empty(),
        Uid::new(instance),
        RecordClass::new(class_uids::RT_STRUCTURE_SET),
    )
}

fn image_task(patient: &str, instance: &str) -> TaskItem {
    TaskItem::new(
        RecordKind::Image(ImageModality::Ct),
        PatientId::new(patient),
        Uid::new("1.1"),
        Uid::empty(),
        Uid::new(instance),
        RecordClass::new(class_uids::CT_IMAGE),
    )
}

#[tokio::test]
async fn plan_expands_into_structure_set_doses_and_one_record_series() {
    let h = harness(
        |archive| archive.with_records(treated_patient("MRN1")),
        RetrievalConfig::default(),
    );

    let outcome = h.scheduler.dispatch(&plan_task("MRN1", "P1")).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    let mut expanded: Vec<(RecordKind, String)> = outcome
        .follow_ups
        .iter()
        .map(|task| {
            let uid = if task.kind() == RecordKind::TreatmentRecord {
                task.series().to_string()
            } else {
                task.instance().to_string()
            };
            (task.kind(), uid)
        })
        .collect();
    expanded.sort_by_key(|(kind, uid)| (kind.label(), uid.clone()));
    assert_eq!(
        expanded,
        vec![
            (RecordKind::Dose, "D1".to_string()),
            (RecordKind::Dose, "D2".to_string()),
            (RecordKind::StructureSet, "S1".to_string()),
            (RecordKind::TreatmentRecord, "T1".to_string()),
        ]
    );
    assert!(outcome.follow_ups.iter().all(|task| task.attempt() == 0));
    assert!(h.buffer.is_empty().await);
}

#[tokio::test]
async fn plan_without_structure_set_still_expands_doses() {
    let h = harness(
        |archive| {
            archive.with_records([plan("MRN1", "P1", None), dose("MRN1", "D1", "P1")])
        },
        RetrievalConfig::default(),
    );

    let outcome = h.scheduler.dispatch(&plan_task("MRN1", "P1")).await;

    assert!(matches!(outcome.status, TaskStatus::ContentFailure { .. }));
    assert_eq!(outcome.follow_ups.len(), 1);
    assert_eq!(outcome.follow_ups[0].kind(), RecordKind::Dose);
}

#[tokio::test]
async fn dose_descriptor_without_instance_is_not_expanded() {
    let h = harness(
        |archive| {
            archive.with_records([
                plan("MRN1", "P1", Some("S1")),
                dose("MRN1", "D1", "P1"),
                dose("MRN1", "", "P1"),
            ])
        },
        RetrievalConfig::default(),
    );

    let outcome = h.scheduler.dispatch(&plan_task("MRN1", "P1")).await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    let doses: Vec<_> = outcome
        .follow_ups
        .iter()
        .filter(|task| task.kind() == RecordKind::Dose)
        .map(|task| task.instance().to_string())
        .collect();
    assert_eq!(doses, vec!["D1".to_string()]);
}

#[tokio::test]
async fn failing_task_is_attempted_exactly_ten_times() {
    let h = harness(
        |archive| archive.with_records(single_fraction_patient("MRN1")).failing("P1"),
        RetrievalConfig::default(),
    );

    let summary = h.scheduler.run(&PatientId::new("MRN1")).await.unwrap();

    assert_eq!(h.archive.moves_for("P1"), 10);
    assert_eq!(summary.retries, 10);
    assert_eq!(summary.abandoned.len(), 1);
    assert_eq!(summary.abandoned[0].kind, RecordKind::Plan);
    assert_eq!(summary.abandoned[0].attempts, 10);
    assert!(!summary.is_complete());
}

#[tokio::test]
async fn completed_move_with_nothing_received_is_retried() {
    let h = harness(
        |archive| archive.with_records(treated_patient("MRN1")).silent("D2"),
        RetrievalConfig::default(),
    );

    let task = TaskItem::new(
        RecordKind::Dose,
        PatientId::new("MRN1"),
        Uid::new("1.1"),
        Uid::new("1.1.3"),
        Uid::new("D2"),
        RecordClass::new(class_uids::RT_DOSE),
    );
    let outcome = h.scheduler.dispatch(&task).await;

    assert!(outcome.status.needs_retry());
    assert_eq!(outcome.follow_ups, vec![task.retry()]);
    assert!(h.buffer.is_empty().await);
}

#[tokio::test]
async fn resolved_image_series_restarts_attempt_count() {
    let h = harness(
        |archive| archive.with_records([ct_slice("MRN1", "CS1", "I1")]),
        RetrievalConfig::default(),
    );
    let task = image_task("MRN1", "I1").retry().retry();

    let outcome = h.scheduler.dispatch(&task).await;

    assert_eq!(outcome.status, TaskStatus::Refined);
    assert_eq!(outcome.follow_ups.len(), 1);
    let refined = &outcome.follow_ups[0];
    assert_eq!(refined.attempt(), 0);
    assert_eq!(refined.series(), &Uid::new("CS1"));
    assert_eq!(refined.instance(), task.instance());
    assert!(h.archive.moves().is_empty());
}

#[tokio::test]
async fn unresolved_image_series_counts_as_a_failed_attempt() {
    let h = harness(
        |archive| archive.with_records([ct_slice("MRN1", "CS1", "I1")]).unresolvable("I1"),
        RetrievalConfig::default(),
    );
    let task = image_task("MRN1", "I1");

    let outcome = h.scheduler.dispatch(&task).await;

    assert!(outcome.status.needs_retry());
    assert_eq!(outcome.follow_ups[0].attempt(), 1);
    assert!(outcome.follow_ups[0].series().is_empty());
}

#[tokio::test]
async fn structure_set_without_contours_is_not_retried() {
    let h = harness(
        |archive| archive.with_records([structure_set("MRN1", "S1", None)]),
        RetrievalConfig::default(),
    );
    let task = TaskItem::new(
        RecordKind::StructureSet,
        PatientId::new("MRN1"),
        Uid::new("1.1"),
        Uid::empty(),
        Uid::new("S1"),
        RecordClass::new(class_uids::RT_STRUCTURE_SET),
    );

    let outcome = h.scheduler.dispatch(&task).await;

    assert!(matches!(outcome.status, TaskStatus::ContentFailure { .. }));
    assert!(outcome.follow_ups.is_empty());
}

#[tokio::test]
async fn first_contoured_region_without_image_reference_stops_expansion() {
    let regions = vec![
        RoiContour {
            roi_number: 1,
            contours: vec![Contour {
                image_refs: Vec::new(),
            }],
        },
        RoiContour {
            roi_number: 2,
            contours: vec![Contour {
                image_refs: vec![InstanceReference::new(class_uids::CT_IMAGE, "I1")],
            }],
        },
    ];
    let h = harness(
        |archive| {
            archive.with_records([
                structure_set_with_regions("MRN1", "S1", regions),
                ct_slice("MRN1", "CS1", "I1"),
            ])
        },
        RetrievalConfig::default(),
    );

    let outcome = h.scheduler.dispatch(&structure_set_task("MRN1", "S1")).await;

    assert!(matches!(outcome.status, TaskStatus::ContentFailure { .. }));
    assert!(outcome.follow_ups.is_empty());
    assert_eq!(h.archive.moves().len(), 1);
}

#[tokio::test]
async fn structure_set_on_unsupported_image_is_a_content_failure() {
    let h = harness(
        |archive| {
            archive.with_records([structure_set(
                "MRN1",
                "S1",
                Some((class_uids::RT_IMAGE, "X1")),
            )])
        },
        RetrievalConfig {
            expansion: rthistory_core::retrieval::ExpansionConfig {
                contour_selection: ContourSelection::EveryRegion,
            },
            ..RetrievalConfig::default()
        },
    );
    let task = TaskItem::new(
        RecordKind::StructureSet,
        PatientId::new("MRN1"),
        Uid::new("1.1"),
        Uid::empty(),
        Uid::new("S1"),
        RecordClass::new(class_uids::RT_STRUCTURE_SET),
    );

    let outcome = h.scheduler.dispatch(&task).await;

    assert!(matches!(outcome.status, TaskStatus::ContentFailure { .. }));
    assert!(outcome.follow_ups.is_empty());
}

#[tokio::test]
async fn full_run_moves_every_record_once() {
    let h = harness(
        |archive| archive.with_records(single_fraction_patient("MRN1")),
        RetrievalConfig::default(),
    );

    let summary = h.scheduler.run(&PatientId::new("MRN1")).await.unwrap();

    assert!(summary.is_complete(), "{summary}");
    assert_eq!(summary.seeded_plans, 1);
    // plan, structure set, two doses, record series, image series
    assert_eq!(summary.completed, 6);
    assert_eq!(summary.refinements, 1);
    for target in ["P1", "S1", "D1", "D2", "T1", "CS1"] {
        assert_eq!(h.archive.moves_for(target), 1, "moves for {target}");
    }
    let series_moves: Vec<_> = h
        .archive
        .moves()
        .into_iter()
        .filter(|request| request.granularity == MoveGranularity::Series)
        .map(|request| request.target.to_string())
        .collect();
    assert_eq!(series_moves.len(), 2);
    assert!(series_moves.contains(&"T1".to_string()));
    assert!(series_moves.contains(&"CS1".to_string()));
}

#[tokio::test]
async fn cached_plan_short_circuits_the_whole_graph() {
    let h = harness(
        |archive| archive.with_records(treated_patient("MRN1")),
        RetrievalConfig::default(),
    );
    h.cache.mark_present(&plan_task("MRN1", "P1").record_key());

    let summary = h.scheduler.run(&PatientId::new("MRN1")).await.unwrap();

    // one plan task per fraction, both answered by the cache
    assert_eq!(summary.seeded_plans, 2);
    assert_eq!(summary.already_present, 2);
    assert_eq!(summary.dispatched, 2);
    assert!(h.archive.moves().is_empty());
}

#[tokio::test]
async fn tasks_for_different_patients_never_mix_identifiers() {
    let h = harness(
        |archive| {
            archive
                .with_records(treated_patient("MRN1"))
                .with_records(treated_patient("MRN2"))
        },
        RetrievalConfig::default(),
    );

    h.scheduler.run(&PatientId::new("MRN1")).await.unwrap();
    let first_run = h.archive.calls();
    assert!(!first_run.is_empty());
    assert!(first_run.iter().all(|call| call.patient() == &PatientId::new("MRN1")));

    let a = h.scheduler.dispatch(&plan_task("MRN2", "P1")).await;
    let b = h.scheduler.dispatch(&image_task("MRN1", "I1")).await;
    assert!(a.follow_ups.iter().all(|task| task.patient() == &PatientId::new("MRN2")));
    assert!(b.follow_ups.iter().all(|task| task.patient() == &PatientId::new("MRN1")));

    let later = &h.archive.calls()[first_run.len()..];
    let (mrn2_calls, mrn1_calls): (Vec<_>, Vec<_>) = later
        .iter()
        .partition(|call| call.patient() == &PatientId::new("MRN2"));
    assert!(!mrn2_calls.is_empty());
    assert!(!mrn1_calls.is_empty());
    assert!(mrn1_calls.iter().all(|call| call.as_move().is_none()));
}

#[tokio::test]
async fn seeding_failure_fails_the_run() {
    let h = harness(
        |archive| archive.failing_seed("association rejected"),
        RetrievalConfig::default(),
    );

    let err = h.scheduler.run(&PatientId::new("MRN1")).await.unwrap_err();

    assert!(matches!(err, RetrievalError::Seeding { .. }));
}

#[tokio::test]
async fn treatment_records_seed_one_plan_task_per_fraction() {
    let h = harness(
        |archive| {
            archive.with_records([
                treatment_record("MRN1", "T1", "R1", "P1", "20240102", 1),
                treatment_record("MRN1", "T1", "R2", "P1", "20240103", 2),
                treatment_record("MRN1", "T2", "R3", "P2", "20240101", 1),
            ])
        },
        RetrievalConfig::default(),
    );
    h.cache.mark_present(&plan_task("MRN1", "P1").record_key());
    h.cache.mark_present(&plan_task("MRN1", "P2").record_key());

    let summary = h.scheduler.run(&PatientId::new("MRN1")).await.unwrap();

    assert_eq!(summary.seeded_plans, 3);
    assert_eq!(summary.already_present, 3);
    let plans: Vec<_> = h
        .cache
        .lookups()
        .into_iter()
        .filter_map(|key| key.instance)
        .collect();
    assert_eq!(plans, vec![Uid::new("P2"), Uid::new("P1"), Uid::new("P1")]);
    assert!(h.archive.moves().is_empty());
}

#[tokio::test]
async fn cached_treatment_record_series_is_not_moved() {
    let h = harness(
        |archive| archive.with_records(treated_patient("MRN1")),
        RetrievalConfig::default(),
    );
    let task = TaskItem::new(
        RecordKind::TreatmentRecord,
        PatientId::new("MRN1"),
        Uid::new("1.1"),
        Uid::new("T1"),
        Uid::new("R1"),
        RecordClass::new(class_uids::RT_BEAMS_TREATMENT_RECORD),
    );
    let key = task.record_key();
    assert_eq!(key.series, Some(Uid::new("T1")));
    assert_eq!(key.instance, None);
    h.cache.mark_present(&key);

    let outcome = h.scheduler.dispatch(&task).await;

    assert_eq!(outcome.status, TaskStatus::AlreadyPresent);
    assert!(outcome.follow_ups.is_empty());
    assert!(h.archive.moves().is_empty());
    assert_eq!(h.cache.lookups(), vec![key]);
}

#[tokio::test]
async fn cached_resolved_image_series_is_not_moved() {
    let h = harness(
        |archive| archive.with_records(treated_patient("MRN1")),
        RetrievalConfig::default(),
    );
    let task = TaskItem::new(
        RecordKind::Image(ImageModality::Ct),
        PatientId::new("MRN1"),
        Uid::new("1.1"),
        Uid::new("CS1"),
        Uid::new("I1"),
        RecordClass::new(class_uids::CT_IMAGE),
    );
    let key = task.record_key();
    assert_eq!(key.series, Some(Uid::new("CS1")));
    assert_eq!(key.instance, None);
    h.cache.mark_present(&key);

    let outcome = h.scheduler.dispatch(&task).await;

    assert_eq!(outcome.status, TaskStatus::AlreadyPresent);
    assert!(outcome.follow_ups.is_empty());
    assert!(h.archive.moves().is_empty());
    assert!(h.archive.calls().is_empty());
}
