//! Persistence behaviour of the SQLite backend

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

use fritest_core::{
    AttemptLog, BatchDirectory, Category, CategoryTargets, DefinitionFilter, DefinitionRepository,
    DefinitionStatus, Difficulty, QuestionBank, QuestionRef, Schedule, ScheduleFilter,
    ScheduleRepository, ScheduleStatus, StoreError, TestDefinition,
};
use fritest_store::SqliteStore;

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, day, 9, 0, 0).unwrap()
}

fn definition(id: &str, admin: &str) -> TestDefinition {
    TestDefinition::new(id, format!("FRI {id}"))
        .questions(10)
        .categories(CategoryTargets::new(50, 30, 20))
        .window(at(1), at(30))
        .created_by(admin, admin)
}

fn schedule(id: &str, definition: &str, institution: &str, day: u32) -> Schedule {
    Schedule {
        id: id.into(),
        definition_id: definition.into(),
        institution_id: institution.into(),
        institution_name: institution.to_uppercase(),
        scheduled_date: at(day),
        scheduled_end_date: None,
        assigned_faculty: None,
        assigned_students: Vec::new(),
        assigned_batches: Vec::new(),
        roster: ["s1".to_string()].into_iter().collect(),
        generated_questions: Vec::new(),
        status: ScheduleStatus::Scheduled,
        instructions: None,
        total_assigned_students: 1,
        total_attempted: 0,
        total_completed: 0,
        created_at: at(1),
        updated_at: at(1),
    }
}

#[test]
fn definitions_round_trip_through_json_body() {
    let store = SqliteStore::in_memory().unwrap();
    let def = definition("d1", "admin").target("inst-a");
    store.insert_definition(&def).unwrap();

    assert_eq!(store.get_definition("d1").unwrap(), Some(def));
    assert_eq!(store.get_definition("missing").unwrap(), None);
}

#[test]
fn definition_listing_filters_by_author_and_status() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_definition(&definition("d1", "alice")).unwrap();
    store
        .insert_definition(&definition("d2", "alice").with_status(DefinitionStatus::Archived))
        .unwrap();
    store.insert_definition(&definition("d3", "bob")).unwrap();

    let alice = store
        .list_definitions(&DefinitionFilter {
            created_by: Some("alice".into()),
            status: None,
        })
        .unwrap();
    assert_eq!(alice.len(), 2);

    let active: Vec<String> = store
        .list_definitions(&DefinitionFilter {
            created_by: None,
            status: Some(DefinitionStatus::Active),
        })
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(active.len(), 2);
    assert!(!active.contains(&"d2".to_string()));
}

#[test]
fn updating_a_missing_definition_is_not_found() {
    let store = SqliteStore::in_memory().unwrap();
    let err = store.update_definition(&definition("ghost", "a")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn second_occupying_schedule_is_a_conflict() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_schedule(&schedule("s1", "d1", "inst", 5)).unwrap();

    let err = store
        .insert_schedule(&schedule("s2", "d1", "inst", 6))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");

    // A different institution is unaffected
    store.insert_schedule(&schedule("s3", "d1", "other", 6)).unwrap();
}

#[test]
fn cancelled_schedule_frees_the_slot() {
    let store = SqliteStore::in_memory().unwrap();
    let mut first = schedule("s1", "d1", "inst", 5);
    store.insert_schedule(&first).unwrap();

    first.status = ScheduleStatus::Cancelled;
    store.update_schedule(&first).unwrap();
    assert_eq!(store.find_occupying("d1", "inst").unwrap(), None);

    store.insert_schedule(&schedule("s2", "d1", "inst", 7)).unwrap();
    assert_eq!(
        store.find_occupying("d1", "inst").unwrap().map(|s| s.id),
        Some("s2".to_string())
    );
}

#[test]
fn completed_schedule_keeps_the_slot() {
    let store = SqliteStore::in_memory().unwrap();
    let mut first = schedule("s1", "d1", "inst", 5);
    store.insert_schedule(&first).unwrap();
    first.status = ScheduleStatus::Completed;
    store.update_schedule(&first).unwrap();

    let err = store
        .insert_schedule(&schedule("s2", "d1", "inst", 7))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn schedules_list_latest_date_first() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_schedule(&schedule("s1", "d1", "inst", 3)).unwrap();
    store.insert_schedule(&schedule("s2", "d2", "inst", 12)).unwrap();
    store.insert_schedule(&schedule("s3", "d3", "inst", 8)).unwrap();
    store.insert_schedule(&schedule("s4", "d1", "other", 20)).unwrap();

    let ids: Vec<String> = store
        .list_schedules(&ScheduleFilter {
            institution: Some("inst".into()),
            ..ScheduleFilter::default()
        })
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["s2", "s3", "s1"]);

    let for_d1 = store
        .list_schedules(&ScheduleFilter {
            definition: Some("d1".into()),
            ..ScheduleFilter::default()
        })
        .unwrap();
    assert_eq!(for_d1.len(), 2);
}

#[test]
fn sampling_respects_cell_and_library_flag() {
    let store = SqliteStore::in_memory().unwrap();
    for i in 0..6 {
        store
            .add_question(
                &QuestionRef::new(format!("apt-e-{i}"), Category::Aptitude, Difficulty::Easy),
                true,
            )
            .unwrap();
    }
    store
        .add_question(
            &QuestionRef::new("apt-m-0", Category::Aptitude, Difficulty::Medium),
            true,
        )
        .unwrap();
    store.set_in_library("apt-e-0", false).unwrap();

    assert_eq!(store.available(Category::Aptitude, Difficulty::Easy).unwrap(), 5);

    let drawn = store.sample(Category::Aptitude, Difficulty::Easy, 10).unwrap();
    assert_eq!(drawn.len(), 5);
    assert!(drawn.iter().all(|q| q.question_id != "apt-e-0"));
    assert!(drawn.iter().all(|q| q.difficulty == Difficulty::Easy));

    let unique: HashSet<_> = drawn.iter().map(|q| &q.question_id).collect();
    assert_eq!(unique.len(), drawn.len());

    assert_eq!(store.sample(Category::Aptitude, Difficulty::Easy, 2).unwrap().len(), 2);
}

#[test]
fn batch_members_are_scoped_by_institution() {
    let store = SqliteStore::in_memory().unwrap();
    store.add_batch_member("inst", "2026-cse", "s2").unwrap();
    store.add_batch_member("inst", "2026-cse", "s1").unwrap();
    store.add_batch_member("inst", "2026-cse", "s1").unwrap();
    store.add_batch_member("other", "2026-cse", "s9").unwrap();

    assert_eq!(
        store.resolve_batch_members("inst", "2026-cse").unwrap(),
        vec!["s1", "s2"]
    );
    assert!(store.resolve_batch_members("inst", "unknown").unwrap().is_empty());
}

#[test]
fn attempts_start_then_complete() {
    let store = SqliteStore::in_memory().unwrap();
    let t0 = at(10);
    store.start_attempt("sch", "ana", t0).unwrap();
    store.start_attempt("sch", "ana", t0 + Duration::hours(1)).unwrap();

    let open = store.find_attempt("sch", "ana").unwrap().unwrap();
    assert_eq!(open.started_at, t0);
    assert!(!open.is_completed());

    store
        .complete_attempt("sch", "ana", t0 + Duration::minutes(50))
        .unwrap();
    let done = store.find_attempt("sch", "ana").unwrap().unwrap();
    assert_eq!(done.started_at, t0);
    assert_eq!(done.completed_at, Some(t0 + Duration::minutes(50)));

    store.complete_attempt("sch", "ben", t0).unwrap();
    assert!(store.find_attempt("sch", "ben").unwrap().unwrap().is_completed());
    assert_eq!(store.find_attempt("sch", "cho").unwrap(), None);
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fri.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert_definition(&definition("d1", "admin")).unwrap();
        store.insert_schedule(&schedule("s1", "d1", "inst", 5)).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.get_definition("d1").unwrap().is_some());
    let err = store
        .insert_schedule(&schedule("s2", "d1", "inst", 9))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}
