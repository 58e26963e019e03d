//! Admin-side definition management

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use fritest_core::{
    Category, CategoryTargets, DefinitionError, DefinitionStatus, Difficulty, DifficultyTargets,
    InstitutionRef, QuestionRef, TargetKind,
};
use fritest_engine::{
    CatalogError, DefinitionCatalog, DefinitionDraft, DefinitionEdit, DefinitionQuery, Generator,
    ScheduleManager, ScheduleRequest,
};
use fritest_store::SqliteStore;

fn at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, 0, 0, 0).unwrap()
}

fn stocked_store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    for category in Category::ALL {
        for difficulty in Difficulty::ALL {
            for n in 0..5 {
                store
                    .add_question(
                        &QuestionRef::new(format!("{category}-{difficulty}-{n}"), category, difficulty),
                        true,
                    )
                    .unwrap();
            }
        }
    }
    store
}

fn draft(name: &str) -> DefinitionDraft {
    DefinitionDraft {
        name: name.into(),
        description: None,
        total_questions: 10,
        category_targets: CategoryTargets::new(50, 30, 20),
        difficulty_targets: DifficultyTargets::default(),
        duration_minutes: 45,
        available_from: at(2, 1),
        available_to: at(3, 31),
        target_institutions: Default::default(),
        shuffle_questions: true,
        show_results_immediately: false,
        allow_review: false,
    }
}

fn catalog(store: &SqliteStore) -> DefinitionCatalog<'_> {
    DefinitionCatalog::new(store, store, store, Generator::default())
}

#[test]
fn create_stores_an_active_definition() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();

    assert_eq!(created.status, DefinitionStatus::Active);
    assert_eq!(created.created_by, "admin-1");
    assert_eq!(created.created_by_username, "alice");
    assert_eq!(created.created_at, at(1, 15));
    assert_eq!(catalog(&store).get(&created.id, "admin-1").unwrap(), created);
}

#[test]
fn create_rejects_bad_percentages() {
    let store = stocked_store();
    let mut bad = draft("FRI");
    bad.difficulty_targets = DifficultyTargets::new(30, 30, 30);

    let err = catalog(&store)
        .create(bad, "admin-1", "alice", at(1, 15))
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::InvalidDefinition(DefinitionError::InvalidPercentages {
            kind: TargetKind::Difficulty,
            sum: 90
        })
    ));
    assert!(catalog(&store)
        .list("admin-1", &DefinitionQuery::default(), at(1, 15))
        .unwrap()
        .is_empty());
}

#[test]
fn create_rejects_when_the_bank_cannot_supply() {
    let store = SqliteStore::in_memory().unwrap();
    let err = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap_err();
    assert!(err.to_string().contains("aptitude/easy"), "{err}");
}

#[test]
fn unreferenced_definitions_can_be_edited() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();

    let edited = catalog(&store)
        .edit(
            &created.id,
            "admin-1",
            DefinitionEdit {
                total_questions: Some(12),
                name: Some("FRI v2".into()),
                ..DefinitionEdit::default()
            },
            at(1, 20),
        )
        .unwrap();
    assert_eq!(edited.total_questions, 12);
    assert_eq!(edited.name, "FRI v2");
    assert_eq!(edited.updated_at, at(1, 20));

    let err = catalog(&store)
        .edit(
            &created.id,
            "admin-1",
            DefinitionEdit {
                available_to: Some(at(1, 1)),
                ..DefinitionEdit::default()
            },
            at(1, 20),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::InvalidDefinition(DefinitionError::InvalidWindow { .. })
    ));
}

#[test]
fn edits_must_stay_within_the_bank() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();

    let err = catalog(&store)
        .edit(
            &created.id,
            "admin-1",
            DefinitionEdit {
                total_questions: Some(u32::MAX),
                ..DefinitionEdit::default()
            },
            at(1, 20),
        )
        .unwrap_err();
    assert!(
        matches!(
            err,
            CatalogError::InsufficientQuestions {
                category: Category::Aptitude,
                difficulty: Difficulty::Easy,
                available: 5,
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(catalog(&store).get(&created.id, "admin-1").unwrap(), created);

    // Status edits skip the supply check
    store.set_in_library("aptitude-easy-0", false).unwrap();
    store.set_in_library("aptitude-easy-1", false).unwrap();
    store.set_in_library("aptitude-easy-2", false).unwrap();
    store.set_in_library("aptitude-easy-3", false).unwrap();
    let archived = catalog(&store).archive(&created.id, "admin-1", at(1, 21)).unwrap();
    assert_eq!(archived.status, DefinitionStatus::Archived);
}

#[test]
fn referenced_definitions_accept_status_edits_only() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();
    ScheduleManager::new(&store, &store, &store, &store, Generator::default())
        .schedule(
            &created.id,
            &InstitutionRef::new("inst", "Inst"),
            ScheduleRequest::on(at(3, 1)),
            at(2, 10),
        )
        .unwrap();

    let err = catalog(&store)
        .edit(
            &created.id,
            "admin-1",
            DefinitionEdit {
                category_targets: Some(CategoryTargets::new(20, 30, 50)),
                ..DefinitionEdit::default()
            },
            at(2, 11),
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::Immutable(_)));

    let archived = catalog(&store).archive(&created.id, "admin-1", at(2, 12)).unwrap();
    assert_eq!(archived.status, DefinitionStatus::Archived);
    assert_eq!(archived.category_targets, created.category_targets);
}

#[test]
fn definitions_are_scoped_to_their_author() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();

    assert!(matches!(
        catalog(&store).get(&created.id, "admin-2"),
        Err(CatalogError::NotFound(_))
    ));
    assert!(matches!(
        catalog(&store).archive(&created.id, "admin-2", at(1, 16)),
        Err(CatalogError::NotFound(_))
    ));
}

#[test]
fn list_hides_expired_unless_asked() {
    let store = stocked_store();
    let cat = catalog(&store);
    let current = cat.create(draft("current"), "admin-1", "alice", at(1, 10)).unwrap();
    let mut old = draft("old");
    old.available_from = at(1, 1);
    old.available_to = at(1, 31);
    let old = cat.create(old, "admin-1", "alice", at(1, 1)).unwrap();
    cat.create(draft("other admin"), "admin-2", "bob", at(1, 12)).unwrap();

    let today = at(2, 15);
    let names: Vec<String> = cat
        .list("admin-1", &DefinitionQuery::default(), today)
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["current"]);

    let all: Vec<String> = cat
        .list(
            "admin-1",
            &DefinitionQuery {
                include_expired: true,
                ..DefinitionQuery::default()
            },
            today,
        )
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(all, vec![current.id.clone(), old.id]);

    cat.archive(&current.id, "admin-1", today).unwrap();
    let archived = cat
        .list(
            "admin-1",
            &DefinitionQuery {
                status: Some(DefinitionStatus::Archived),
                include_expired: true,
            },
            today,
        )
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, current.id);
}

#[test]
fn stats_count_live_schedules() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();
    let manager = ScheduleManager::new(&store, &store, &store, &store, Generator::default());
    let now = at(2, 10);

    let a = manager
        .schedule(
            &created.id,
            &InstitutionRef::new("inst-a", "A"),
            ScheduleRequest::on(at(3, 1)).student("s1").student("s2"),
            now,
        )
        .unwrap();
    let b = manager
        .schedule(
            &created.id,
            &InstitutionRef::new("inst-b", "B"),
            ScheduleRequest::on(at(3, 5)).student("t1"),
            now,
        )
        .unwrap();
    manager.cancel(&b.id, "inst-b", now).unwrap();

    store.start_attempt(&a.id, "s1", now).unwrap();
    store.complete_attempt(&a.id, "s1", now + Duration::minutes(40)).unwrap();
    store.start_attempt(&a.id, "s2", now).unwrap();

    let stats = catalog(&store).stats(&created.id, "admin-1", &store).unwrap();
    assert_eq!(stats.total_institutions_scheduled, 1);
    assert_eq!(stats.total_students_assigned, 2);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.schedules.len(), 2);
    assert_eq!(stats.schedules[0].institution_name, "B");
    assert_eq!(stats.schedules[1].completed, 1);
}

#[test]
fn plan_reports_the_allocation() {
    let store = stocked_store();
    let created = catalog(&store)
        .create(draft("FRI"), "admin-1", "alice", at(1, 15))
        .unwrap();

    let plan = catalog(&store).plan(&created.id, "admin-1").unwrap();
    assert_eq!(plan.total(), 10);
    assert_eq!(plan.count(Category::Aptitude, Difficulty::Easy), 2);
    assert_eq!(plan.count(Category::Technical, Difficulty::Hard), 1);
    assert_eq!(plan.count(Category::Psychometric, Difficulty::Hard), 0);
}
