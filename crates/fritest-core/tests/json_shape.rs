//! JSON shape of the records persisted by the store and printed by the CLI

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use fritest_core::{
    Category, CategoryTargets, Difficulty, GeneratedQuestion, Schedule, ScheduleStatus,
    TestDefinition,
};

#[test]
fn definition_fields_are_snake_case_with_nested_targets() {
    let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let def = TestDefinition::new("fri", "FRI")
        .questions(20)
        .categories(CategoryTargets::new(40, 40, 20))
        .window(from, to)
        .target("inst-a");

    let value = serde_json::to_value(&def).unwrap();
    assert_eq!(value["total_questions"], 20);
    assert_eq!(
        value["category_targets"],
        json!({ "aptitude": 40, "technical": 40, "psychometric": 20 })
    );
    assert_eq!(
        value["difficulty_targets"],
        json!({ "easy": 33, "medium": 34, "hard": 33 })
    );
    assert_eq!(value["window"]["from"], "2026-02-01T00:00:00Z");
    assert_eq!(value["target_institutions"], json!(["inst-a"]));
    assert_eq!(value["status"], "active");

    let back: TestDefinition = serde_json::from_value(value).unwrap();
    assert_eq!(back, def);
}

#[test]
fn schedule_embeds_its_question_list() {
    let at = Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap();
    let schedule = Schedule {
        id: "s1".into(),
        definition_id: "fri".into(),
        institution_id: "inst-a".into(),
        institution_name: "Institute A".into(),
        scheduled_date: at,
        scheduled_end_date: None,
        assigned_faculty: Some("fac".into()),
        assigned_students: vec!["ana".into()],
        assigned_batches: vec![],
        roster: ["ana".to_string()].into_iter().collect(),
        generated_questions: vec![GeneratedQuestion {
            question_id: "q9".into(),
            category: Category::Psychometric,
            difficulty: Difficulty::Hard,
            order_index: 0,
        }],
        status: ScheduleStatus::Cancelled,
        instructions: None,
        total_assigned_students: 1,
        total_attempted: 0,
        total_completed: 0,
        created_at: at,
        updated_at: at,
    };

    let value = serde_json::to_value(&schedule).unwrap();
    assert_eq!(value["status"], "cancelled");
    assert_eq!(
        value["generated_questions"],
        json!([{
            "question_id": "q9",
            "category": "psychometric",
            "difficulty": "hard",
            "order_index": 0
        }])
    );
    assert_eq!(value["roster"], json!(["ana"]));
}
