//! Subcommand handlers. Each returns the JSON document printed on stdout.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use fritest_core::{
    Category, DefinitionStatus, Difficulty, InstitutionRef, QuestionRef, ScheduleStatus,
};
use fritest_engine::{
    DefinitionCatalog, DefinitionDraft, DefinitionEdit, DefinitionQuery, EngineConfig, Generator,
    ProgressTracker, ScheduleManager, ScheduleRequest, ScheduleUpdate,
};
use fritest_store::SqliteStore;

/// Settings resolved from flags and the config file
pub struct Context {
    pub database: PathBuf,
    pub engine: EngineConfig,
    pub now: DateTime<Utc>,
}

impl Context {
    fn open(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.database)
            .with_context(|| format!("Failed to open database {}", self.database.display()))
    }

    fn generator(&self) -> Generator {
        Generator::new(self.engine.clone())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn catalog<'a>(store: &'a SqliteStore, ctx: &Context) -> DefinitionCatalog<'a> {
    DefinitionCatalog::new(store, store, store, ctx.generator())
}

fn manager<'a>(store: &'a SqliteStore, ctx: &Context) -> ScheduleManager<'a> {
    ScheduleManager::new(store, store, store, store, ctx.generator())
}

pub fn init(ctx: &Context) -> Result<Value> {
    ctx.open()?;
    info!(database = %ctx.database.display(), "initialized database");
    Ok(json!({ "database": ctx.database }))
}

pub fn question_add(
    ctx: &Context,
    id: &str,
    category: Category,
    difficulty: Difficulty,
    in_library: bool,
) -> Result<Value> {
    let question = QuestionRef::new(id, category, difficulty);
    ctx.open()?.add_question(&question, in_library)?;
    Ok(json!({ "question": question, "in_library": in_library }))
}

pub fn batch_add(ctx: &Context, institution: &str, batch: &str, students: &[String]) -> Result<Value> {
    let store = ctx.open()?;
    for student in students {
        store.add_batch_member(institution, batch, student)?;
    }
    Ok(json!({ "institution": institution, "batch": batch, "added": students }))
}

pub fn definition_create(ctx: &Context, file: &Path, admin: &str, admin_name: &str) -> Result<Value> {
    let draft: DefinitionDraft = read_json(file)?;
    let store = ctx.open()?;
    let definition = catalog(&store, ctx)
        .create(draft, admin, admin_name, ctx.now)
        .context("Failed to create test definition")?;
    Ok(serde_json::to_value(definition)?)
}

pub fn definition_edit(ctx: &Context, id: &str, file: &Path, admin: &str) -> Result<Value> {
    let edit: DefinitionEdit = read_json(file)?;
    let store = ctx.open()?;
    let definition = catalog(&store, ctx).edit(id, admin, edit, ctx.now)?;
    Ok(serde_json::to_value(definition)?)
}

pub fn definition_list(
    ctx: &Context,
    admin: &str,
    status: Option<DefinitionStatus>,
    include_expired: bool,
) -> Result<Value> {
    let store = ctx.open()?;
    let query = DefinitionQuery {
        status,
        include_expired,
    };
    let definitions = catalog(&store, ctx).list(admin, &query, ctx.now)?;
    Ok(json!({ "definitions": definitions }))
}

pub fn definition_show(ctx: &Context, id: &str, admin: &str) -> Result<Value> {
    let store = ctx.open()?;
    Ok(serde_json::to_value(catalog(&store, ctx).get(id, admin)?)?)
}

pub fn definition_archive(ctx: &Context, id: &str, admin: &str) -> Result<Value> {
    let store = ctx.open()?;
    Ok(serde_json::to_value(catalog(&store, ctx).archive(id, admin, ctx.now)?)?)
}

pub fn definition_stats(ctx: &Context, id: &str, admin: &str) -> Result<Value> {
    let store = ctx.open()?;
    Ok(serde_json::to_value(catalog(&store, ctx).stats(id, admin, &store)?)?)
}

pub fn definition_plan(ctx: &Context, id: &str, admin: &str) -> Result<Value> {
    let store = ctx.open()?;
    let plan = catalog(&store, ctx).plan(id, admin)?;
    Ok(json!({
        "definition": id,
        "policy": plan.policy,
        "requested": plan.requested,
        "total": plan.total(),
        "drift": plan.drift,
        "cells": plan.non_empty().map(|cell| json!({
            "category": cell.category,
            "difficulty": cell.difficulty,
            "count": cell.count,
        })).collect::<Vec<_>>(),
    }))
}

pub fn schedule_available(ctx: &Context, institution: &str) -> Result<Value> {
    let store = ctx.open()?;
    let available = manager(&store, ctx).available_definitions(institution, ctx.now)?;
    Ok(json!({ "definitions": available }))
}

pub fn schedule_detail(ctx: &Context, definition: &str, institution: &str) -> Result<Value> {
    let store = ctx.open()?;
    let mut detail = manager(&store, ctx).definition_detail(definition, institution, ctx.now)?;
    if let Some(schedule) = detail.schedule.as_mut() {
        ProgressTracker::new(&store).refresh(schedule)?;
    }
    Ok(serde_json::to_value(detail)?)
}

pub fn schedule_create(
    ctx: &Context,
    definition: &str,
    institution: &str,
    institution_name: &str,
    request: ScheduleRequest,
) -> Result<Value> {
    let store = ctx.open()?;
    let schedule = manager(&store, ctx)
        .schedule(
            definition,
            &InstitutionRef::new(institution, institution_name),
            request,
            ctx.now,
        )
        .with_context(|| format!("Failed to schedule {definition} for {institution}"))?;
    Ok(serde_json::to_value(schedule)?)
}

pub fn schedule_update(
    ctx: &Context,
    id: &str,
    institution: &str,
    update: ScheduleUpdate,
) -> Result<Value> {
    let store = ctx.open()?;
    let mut schedule = manager(&store, ctx).update(id, institution, update, ctx.now)?;
    ProgressTracker::new(&store).refresh(&mut schedule)?;
    Ok(serde_json::to_value(schedule)?)
}

pub fn schedule_cancel(ctx: &Context, id: &str, institution: &str) -> Result<Value> {
    let store = ctx.open()?;
    let mut schedule = manager(&store, ctx).cancel(id, institution, ctx.now)?;
    ProgressTracker::new(&store).refresh(&mut schedule)?;
    Ok(serde_json::to_value(schedule)?)
}

pub fn schedule_list(
    ctx: &Context,
    institution: &str,
    status: Option<ScheduleStatus>,
) -> Result<Value> {
    let store = ctx.open()?;
    let mut schedules = manager(&store, ctx).list(institution, status)?;
    let tracker = ProgressTracker::new(&store);
    for schedule in &mut schedules {
        tracker.refresh(schedule)?;
    }
    Ok(json!({ "schedules": schedules }))
}

pub fn schedule_show(ctx: &Context, id: &str, institution: &str) -> Result<Value> {
    let store = ctx.open()?;
    let mut schedule = manager(&store, ctx).get(id, institution)?;
    ProgressTracker::new(&store).refresh(&mut schedule)?;
    Ok(serde_json::to_value(schedule)?)
}

pub fn attempt_start(ctx: &Context, schedule: &str, student: &str) -> Result<Value> {
    ctx.open()?.start_attempt(schedule, student, ctx.now)?;
    Ok(json!({ "schedule": schedule, "student": student, "started_at": ctx.now }))
}

pub fn attempt_complete(ctx: &Context, schedule: &str, student: &str) -> Result<Value> {
    ctx.open()?.complete_attempt(schedule, student, ctx.now)?;
    Ok(json!({ "schedule": schedule, "student": student, "completed_at": ctx.now }))
}

pub fn progress(ctx: &Context, schedule: &str, institution: &str) -> Result<Value> {
    let store = ctx.open()?;
    let schedule = manager(&store, ctx).get(schedule, institution)?;
    let summary = ProgressTracker::new(&store).summarize(&schedule)?;
    Ok(json!({
        "summary": summary,
        "completion_percent": summary.completion_percent(),
    }))
}
