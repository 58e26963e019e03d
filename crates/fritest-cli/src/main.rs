//! fritest CLI - Foundation Readiness Test scheduling
//!
//! Operator tool over a local SQLite database: seed the question bank and
//! batches, manage test definitions, schedule them for institutions, record
//! attempts and report progress. Every command prints JSON on stdout; logs go
//! to stderr.

mod commands;
mod config;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fritest_core::{Category, DefinitionStatus, Difficulty, ScheduleStatus};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "fritest")]
#[command(author, version, about = "Foundation Readiness Test scheduling engine", long_about = None)]
struct Cli {
    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to ./fritest.toml when present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, value_name = "PATH", env = "FRITEST_DB", global = true)]
    database: Option<PathBuf>,

    /// Evaluate availability at this instant instead of the current time
    #[arg(long, value_name = "RFC3339", global = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init,

    /// Seed the question bank
    #[command(subcommand)]
    Question(QuestionCommand),

    /// Seed institution batches
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Manage test definitions (admin)
    #[command(subcommand)]
    Definition(DefinitionCommand),

    /// Schedule tests for an institution
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Record student attempts
    #[command(subcommand)]
    Attempt(AttemptCommand),

    /// Per-student completion for a schedule
    Progress {
        #[arg(value_name = "SCHEDULE")]
        schedule: String,

        #[arg(long)]
        institution: String,
    },
}

#[derive(Subcommand)]
enum QuestionCommand {
    /// Add or replace a question reference
    Add {
        #[arg(long)]
        id: String,

        /// aptitude, technical or psychometric
        #[arg(long)]
        category: Category,

        /// easy, medium or hard
        #[arg(long)]
        difficulty: Difficulty,

        /// Keep the question out of generation
        #[arg(long)]
        not_in_library: bool,
    },
}

#[derive(Subcommand)]
enum BatchCommand {
    /// Add students to a batch
    Add {
        #[arg(long)]
        institution: String,

        #[arg(long)]
        batch: String,

        #[arg(value_name = "STUDENT", required = true)]
        students: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DefinitionCommand {
    /// Create a definition from a JSON body
    Create {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        admin: String,

        /// Display name of the admin (defaults to the id)
        #[arg(long)]
        admin_name: Option<String>,
    },

    /// Apply a partial JSON edit
    Edit {
        id: String,

        #[arg(long, value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        admin: String,
    },

    /// List the admin's definitions
    List {
        #[arg(long)]
        admin: String,

        #[arg(long)]
        status: Option<DefinitionStatus>,

        /// Include definitions whose window has closed
        #[arg(long)]
        include_expired: bool,
    },

    /// Show one definition
    Show {
        id: String,

        #[arg(long)]
        admin: String,
    },

    /// Archive (soft delete) a definition
    Archive {
        id: String,

        #[arg(long)]
        admin: String,
    },

    /// Per-institution uptake of a definition
    Stats {
        id: String,

        #[arg(long)]
        admin: String,
    },

    /// Allocation plan and question supply check
    Plan {
        id: String,

        #[arg(long)]
        admin: String,
    },
}

#[derive(Subcommand)]
enum ScheduleCommand {
    /// Definitions the institution can schedule now
    Available {
        #[arg(long)]
        institution: String,
    },

    /// Definition detail with the institution's schedule, if any
    Detail {
        definition: String,

        #[arg(long)]
        institution: String,
    },

    /// Schedule a definition and freeze its question list
    Create {
        definition: String,

        #[arg(long)]
        institution: String,

        #[arg(long)]
        institution_name: Option<String>,

        #[arg(long, value_name = "RFC3339")]
        date: DateTime<Utc>,

        #[arg(long, value_name = "RFC3339")]
        end: Option<DateTime<Utc>>,

        #[arg(long)]
        faculty: Option<String>,

        #[arg(long = "student", value_name = "STUDENT")]
        students: Vec<String>,

        #[arg(long = "batch", value_name = "BATCH")]
        batches: Vec<String>,

        #[arg(long)]
        instructions: Option<String>,
    },

    /// Edit dates, faculty, roster, instructions or status
    Update {
        id: String,

        #[arg(long)]
        institution: String,

        #[arg(long, value_name = "RFC3339")]
        date: Option<DateTime<Utc>>,

        #[arg(long, value_name = "RFC3339", conflicts_with = "clear_end")]
        end: Option<DateTime<Utc>>,

        /// Remove the end date
        #[arg(long)]
        clear_end: bool,

        #[arg(long, conflicts_with = "clear_faculty")]
        faculty: Option<String>,

        #[arg(long)]
        clear_faculty: bool,

        /// Replace the explicit students
        #[arg(long = "student", value_name = "STUDENT")]
        students: Option<Vec<String>>,

        /// Replace the batches
        #[arg(long = "batch", value_name = "BATCH")]
        batches: Option<Vec<String>>,

        #[arg(long, conflicts_with = "clear_instructions")]
        instructions: Option<String>,

        #[arg(long)]
        clear_instructions: bool,

        #[arg(long)]
        status: Option<ScheduleStatus>,
    },

    /// Cancel a schedule
    Cancel {
        id: String,

        #[arg(long)]
        institution: String,
    },

    /// The institution's schedules, latest first
    List {
        #[arg(long)]
        institution: String,

        #[arg(long)]
        status: Option<ScheduleStatus>,
    },

    /// One schedule with its frozen question list
    Show {
        id: String,

        #[arg(long)]
        institution: String,
    },
}

#[derive(Subcommand)]
enum AttemptCommand {
    /// A student opened the test
    Start { schedule: String, student: String },

    /// A student submitted the test
    Complete { schedule: String, student: String },
}

/// `Some(None)` when the clear flag is set
fn set_or_clear<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

/// `configured` has already been checked by `CliConfig::load`
fn init_tracing(verbose: u8, configured: Option<&str>) {
    let filter = match verbose {
        0 => configured
            .and_then(|f| EnvFilter::try_new(f).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_tracing(cli.verbose, config.log_filter.as_deref());

    let ctx = commands::Context {
        database: config.database_path(cli.database.as_deref()),
        engine: config.engine,
        now: cli.now.unwrap_or_else(Utc::now),
    };

    let output = match cli.command {
        Commands::Init => commands::init(&ctx)?,
        Commands::Question(cmd) => match cmd {
            QuestionCommand::Add {
                id,
                category,
                difficulty,
                not_in_library,
            } => commands::question_add(&ctx, &id, category, difficulty, !not_in_library)?,
        },
        Commands::Batch(BatchCommand::Add {
            institution,
            batch,
            students,
        }) => commands::batch_add(&ctx, &institution, &batch, &students)?,
        Commands::Definition(cmd) => match cmd {
            DefinitionCommand::Create {
                file,
                admin,
                admin_name,
            } => {
                let name = admin_name.unwrap_or_else(|| admin.clone());
                commands::definition_create(&ctx, &file, &admin, &name)?
            }
            DefinitionCommand::Edit { id, file, admin } => {
                commands::definition_edit(&ctx, &id, &file, &admin)?
            }
            DefinitionCommand::List {
                admin,
                status,
                include_expired,
            } => commands::definition_list(&ctx, &admin, status, include_expired)?,
            DefinitionCommand::Show { id, admin } => commands::definition_show(&ctx, &id, &admin)?,
            DefinitionCommand::Archive { id, admin } => {
                commands::definition_archive(&ctx, &id, &admin)?
            }
            DefinitionCommand::Stats { id, admin } => {
                commands::definition_stats(&ctx, &id, &admin)?
            }
            DefinitionCommand::Plan { id, admin } => commands::definition_plan(&ctx, &id, &admin)?,
        },
        Commands::Schedule(cmd) => match cmd {
            ScheduleCommand::Available { institution } => {
                commands::schedule_available(&ctx, &institution)?
            }
            ScheduleCommand::Detail {
                definition,
                institution,
            } => commands::schedule_detail(&ctx, &definition, &institution)?,
            ScheduleCommand::Create {
                definition,
                institution,
                institution_name,
                date,
                end,
                faculty,
                students,
                batches,
                instructions,
            } => {
                let mut request = fritest_engine::ScheduleRequest::on(date);
                request.scheduled_end_date = end;
                request.assigned_faculty = faculty;
                request.assigned_students = students;
                request.assigned_batches = batches;
                request.instructions = instructions;
                let name = institution_name.unwrap_or_else(|| institution.clone());
                commands::schedule_create(&ctx, &definition, &institution, &name, request)?
            }
            ScheduleCommand::Update {
                id,
                institution,
                date,
                end,
                clear_end,
                faculty,
                clear_faculty,
                students,
                batches,
                instructions,
                clear_instructions,
                status,
            } => {
                let update = fritest_engine::ScheduleUpdate {
                    scheduled_date: date,
                    scheduled_end_date: set_or_clear(end, clear_end),
                    assigned_faculty: set_or_clear(faculty, clear_faculty),
                    assigned_students: students,
                    assigned_batches: batches,
                    instructions: set_or_clear(instructions, clear_instructions),
                    status,
                };
                commands::schedule_update(&ctx, &id, &institution, update)?
            }
            ScheduleCommand::Cancel { id, institution } => {
                commands::schedule_cancel(&ctx, &id, &institution)?
            }
            ScheduleCommand::List {
                institution,
                status,
            } => commands::schedule_list(&ctx, &institution, status)?,
            ScheduleCommand::Show { id, institution } => {
                commands::schedule_show(&ctx, &id, &institution)?
            }
        },
        Commands::Attempt(cmd) => match cmd {
            AttemptCommand::Start { schedule, student } => {
                commands::attempt_start(&ctx, &schedule, &student)?
            }
            AttemptCommand::Complete { schedule, student } => {
                commands::attempt_complete(&ctx, &schedule, &student)?
            }
        },
        Commands::Progress {
            schedule,
            institution,
        } => commands::progress(&ctx, &schedule, &institution)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
