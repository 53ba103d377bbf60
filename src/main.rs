mod completion;
mod config;
mod db;
mod error;
mod gating;
mod local_store;
mod models;
mod progression;
mod tracker;
mod tui;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use completion::CompletionOutcome;
use config::Config;
use db::Database;
use error::ProgressError;
use local_store::LocalStore;
use models::{JsonOutput, SubjectKind, SubjectStatus};
use tracker::{import_local_progress, select_store, Tracker};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "nrghax")]
#[command(about = "Track hacks, routines and levels with prerequisite gating and completion tiers")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this signed-in user (defaults to NRGHAX_USER, else anonymous)
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage hacks
    #[command(subcommand)]
    Hack(SubjectCommands),

    /// Manage routines
    #[command(subcommand)]
    Routine(SubjectCommands),

    /// Manage levels
    #[command(subcommand)]
    Level(SubjectCommands),

    /// Mark a hack, routine or level as completed
    Complete {
        /// hack, routine or level
        kind: String,

        /// Subject ID
        id: i64,
    },

    /// Show lock state, tier and cooldown for every subject
    Status {
        /// Only one kind
        #[arg(long, short)]
        kind: Option<String>,
    },

    /// Suggest something to do next (stochastic, favours less practiced)
    Next {
        /// Only one kind
        #[arg(long, short)]
        kind: Option<String>,
    },

    /// Per-user checklists attached to a subject
    #[command(subcommand)]
    Checklist(ChecklistCommands),

    /// Show progression statistics
    Stats,

    /// Report prerequisite cycles and dangling edges
    Doctor,

    /// Copy this device's anonymous progress into the signed-in account
    Sync,

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Subcommand)]
enum SubjectCommands {
    /// List all entries of this kind
    List,

    /// Add a new entry
    Add {
        /// Display name
        name: String,

        /// Description
        #[arg(long, short)]
        description: Option<String>,

        /// Level this hack belongs to
        #[arg(long, short)]
        level: Option<i64>,
    },

    /// Show details, prerequisites and progress
    Show {
        /// Subject ID
        id: i64,
    },

    /// Delete an entry
    Delete {
        /// Subject ID
        id: i64,
    },

    /// Require another entry of the same kind before this one unlocks
    Require {
        /// Subject ID
        id: i64,

        /// Prerequisite ID
        required: i64,
    },

    /// Drop a prerequisite
    Unrequire {
        /// Subject ID
        id: i64,

        /// Prerequisite ID
        required: i64,
    },
}

#[derive(Subcommand)]
enum ChecklistCommands {
    /// Append an item to a subject's checklist
    Add {
        /// Subject ID
        subject_id: i64,

        /// Item title
        title: String,
    },

    /// Show a subject's checklist
    Show {
        /// Subject ID
        subject_id: i64,
    },

    /// Tick an item
    Check {
        /// Checklist item ID
        item_id: i64,
    },

    /// Untick an item
    Uncheck {
        /// Checklist item ID
        item_id: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    // The TUI owns the terminal, so it stays quiet unless RUST_LOG asks otherwise
    let default_level = match &cli.command {
        Commands::Tui => LevelFilter::OFF,
        _ => LevelFilter::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(data: T) -> CliResult<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn parse_kind(s: &str) -> Result<SubjectKind, ProgressError> {
    SubjectKind::from_str(s).ok_or_else(|| ProgressError::InvalidKind(s.to_string()))
}

fn parse_kind_filter(s: Option<&str>) -> Result<Option<SubjectKind>, ProgressError> {
    s.map(parse_kind).transpose()
}

fn run(cli: Cli) -> CliResult<()> {
    let config = Config::resolve(cli.user);
    let db = Database::open(&config.db_path)?;
    db.init()?;
    let local = LocalStore::new(&config.local_store_dir);
    let tracker = Tracker::new(
        &db,
        select_store(&config.actor, &db, &local),
        config.actor.clone(),
    );
    let now = Utc::now();
    tracing::debug!(db = %config.db_path.display(), actor = %config.actor, "starting");

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(serde_json::json!({
                    "db_path": config.db_path,
                    "local_store": local.path(),
                }))?;
            } else {
                println!("Database initialized at: {}", config.db_path.display());
                println!("Anonymous progress lives at: {}", local.path().display());
            }
        }

        Commands::Hack(cmd) => run_subject(&db, &tracker, SubjectKind::Hack, cmd, cli.json)?,
        Commands::Routine(cmd) => run_subject(&db, &tracker, SubjectKind::Routine, cmd, cli.json)?,
        Commands::Level(cmd) => run_subject(&db, &tracker, SubjectKind::Level, cmd, cli.json)?,

        Commands::Complete { kind, id } => {
            let kind = parse_kind(&kind)?;
            let subject = db.expect_kind(id, kind)?;
            let outcome = tracker.complete(id, now)?;
            if cli.json {
                print_json(outcome)?;
            } else {
                match outcome {
                    CompletionOutcome::Recorded { count, first: true } => {
                        println!("Completed '{}' for the first time ({}x).", subject.name, count)
                    }
                    CompletionOutcome::Recorded { count, .. } => {
                        println!("Completed '{}' ({}x).", subject.name, count)
                    }
                    CompletionOutcome::CoolingDown { remaining_minutes } => println!(
                        "'{}' was completed recently. Try again in {} min.",
                        subject.name, remaining_minutes
                    ),
                }
            }
        }

        Commands::Status { kind } => {
            let kinds = match parse_kind_filter(kind.as_deref())? {
                Some(k) => vec![k],
                None => SubjectKind::ALL.to_vec(),
            };
            let mut statuses = Vec::new();
            for k in kinds {
                statuses.extend(tracker.statuses(k, now)?);
            }
            if cli.json {
                print_json(&statuses)?;
            } else if statuses.is_empty() {
                println!("Nothing to show yet.");
            } else {
                print_status_table(&statuses);
            }
        }

        Commands::Next { kind } => {
            let kind = parse_kind_filter(kind.as_deref())?;
            let pick = tracker.suggest_next(kind, now, &mut rand::thread_rng())?;
            if cli.json {
                print_json(&pick)?;
            } else if let Some(status) = pick {
                println!("=== Up Next ===");
                println!();
                println!(
                    "{}: {} (ID: {})",
                    status.subject.kind.label(),
                    status.subject.name,
                    status.subject.id
                );
                if let Some(desc) = &status.subject.description {
                    println!("Description: {}", desc);
                }
                println!("Tier: {}", status.tier.label());
                if status.completion_count > 0 {
                    println!("Completed: {}", status.formatted_count);
                }
                println!();
                println!("When you're done, record it with:");
                println!("  nrghax complete {} {}", status.subject.kind, status.subject.id);
            } else {
                println!("Nothing is ready right now. Everything is locked or cooling down.");
            }
        }

        Commands::Checklist(cmd) => run_checklist(&db, &tracker, cmd, now, cli.json)?,

        Commands::Stats => {
            let stats = tracker.stats(now)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== Progress for {} ===", tracker.actor());
                println!("Total subjects: {}", stats.total_subjects);
                println!("Unlocked: {}", stats.unlocked);
                println!("Locked: {}", stats.locked);
                println!("Started: {}", stats.started);
                println!("Ready now: {}", stats.ready_now);
                println!("Total completions: {}", stats.total_completions);
                if !config.actor.is_anonymous() {
                    println!("Completion log entries: {}", db.total_completions(&config.actor)?);
                }
                println!();
                for (tier, count) in &stats.by_tier {
                    println!("  {:<8} {}", tier.label(), count);
                }
            }
        }

        Commands::Doctor => {
            let reports = tracker.diagnose()?;
            if cli.json {
                print_json(&reports)?;
            } else {
                for report in &reports {
                    if report.is_clean() {
                        println!("{}: {} edges, ok", report.kind.section(), report.edges);
                        continue;
                    }
                    println!("{}: {} edges", report.kind.section(), report.edges);
                    for edge in &report.dangling {
                        println!(
                            "  dangling: {} requires missing {}",
                            edge.subject_id, edge.required_id
                        );
                    }
                    for cycle in &report.cycles {
                        let ids: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
                        println!("  cycle: {} (never unlockable)", ids.join(" <-> "));
                    }
                }
            }
        }

        Commands::Sync => {
            let merged = import_local_progress(&db, &local, &config.actor)?;
            if cli.json {
                print_json(serde_json::json!({ "merged": merged }))?;
            } else {
                println!(
                    "Merged {} local record(s) into {}.",
                    merged, config.actor
                );
            }
        }

        Commands::Tui => {
            tui::run(&db, &local, config.actor)?;
        }
    }

    Ok(())
}

fn run_subject(
    db: &Database,
    tracker: &Tracker,
    kind: SubjectKind,
    cmd: SubjectCommands,
    json: bool,
) -> CliResult<()> {
    let now = Utc::now();
    match cmd {
        SubjectCommands::List => {
            let statuses = tracker.statuses(kind, now)?;
            if json {
                print_json(&statuses)?;
            } else if statuses.is_empty() {
                println!("No {} found.", kind.section());
            } else {
                print_status_table(&statuses);
            }
        }

        SubjectCommands::Add {
            name,
            description,
            level,
        } => {
            if level.is_some() && kind != SubjectKind::Hack {
                return Err(format!("Only hacks can belong to a level, not {}s", kind).into());
            }
            let id = db.add_subject(kind, &name, description.as_deref(), level)?;
            if json {
                print_json(serde_json::json!({ "id": id, "kind": kind, "name": name }))?;
            } else {
                println!("Added {} '{}' with ID: {}", kind, name, id);
            }
        }

        SubjectCommands::Show { id } => {
            db.expect_kind(id, kind)?;
            let status = tracker.status(id, now)?;
            let graph = tracker.graph(kind)?;
            let prerequisites = graph.prerequisites_of(id);
            let dependents = graph.dependents_of(id);
            let level = match kind {
                SubjectKind::Level => Some(tracker.level_progress(id)?),
                _ => None,
            };
            let checklist = match tracker.actor().user_id() {
                Some(_) => Some(tracker.checklist(id)?),
                None => None,
            };

            if json {
                print_json(serde_json::json!({
                    "status": status,
                    "prerequisites": prerequisites,
                    "dependents": dependents,
                    "level_progress": level,
                    "checklist": checklist,
                }))?;
                return Ok(());
            }

            let subject = &status.subject;
            println!("{}: {}", kind.label(), subject.name);
            println!("ID: {}", subject.id);
            if let Some(desc) = &subject.description {
                println!("Description: {}", desc);
            }
            if let Some(level_id) = subject.level_id {
                println!("Level: {}", level_id);
            }
            println!("Created: {}", subject.created_at);
            println!();
            println!("--- Progress ---");
            println!("Tier: {}", status.tier.label());
            if status.locked {
                println!("Locked until you complete:");
                for missing in &status.missing_prerequisites {
                    println!("  - {}", describe(db, *missing)?);
                }
            } else {
                println!("Completed: {}", status.completion_count);
                if let Some(last) = status.last_completed_at {
                    println!("Last completed: {}", last.format("%Y-%m-%d %H:%M UTC"));
                }
                if status.cooldown_remaining > 0 {
                    println!("Cooling down: {} min", status.cooldown_remaining);
                }
            }
            if !prerequisites.is_empty() {
                println!();
                println!("Requires:");
                for required in &prerequisites {
                    println!("  - {}", describe(db, *required)?);
                }
            }
            if !dependents.is_empty() {
                println!();
                println!("Unlocks:");
                for dependent in &dependents {
                    println!("  - {}", describe(db, *dependent)?);
                }
            }
            if let Some(progress) = level {
                println!();
                println!(
                    "Level progress: {}/{} hacks ({}%, {})",
                    progress.done,
                    progress.total,
                    progress.percentage,
                    progress.badge.as_str()
                );
            }
            if let Some(checklist) = checklist.filter(|c| !c.items.is_empty()) {
                println!();
                println!(
                    "Checklist: {}% ({})",
                    checklist.progress.percentage,
                    checklist.progress.badge.as_str()
                );
                for item in &checklist.items {
                    let mark = if item.checked { "x" } else { " " };
                    println!("  [{}] {} {}", mark, item.id, item.title);
                }
            }
        }

        SubjectCommands::Delete { id } => {
            db.expect_kind(id, kind)?;
            db.delete_subject(id)?;
            if json {
                print_json(())?;
            } else {
                println!("{} {} deleted.", kind.label(), id);
            }
        }

        SubjectCommands::Require { id, required } => {
            db.expect_kind(id, kind)?;
            let added = db.add_prerequisite(id, required)?;
            if json {
                print_json(serde_json::json!({ "added": added }))?;
            } else if added {
                println!("{} {} now requires {}.", kind.label(), id, required);
            } else {
                println!("{} {} already requires {}.", kind.label(), id, required);
            }
        }

        SubjectCommands::Unrequire { id, required } => {
            db.expect_kind(id, kind)?;
            let removed = db.remove_prerequisite(id, required)?;
            if json {
                print_json(serde_json::json!({ "removed": removed }))?;
            } else if removed {
                println!("{} {} no longer requires {}.", kind.label(), id, required);
            } else {
                println!("{} {} did not require {}.", kind.label(), id, required);
            }
        }
    }
    Ok(())
}

fn run_checklist(
    db: &Database,
    tracker: &Tracker,
    cmd: ChecklistCommands,
    now: chrono::DateTime<Utc>,
    json: bool,
) -> CliResult<()> {
    let progress = match cmd {
        ChecklistCommands::Add { subject_id, title } => {
            let id = db.add_checklist_item(subject_id, &title)?;
            if json {
                return print_json(serde_json::json!({ "id": id }));
            }
            println!("Added checklist item {} to subject {}.", id, subject_id);
            return Ok(());
        }
        ChecklistCommands::Show { subject_id } => tracker.checklist(subject_id)?,
        ChecklistCommands::Check { item_id } => tracker.set_checked(item_id, true, now)?,
        ChecklistCommands::Uncheck { item_id } => tracker.set_checked(item_id, false, now)?,
    };

    if json {
        print_json(&progress)?;
    } else if progress.items.is_empty() {
        println!("No checklist items.");
    } else {
        for item in &progress.items {
            let mark = if item.checked { "x" } else { " " };
            println!("[{}] {:<5} {}", mark, item.id, item.title);
        }
        println!(
            "{}/{} done ({}%, {})",
            progress.progress.done,
            progress.progress.total,
            progress.progress.percentage,
            progress.progress.badge.as_str()
        );
    }
    Ok(())
}

fn print_status_table(statuses: &[SubjectStatus]) {
    println!(
        "{:<5} {:<8} {:<36} {:<8} {:<6} STATE",
        "ID", "KIND", "NAME", "TIER", "COUNT"
    );
    println!("{}", "-".repeat(80));
    for status in statuses {
        println!(
            "{:<5} {:<8} {:<36} {:<8} {:<6} {}",
            status.subject.id,
            status.subject.kind.as_str(),
            truncate(&status.subject.name, 34),
            status.tier.as_str(),
            status.formatted_count,
            state_label(status)
        );
    }
}

fn state_label(status: &SubjectStatus) -> String {
    if status.locked {
        let ids: Vec<String> = status
            .missing_prerequisites
            .iter()
            .map(|id| id.to_string())
            .collect();
        format!("locked (needs {})", ids.join(", "))
    } else if status.cooldown_remaining > 0 {
        format!("cooling {}m", status.cooldown_remaining)
    } else {
        "ready".to_string()
    }
}

fn describe(db: &Database, id: i64) -> CliResult<String> {
    Ok(match db.get_subject(id)? {
        Some(subject) => format!("{} (ID: {})", subject.name, id),
        None => format!("missing subject {}", id),
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
