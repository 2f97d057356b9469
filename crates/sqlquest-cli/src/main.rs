use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlquest_core::{compare_values, ExerciseKey, Row};
use sqlquest_engine::{AnswerSubmission, ProgressionEngine, Verdict};
use sqlquest_storage::{MemoryStore, ProgressionStore, SqliteStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_config, resolve_log_level, CliConfig, DEFAULT_CONFIG_FILE, LOG_LEVEL_ENV};

#[derive(Parser)]
#[command(name = "sqlquest")]
#[command(about = "Streaks, missions, quests and XP for SQL practice", long_about = None)]
struct Cli {
    /// Config file (defaults to ./sqlquest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the `database` setting
    #[arg(long, global = true)]
    database: Option<String>,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    /// Evaluate as of this RFC3339 instant instead of the current time
    #[arg(long, global = true)]
    at: Option<DateTime<Utc>>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a login and update the streak
    Login { user: String },
    /// Show the day's missions, generating them on first request
    Missions {
        user: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Clear the next mission slot if it matches the exercise (LEVEL-QUESTION)
    CompleteMission {
        user: String,
        exercise: ExerciseKey,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Submit an answer, graded from a rows file or reported directly
    Submit {
        user: String,
        exercise: ExerciseKey,
        #[arg(long, default_value_t = 0)]
        hints: u32,
        /// JSON file with `actual` and `expected` row arrays
        #[arg(long, conflicts_with = "correct")]
        rows: Option<PathBuf>,
        /// Correctness decided elsewhere
        #[arg(long)]
        correct: Option<bool>,
    },
    /// Compare two result sets without touching any progress
    Grade {
        /// JSON file with `actual` and `expected` row arrays
        rows: PathBuf,
    },
    /// Show the weekly quest
    Quest {
        user: String,
        /// Any date inside the week
        #[arg(long)]
        week_of: Option<NaiveDate>,
    },
    /// Count one mission toward this week's quest directly
    CompleteQuest { user: String },
    /// Show the active recovery ticket, if any
    Recovery { user: String },
    /// Count one mission toward the active recovery ticket
    AdvanceRecovery { user: String },
    /// Show XP, level, streak and shields
    Profile { user: String },
    /// List every progress record
    Progress { user: String },
}

#[derive(Debug, Deserialize)]
struct RowsFile<T> {
    actual: T,
    expected: T,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = load_config(&config_path, cli.config.is_some())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    init_logging(cli.debug, &config);
    debug!(event = "config_loaded", path = %config_path.display(), database = %config.database);

    run(cli, &config)
}

fn init_logging(debug: bool, config: &CliConfig) {
    let level = resolve_log_level(debug, std::env::var(LOG_LEVEL_ENV).ok(), config);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialised");
    }
}

fn build_engine(config: &CliConfig) -> Result<ProgressionEngine> {
    let store: Arc<dyn ProgressionStore> = if config.uses_memory_store() {
        Arc::new(MemoryStore::new())
    } else {
        let store = SqliteStore::open(&config.database)
            .with_context(|| format!("Failed to open database {}", config.database))?;
        Arc::new(store)
    };
    Ok(ProgressionEngine::new(
        store,
        Arc::new(config.catalog),
        config.engine.clone(),
    ))
}

fn run(cli: Cli, config: &CliConfig) -> Result<()> {
    let now = cli.at.unwrap_or_else(Utc::now);
    let today = now.date_naive();

    if let Commands::Grade { rows } = &cli.command {
        let file: RowsFile<Value> = read_json(rows)?;
        let report = compare_values(&file.actual, &file.expected)?;
        return print_json(&report);
    }

    let engine = build_engine(config)?;
    match cli.command {
        Commands::Login { user } => print_json(&engine.process_login(&user, now)?),
        Commands::Missions { user, date } => print_json(&engine.get_or_create_missions(
            &user,
            date.unwrap_or(today),
            now,
        )?),
        Commands::CompleteMission {
            user,
            exercise,
            date,
        } => print_json(&engine.complete_mission(
            &user,
            date.unwrap_or(today),
            exercise,
            now,
        )?),
        Commands::Submit {
            user,
            exercise,
            hints,
            rows,
            correct,
        } => {
            let verdict = match (rows, correct) {
                (Some(path), _) => {
                    let file: RowsFile<Vec<Row>> = read_json(&path)?;
                    Verdict::Graded {
                        actual: file.actual,
                        expected: file.expected,
                    }
                }
                (None, Some(correct)) => Verdict::Reported { correct },
                (None, None) => bail!("submit needs either --rows <file> or --correct <bool>"),
            };
            let submission = AnswerSubmission {
                exercise,
                hints_used: hints,
                verdict,
            };
            print_json(&engine.submit_answer(&user, &submission, now)?)
        }
        Commands::Quest { user, week_of } => {
            print_json(&engine.get_or_create_quest(&user, week_of.unwrap_or(today), now)?)
        }
        Commands::CompleteQuest { user } => print_json(&engine.complete_weekly_quest(&user, now)?),
        Commands::Recovery { user } => print_json(&engine.get_active_recovery(&user, now)?),
        Commands::AdvanceRecovery { user } => print_json(&engine.advance_recovery(&user, now)?),
        Commands::Profile { user } => print_json(&engine.learner(&user)?),
        Commands::Progress { user } => print_json(&engine.progress_for(&user)?),
        Commands::Grade { .. } => Ok(()),
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}
