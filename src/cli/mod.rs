//! Command-line interface for dispatch-triage.
//!
//! Provides commands for triaging a candidate incident, inspecting the
//! open queue, fetching archived incidents, resolving them, and seeding
//! a fresh deployment.

use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::domain::{CandidateIncident, Incident, IncidentId};
use crate::pipeline::{Triage, TriageError};

/// dispatch - 911-call triage core
#[derive(Parser, Debug)]
#[command(name = "dispatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Triage a candidate incident (JSON from file or stdin)
    Triage {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// List the open queue, most urgent first
    Queue {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show an archived incident by id
    Show {
        /// Incident id (26-char ULID)
        id: String,
    },

    /// Mark an incident completed and remove it from the open queue
    Resolve {
        /// Incident id (26-char ULID)
        id: String,
    },

    /// Bulk-load already-triaged incidents (JSON array) into the archive
    /// and similarity index
    Seed {
        /// Input file with a JSON array of full incident records
        input: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Triage { input } => triage(input).await,
            Commands::Queue { limit } => list_queue(limit).await,
            Commands::Show { id } => show(&id).await,
            Commands::Resolve { id } => resolve(&id).await,
            Commands::Seed { input } => seed(input).await,
            Commands::Config => show_config(),
        }
    }
}

fn service() -> Result<Triage> {
    Triage::from_config(config::config()?)
}

fn parse_id(raw: &str) -> Result<IncidentId> {
    IncidentId::from_str(raw).with_context(|| format!("Invalid incident id: {}", raw))
}

/// Read input from a file or stdin
fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

async fn triage(input: Option<PathBuf>) -> Result<()> {
    let raw = read_input(input)?;
    let candidate: CandidateIncident =
        serde_json::from_str(&raw).context("Input is not a valid candidate incident")?;

    let outcome = service()?.process(candidate).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn list_queue(limit: usize) -> Result<()> {
    let triage = service()?;
    let mut entries = triage.open_queue().await?;
    entries.truncate(limit);

    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!(
        "{:<26} {:>4} {:<18} {:<8} {:<8} action",
        "id", "sev", "type", "location", "time"
    );
    for entry in entries {
        println!(
            "{:<26} {:>4} {:<18} {:<8} {:<8} {}",
            entry.id,
            entry.severity,
            entry.incident_type.to_string(),
            entry.location,
            entry.time,
            entry.suggested_action
        );
    }

    Ok(())
}

async fn show(id: &str) -> Result<()> {
    let id = parse_id(id)?;

    match service()?.incident(id).await? {
        Some(incident) => println!("{}", serde_json::to_string_pretty(&incident)?),
        None => println!("Incident {} not found.", id),
    }

    Ok(())
}

async fn resolve(id: &str) -> Result<()> {
    let id = parse_id(id)?;

    match service()?.resolve(id).await {
        Ok(outcome) => {
            println!(
                "Incident {} completed; removed {} queue entry(ies).",
                id, outcome.removed
            );
            Ok(())
        }
        Err(TriageError::NotFound(id)) => {
            println!("Incident {} not found.", id);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn seed(input: PathBuf) -> Result<()> {
    let raw = read_input(Some(input))?;
    let incidents: Vec<Incident> =
        serde_json::from_str(&raw).context("Input is not a JSON array of incidents")?;

    let count = service()?.seed(incidents).await?;
    println!("Seeded {} incident(s).", count);

    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("home: {}", config.home.display());
    match &config.index {
        crate::config::IndexSettings::Memory => println!("index: memory (lexical)"),
        crate::config::IndexSettings::Http(http) => println!("index: http ({})", http.url),
    }
    println!("dedup:");
    println!("  namespace: {}", config.dedup.namespace);
    println!("  top_k: {}", config.dedup.top_k);
    println!("  score_threshold: {}", config.dedup.score_threshold);
    println!("  time_window_minutes: {}", config.dedup.time_window_minutes);
    println!("  fail_open: {}", config.dedup.fail_open);
    println!("queue.decay_seconds_per_level: {}", config.queue_decay_seconds);
    println!("archive.require_transcript: {}", config.require_transcript);
    match &config.config_file {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: (none, using defaults)"),
    }

    Ok(())
}
