use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadence_config::Manifest;
use cadence_store::{DATABASE_FILE, DeadLetterSink, SqliteDeadLetterSink};
use cadence_trigger::ScheduleRule;
use cadence_workflow::Workflow;

/// Cadence - scheduled multi-step workflows
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cadence)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check that every workflow and schedule in a manifest locks
  Validate {
    /// Path to the manifest file (JSON)
    manifest: PathBuf,
  },

  /// Preview upcoming fire times of a manifest's enabled schedules
  Schedule {
    /// Path to the manifest file (JSON)
    manifest: PathBuf,

    /// Number of fire times to print
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// Start of the preview window (RFC 3339, default: now)
    #[arg(long)]
    after: Option<DateTime<Utc>>,
  },

  /// Inspect a dead-letter sink in <data-dir>/cadence.db, as written by a
  /// process embedding the scheduler
  DeadLetters {
    /// Sink name
    #[arg(long, default_value = cadence_members::reference::SUMMARY_DEAD_LETTER_SINK)]
    sink: String,

    #[command(subcommand)]
    action: DeadLetterAction,
  },

  /// Print the reference manifest
  Reference,
}

#[derive(Subcommand)]
enum DeadLetterAction {
  /// List entries, oldest first
  List,
  /// Print one entry
  Show { entry_id: String },
  /// Delete one entry
  Remove { entry_id: String },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".cadence"),
  };

  match cli.command {
    Some(Commands::Validate { manifest }) => validate(&manifest)?,
    Some(Commands::Schedule {
      manifest,
      count,
      after,
    }) => schedule(&manifest, count, after.unwrap_or_else(Utc::now))?,
    Some(Commands::DeadLetters { sink, action }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { dead_letters(&data_dir, sink, action).await })?;
    }
    Some(Commands::Reference) => {
      let manifest = cadence_members::reference::manifest();
      println!("{}", serde_json::to_string_pretty(&manifest)?);
    }
    None => {
      println!("cadence - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_manifest(path: &Path) -> Result<Manifest> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read manifest: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse manifest: {}", path.display()))
}

fn lock_rules(manifest: &Manifest) -> Result<Vec<ScheduleRule>> {
  manifest
    .schedules
    .iter()
    .map(|def| ScheduleRule::lock(def).with_context(|| format!("invalid schedule '{}'", def.name)))
    .collect()
}

fn validate(path: &Path) -> Result<()> {
  let manifest = load_manifest(path)?;

  let mut workflow_ids = HashSet::new();
  for def in &manifest.workflows {
    let workflow = Workflow::lock(def)
      .with_context(|| format!("invalid workflow '{}'", def.workflow_id))?;
    cadence_runtime::validate_selectors(&workflow)
      .with_context(|| format!("invalid workflow '{}'", def.workflow_id))?;
    if !workflow_ids.insert(workflow.workflow_id.clone()) {
      bail!("duplicate workflow '{}'", workflow.workflow_id);
    }
    info!(
      workflow_id = %workflow.workflow_id,
      states = workflow.states.len(),
      tasks = workflow.task_names().len(),
      "workflow_valid"
    );
  }

  let mut rule_names = HashSet::new();
  for rule in lock_rules(&manifest)? {
    if !rule_names.insert(rule.name.clone()) {
      bail!("duplicate schedule '{}'", rule.name);
    }
    if !workflow_ids.contains(&rule.target_workflow) {
      bail!(
        "schedule '{}' targets unknown workflow '{}'",
        rule.name,
        rule.target_workflow
      );
    }
    info!(rule = %rule.name, cron = %rule.cron, enabled = rule.enabled, "schedule_valid");
  }

  println!(
    "{}: {} workflow(s), {} schedule(s) ok",
    path.display(),
    workflow_ids.len(),
    rule_names.len()
  );
  Ok(())
}

fn schedule(path: &Path, count: usize, after: DateTime<Utc>) -> Result<()> {
  let manifest = load_manifest(path)?;
  let rules = lock_rules(&manifest)?;

  let mut fires: Vec<(DateTime<Utc>, &ScheduleRule)> = rules
    .iter()
    .filter(|rule| rule.enabled)
    .flat_map(|rule| rule.cron.upcoming(after, count).into_iter().map(move |t| (t, rule)))
    .collect();
  fires.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
  fires.truncate(count);

  for (at, rule) in fires {
    println!("{}  {}  -> {}", at.to_rfc3339(), rule.name, rule.target_workflow);
  }
  Ok(())
}

async fn dead_letters(data_dir: &Path, sink: String, action: DeadLetterAction) -> Result<()> {
  let sink = SqliteDeadLetterSink::open_in(data_dir, sink)
    .await
    .with_context(|| {
      format!(
        "failed to open dead-letter store: {}",
        data_dir.join(DATABASE_FILE).display()
      )
    })?;

  let result = dead_letter_action(&sink, action).await;
  sink.close().await;
  result
}

async fn dead_letter_action(sink: &SqliteDeadLetterSink, action: DeadLetterAction) -> Result<()> {
  match action {
    DeadLetterAction::List => {
      let entries = sink.list().await.context("failed to list dead letters")?;
      println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    DeadLetterAction::Show { entry_id } => {
      let entry = sink
        .get(&entry_id)
        .await
        .with_context(|| format!("failed to load dead letter '{entry_id}'"))?;
      println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    DeadLetterAction::Remove { entry_id } => {
      sink
        .remove(&entry_id)
        .await
        .with_context(|| format!("failed to remove dead letter '{entry_id}'"))?;
      eprintln!("Removed {entry_id}");
    }
  }
  Ok(())
}
