//! Command-line interface for acta.
//!
//! Provides commands for scoring candidates, processing transcripts,
//! checking recording status, and listing recordings.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::CommandExtractor;
use crate::config;
use crate::core::Orchestrator;
use crate::domain::{CandidateAction, PassState, RecordingState};
use crate::scoring::{GatePolicy, Scorer};

/// acta - Event-sourced validator for extracted action items
#[derive(Parser, Debug)]
#[command(name = "acta")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score candidate actions without touching a recording
    Score {
        /// JSON file holding a candidate or an array of candidates
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Read input from stdin
        #[arg(long)]
        stdin: bool,

        /// Override the acceptance threshold
        #[arg(short, long)]
        threshold: Option<u8>,

        /// Print scored candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an extraction pass over a transcript
    Process {
        /// Transcript file (reads from stdin if not provided)
        transcript: Option<PathBuf>,

        /// Recording to add the pass to (a new recording is created if omitted)
        #[arg(short, long)]
        recording: Option<String>,

        /// Finalize the recording after the pass
        #[arg(long)]
        finalize: bool,
    },

    /// Check the status of a recording
    Status {
        /// Recording ID (UUID)
        recording_id: String,
    },

    /// Finalize a recording, sealing its accepted set
    Finalize {
        /// Recording ID (UUID)
        recording_id: String,
    },

    /// List recent recordings
    Recordings {
        /// Maximum number of recordings to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Score {
                input,
                stdin,
                threshold,
                json,
            } => score_candidates(input, stdin, threshold, json).await,
            Commands::Process {
                transcript,
                recording,
                finalize,
            } => process_transcript(transcript, recording, finalize).await,
            Commands::Status { recording_id } => show_status(&recording_id).await,
            Commands::Finalize { recording_id } => finalize_recording(&recording_id).await,
            Commands::Recordings { limit } => list_recordings(limit).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Build the extractor the config describes
fn config_extractor() -> Result<CommandExtractor> {
    let cfg = config::settings()?;
    Ok(CommandExtractor::new(cfg.extractor.command.clone()).with_args(cfg.extractor.args.clone()))
}

/// Score candidates from a JSON file or stdin
async fn score_candidates(
    input_file: Option<PathBuf>,
    use_stdin: bool,
    threshold: Option<u8>,
    as_json: bool,
) -> Result<()> {
    // Get input
    let input = if let Some(path) = input_file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if read_from_stdin(use_stdin, io::stdin().is_terminal()) {
        // Read from stdin if --stdin flag or if stdin is piped
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    };

    if input.trim().is_empty() {
        anyhow::bail!("Input is empty");
    }

    // Accept either a single candidate or an array
    let candidates: Vec<CandidateAction> =
        match serde_json::from_str::<Vec<CandidateAction>>(&input) {
            Ok(list) => list,
            Err(_) => {
                let single: CandidateAction = serde_json::from_str(&input)
                    .context("Input is neither a candidate object nor an array of candidates")?;
                vec![single]
            }
        };

    let gate = match threshold {
        Some(t) => GatePolicy::new(t),
        None => config::settings()?.validation.gate_policy(),
    };

    let scorer = Scorer::new();
    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        scored.push(scorer.evaluate(candidate, &gate)?);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&scored)?);
        return Ok(());
    }

    let accepted = scored.iter().filter(|s| s.verdict.is_accepted()).count();

    println!("{:<10} {:<7} {}", "VERDICT", "SCORE", "TEXT");
    println!("{}", "-".repeat(70));

    for item in &scored {
        let verdict = if item.verdict.is_accepted() {
            "accepted"
        } else {
            "rejected"
        };
        let text_truncated = truncate_text(&item.candidate.text, 50);
        println!("{:<10} {:<7} {}", verdict, item.score, text_truncated);
        for issue in &item.issues {
            println!("{:<18} - {}", "", issue);
        }
    }

    println!(
        "\nTotal: {} accepted, {} rejected",
        accepted,
        scored.len() - accepted
    );

    Ok(())
}

/// Run an extraction pass over a transcript
async fn process_transcript(
    transcript: Option<PathBuf>,
    recording: Option<String>,
    finalize: bool,
) -> Result<()> {
    // Get transcript from file or stdin
    let text = if let Some(path) = transcript {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?
    } else {
        // Read from stdin
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    if text.trim().is_empty() {
        anyhow::bail!("Transcript is empty");
    }

    let orchestrator = Orchestrator::new(Arc::new(config_extractor()?))?;

    let recording_id = match recording {
        Some(ref id_str) => Uuid::parse_str(id_str)
            .with_context(|| format!("Invalid recording ID: {}", id_str))?,
        None => {
            let created = orchestrator.create_recording().await?;
            eprintln!("Created recording {}", created.id);
            created.id
        }
    };

    let outcome = orchestrator.run_pass(recording_id, &text).await?;

    if outcome.discarded {
        eprintln!("⚠️  Pass {} discarded by cancellation", outcome.pass_index);
        println!("{}", recording_id);
        return Ok(());
    }

    match outcome.error {
        None => {
            eprintln!(
                "✅ Pass {}: {} extracted, {} accepted, {} rejected",
                outcome.pass_index, outcome.raw, outcome.accepted, outcome.rejected
            );
            eprintln!(
                "   Merge: {} added, {} replaced, {} dropped as duplicates",
                outcome.merge.added, outcome.merge.replaced, outcome.merge.discarded
            );
            if let Some(feedback) = outcome.retry_feedback() {
                eprintln!("   Rejection issues: {}", feedback);
            }
        }
        Some(ref error) => {
            eprintln!("❌ Pass {} failed: {}", outcome.pass_index, error);
            println!("{}", recording_id);
            std::process::exit(1);
        }
    }

    if finalize {
        let sealed = orchestrator.finalize(recording_id).await?;
        match &sealed.state {
            RecordingState::Complete => {
                eprintln!(
                    "✅ Recording complete: {} accepted item(s)",
                    sealed.accepted.len()
                );
            }
            RecordingState::Failed { reason } => {
                eprintln!("❌ Recording failed: {}", reason);
                println!("{}", recording_id);
                std::process::exit(1);
            }
            _ => {}
        }
    }

    println!("{}", recording_id);

    Ok(())
}

/// Show the status of a recording
async fn show_status(recording_id_str: &str) -> Result<()> {
    let recording_id = Uuid::parse_str(recording_id_str)
        .with_context(|| format!("Invalid recording ID: {}", recording_id_str))?;

    let orchestrator = Orchestrator::new(Arc::new(config_extractor()?))?;
    let recording = orchestrator.recording_status(recording_id).await?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  Recording: {}", recording.id);
    println!("  State: {}", recording.state);
    if let RecordingState::Failed { reason } = &recording.state {
        println!("  Reason: {}", reason);
    }
    println!("  Created: {}", recording.created_at);
    if let Some(completed) = recording.completed_at {
        println!("  Completed: {}", completed);
    }
    println!("  Passes: {}", recording.passes.len());
    println!(
        "  Accepted: {} item(s), version {}",
        recording.accepted.len(),
        recording.accepted.version
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    if !recording.passes.is_empty() {
        println!("\nPasses:");
        for pass in &recording.passes {
            let state = match pass.state {
                PassState::Completed => "completed",
                PassState::Failed => "failed",
            };
            println!(
                "  #{}: {} - {} raw, {} accepted, {} rejected, {} retries",
                pass.index, state, pass.raw, pass.accepted, pass.rejected, pass.retries
            );
            if let Some(error) = &pass.error {
                println!("      error: {}", error);
            }
        }
    }

    if !recording.accepted.is_empty() {
        println!("\nAccepted items:");
        for item in &recording.accepted.items {
            println!(
                "  [{:>3}] {} ({})",
                item.score, item.candidate.text, item.candidate.action_type
            );
            if let Some(date) = item.candidate.scheduled_date {
                println!("        due {}", date);
            } else if let Some(due) = &item.candidate.due_context {
                println!("        due {}", due);
            }
        }
    }

    if !recording.accepted.audit.is_empty() {
        println!("\nDisplaced duplicates:");
        for record in &recording.accepted.audit {
            println!(
                "  {} (score {}) replaced by {}",
                record.item_id, record.score, record.replaced_by
            );
        }
    }

    Ok(())
}

/// Finalize a recording, sealing its accepted set
async fn finalize_recording(recording_id_str: &str) -> Result<()> {
    let recording_id = Uuid::parse_str(recording_id_str)
        .with_context(|| format!("Invalid recording ID: {}", recording_id_str))?;

    let orchestrator = Orchestrator::new(Arc::new(config_extractor()?))?;
    let recording = orchestrator.finalize(recording_id).await?;

    match &recording.state {
        RecordingState::Complete => {
            eprintln!(
                "✅ Recording complete: {} accepted item(s)",
                recording.accepted.len()
            );
        }
        RecordingState::Failed { reason } => {
            eprintln!("❌ Recording failed: {}", reason);
            std::process::exit(1);
        }
        _ => {}
    }

    Ok(())
}

/// List recent recordings
async fn list_recordings(limit: usize) -> Result<()> {
    let orchestrator = Orchestrator::new(Arc::new(config_extractor()?))?;
    let recordings = orchestrator.list_recordings(limit).await?;

    if recordings.is_empty() {
        println!("No recordings found");
        return Ok(());
    }

    println!(
        "{:<38} {:<12} {:>7} {:>9}  {}",
        "RECORDING ID", "STATE", "PASSES", "ACCEPTED", "CREATED"
    );
    println!("{}", "-".repeat(90));

    for recording in recordings {
        println!(
            "{:<38} {:<12} {:>7} {:>9}  {}",
            recording.id,
            recording.state.to_string(),
            recording.passes.len(),
            recording.accepted.len(),
            recording.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::settings()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  Acta Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Recordings:          {}", cfg.home.join("recordings").display());
    println!();
    println!("Validation:");
    println!("  Accept threshold:     {}", cfg.validation.accept_threshold);
    if cfg.validation.type_thresholds.is_empty() {
        println!("  Type overrides:       (none)");
    } else {
        for (action_type, override_threshold) in &cfg.validation.type_thresholds {
            println!("  Threshold [{}]:  {}", action_type, override_threshold);
        }
    }
    println!(
        "  Similarity threshold: {}",
        cfg.validation.similarity_threshold
    );
    println!();
    println!("Retry:");
    println!("  Max attempts:       {}", cfg.retry.max_attempts);
    println!("  Initial delay:      {}ms", cfg.retry.initial_delay_ms);
    println!("  Max delay:          {}ms", cfg.retry.max_delay_ms);
    println!("  Backoff multiplier: {}", cfg.retry.backoff_multiplier);
    println!();
    println!("Extractor:");
    println!("  Command: {}", cfg.extractor.command);
    if !cfg.extractor.args.is_empty() {
        println!("  Args:    {}", cfg.extractor.args.join(" "));
    }
    println!("  Timeout: {}s", cfg.extractor.timeout_seconds);

    Ok(())
}

/// Whether candidate input should come from stdin: either requested
/// explicitly or stdin is a pipe rather than a terminal
fn read_from_stdin(use_stdin: bool, stdin_is_tty: bool) -> bool {
    use_stdin || !stdin_is_tty
}

/// Truncate display text on a character boundary
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_text("Call the pharmacy", 50), "Call the pharmacy");
    }

    #[test]
    fn test_truncate_cuts_on_char_boundary() {
        // A two-byte character straddles the byte-50 mark; truncation
        // must count characters, not bytes
        let text = format!("{}é tail", "a".repeat(49));
        let truncated = truncate_text(&text, 50);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 53);
        assert!(truncated.contains('é'));
    }

    #[test]
    fn test_stdin_used_only_when_asked_or_piped() {
        assert!(read_from_stdin(true, true));
        assert!(read_from_stdin(false, false));
        // On a terminal with no --stdin flag, fall through to the
        // missing-input error instead of blocking on a read
        assert!(!read_from_stdin(false, true));
    }
}
