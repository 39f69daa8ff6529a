//! Subprocess extractor invoking an external CLI.
//!
//! Spawns a configured command, pipes the transcript to its stdin, and
//! parses its stdout as a JSON array of raw candidates. Works with any
//! CLI wrapper around a transcription+extraction model; the command and
//! arguments come from configuration.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::Extractor;
use crate::domain::candidate::CandidateAction;

/// Extractor that shells out to a configured command
pub struct CommandExtractor {
    /// Binary to invoke
    command: String,

    /// Arguments passed on every invocation
    args: Vec<String>,
}

impl CommandExtractor {
    /// Create an extractor for the given binary
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Set the arguments passed on every invocation
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    async fn run_subprocess(&self, transcript: &str, call_timeout: Duration) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn extractor command '{}'", self.command))?;

        // Write transcript to stdin
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(transcript.as_bytes())
                .await
                .context("Failed to write transcript to extractor stdin")?;
            // Drop stdin to signal EOF
        }

        // Wait for completion with timeout
        let output = timeout(call_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Extractor command '{}' timed out after {:?}",
                    self.command, call_timeout
                )
            })?
            .with_context(|| {
                format!("Failed to wait for extractor command '{}'", self.command)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Extractor command '{}' failed with exit code {}: {}",
                self.command,
                exit_code,
                stderr.trim()
            );
        }

        let stdout =
            String::from_utf8(output.stdout).context("Extractor output is not valid UTF-8")?;

        Ok(stdout)
    }
}

/// Parse extractor stdout as a candidate array.
///
/// Model-backed CLIs often wrap their JSON in markdown code fences;
/// try the raw output first, then retry with fences stripped.
pub fn parse_candidates(output: &str) -> Result<Vec<CandidateAction>> {
    let trimmed = output.trim();
    match serde_json::from_str(trimmed) {
        Ok(candidates) => Ok(candidates),
        Err(_) => {
            let cleaned = trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(cleaned)
                .with_context(|| format!("Extractor output is not a candidate array: {}", trimmed))
        }
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.command
    }

    async fn extract(
        &self,
        transcript: &str,
        timeout: Duration,
    ) -> Result<Vec<CandidateAction>> {
        let output = self.run_subprocess(transcript, timeout).await?;
        parse_candidates(&output)
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.command)
            .arg("--help")
            .output()
            .await
            .with_context(|| {
                format!("Failed to run extractor health check for '{}'", self.command)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Extractor health check failed: {}", stderr);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_name_is_the_command() {
        let extractor = CommandExtractor::new("extract-actions")
            .with_args(vec!["--format".into(), "json".into()]);
        assert_eq!(extractor.name(), "extract-actions");
        assert_eq!(extractor.args.len(), 2);
    }

    #[test]
    fn test_parse_clean_array() {
        let output = r#"[{"text": "Call the pharmacy", "actionType": "reminder"}]"#;
        let candidates = parse_candidates(output).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "Call the pharmacy");
    }

    #[test]
    fn test_parse_fenced_array() {
        let output = "```json\n[{\"text\": \"Call the pharmacy\"}]\n```";
        let candidates = parse_candidates(output).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_candidates("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_candidates("I could not find any actions.").is_err());
    }
}
