//! Per-run conversation transcript: one JSONL line per hop snapshot,
//! plus an atomically written final summary.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;

use quill_core::write_text_atomic;
use quill_orchestrator::{AgentState, HopSnapshot};

/// Public struct `TranscriptLogger` used across Quill components.
pub struct TranscriptLogger {
    hops_path: PathBuf,
    summary_path: PathBuf,
}

impl TranscriptLogger {
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Ok(Self {
            hops_path: log_dir.join(format!("conversation_{stamp}.jsonl")),
            summary_path: log_dir.join(format!("summary_{stamp}.json")),
        })
    }

    pub fn hops_path(&self) -> &Path {
        &self.hops_path
    }

    /// Appends one hop snapshot as a JSON line.
    pub fn log_hop(&self, snapshot: &HopSnapshot) -> Result<()> {
        let mut line = serde_json::to_string(snapshot)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.hops_path)
            .with_context(|| format!("opening transcript {}", self.hops_path.display()))?;
        file.write_all(line.as_bytes())
            .context("appending hop snapshot")?;
        Ok(())
    }

    /// Writes the final run summary next to the hop transcript.
    pub fn write_summary(&self, state: &AgentState) -> Result<PathBuf> {
        let summary = json!({
            "task": state.task,
            "status": state.status,
            "iterations": state.iteration,
            "error": state.error,
            "contributions": state
                .results
                .iter()
                .map(|result| {
                    json!({
                        "agent": result.agent,
                        "tool_calls_made": result.tool_calls_made,
                        "status": result.status,
                        "summary": result.summary,
                    })
                })
                .collect::<Vec<_>>(),
            "agent_outputs": state.agent_outputs,
            "final_output": state.final_synthesis(),
            "finished_at": Local::now().to_rfc3339(),
        });
        write_text_atomic(&self.summary_path, &serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing summary {}", self.summary_path.display()))?;
        Ok(self.summary_path.clone())
    }
}
