//! Best-effort persistence of run artifacts.
//!
//! A run's trail lives under `<root>/<run_id>/`: the append-only event log,
//! the final report and markup, and per-step screenshots. Writes are
//! best-effort by design; an artifact failure is logged and must never mask
//! the run's own outcome.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::types::{EventRecord, Report, RunResponse};

#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// Resolved on-disk layout for one run.
pub struct RunPaths {
    pub dir: PathBuf,
    pub event_log: PathBuf,
    pub screenshots_dir: PathBuf,
    pub report: PathBuf,
    pub final_html: PathBuf,
}

impl RunPaths {
    pub fn screenshot_for_step(&self, step_idx: u32) -> PathBuf {
        self.screenshots_dir.join(format!("step_{step_idx:03}.png"))
    }
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating runs directory {}", self.root.display()))
    }

    /// Create the directory tree for one run.
    pub fn run_paths(&self, run_id: &str) -> Result<RunPaths> {
        let dir = self.root.join(run_id);
        let screenshots_dir = dir.join("screenshots");
        fs::create_dir_all(&screenshots_dir)
            .with_context(|| format!("creating run directory {}", dir.display()))?;
        Ok(RunPaths {
            event_log: dir.join("events.jsonl"),
            report: dir.join("report.json"),
            final_html: dir.join("final.html"),
            screenshots_dir,
            dir,
        })
    }

    /// Write the final report and markup. Failures are swallowed with a
    /// warning so they cannot displace the run result.
    pub fn save_run_outcome(&self, paths: &RunPaths, response: &RunResponse, final_html: &str) {
        if let Err(e) = write_json(&paths.report, response) {
            warn!(error = %e, "failed to write report.json");
        }
        if let Err(e) = fs::write(&paths.final_html, final_html) {
            warn!(error = %e, "failed to write final.html");
        }
    }

    /// Persist artifacts for a legacy single-task evaluation: report.json,
    /// final.html, snap.png, and a numbered actions.log.
    pub fn save_legacy_artifacts(
        &self,
        task_id: &str,
        report: &Report,
        final_html: &str,
        screenshot: &[u8],
        actions: &[String],
    ) -> Result<()> {
        let dir = self.root.join(task_id);
        fs::create_dir_all(&dir)?;

        write_json(&dir.join("report.json"), report)?;
        fs::write(dir.join("final.html"), final_html)?;
        fs::write(dir.join("snap.png"), screenshot)?;

        let mut log = BufWriter::new(File::create(dir.join("actions.log"))?);
        for (i, action) in actions.iter().enumerate() {
            writeln!(log, "{:03}: {action}", i + 1)?;
        }
        log.flush()?;
        Ok(())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

/// Incremental JSONL writer for the event trail. Each record is flushed as
/// it is appended so a partial trail survives a hard abort mid-run.
pub struct EventLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl EventLog {
    /// A log that drops every record. Used when no artifact directory could
    /// be created; the run itself still proceeds.
    pub fn disabled() -> Self {
        Self {
            writer: None,
            path: PathBuf::new(),
        }
    }

    pub fn create(path: &Path) -> Self {
        let writer = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "event log unavailable");
                None
            }
        };
        Self {
            writer,
            path: path.to_path_buf(),
        }
    }

    pub fn append(&mut self, record: &EventRecord) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = serde_json::to_string(record)
            .map_err(anyhow::Error::from)
            .and_then(|line| {
                writeln!(writer, "{line}")?;
                writer.flush()?;
                Ok(())
            });
        if let Err(e) = result {
            warn!(error = %e, path = %self.path.display(), "failed to append event record");
        }
    }
}
