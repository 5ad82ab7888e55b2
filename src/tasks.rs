//! Task store: loads task specs from the legacy tasks file or a benchmark
//! data directory, validates them, and merges inline run-request fields.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::debug;

use crate::error::EvalError;
use crate::types::{RunRequest, TaskSpec};

pub struct TaskStore {
    tasks_file: PathBuf,
    data_dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, TaskSpec>>,
}

impl TaskStore {
    pub fn new(tasks_file: impl Into<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self {
            tasks_file: tasks_file.into(),
            data_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all cached specs, forcing reloads from disk.
    pub fn reset(&self) {
        self.cache.lock().expect("task cache poisoned").clear();
    }

    /// Load a task spec by id. Resolution order: cache, per-task file in the
    /// benchmark data directory, then the keyed legacy tasks file.
    pub fn load(&self, task_id: &str) -> Result<TaskSpec> {
        if let Some(cached) = self
            .cache
            .lock()
            .expect("task cache poisoned")
            .get(task_id)
        {
            return Ok(cached.clone());
        }

        let spec = self
            .load_from_data_dir(task_id)
            .or_else(|| self.load_from_tasks_file(task_id).transpose())
            .transpose()?
            .ok_or_else(|| anyhow!("task '{task_id}' not found"))?;

        debug!(task_id, "loaded task spec");
        self.cache
            .lock()
            .expect("task cache poisoned")
            .insert(task_id.to_string(), spec.clone());
        Ok(spec)
    }

    fn load_from_data_dir(&self, task_id: &str) -> Option<Result<TaskSpec>> {
        let dir = self.data_dir.as_ref()?;
        let path = dir.join(format!("{task_id}.json"));
        if !path.exists() {
            return None;
        }
        Some(parse_task_file(&path))
    }

    fn load_from_tasks_file(&self, task_id: &str) -> Result<Option<TaskSpec>> {
        if !self.tasks_file.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.tasks_file)
            .with_context(|| format!("reading {}", self.tasks_file.display()))?;
        let mut all: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.tasks_file.display()))?;

        let Some(mut entry) = all.remove(task_id) else {
            return Ok(None);
        };
        // Entries in the keyed file may omit their own id.
        if let Some(obj) = entry.as_object_mut() {
            obj.entry("id").or_insert_with(|| task_id.into());
        }
        Ok(Some(serde_json::from_value(entry).with_context(|| {
            format!("task '{task_id}' in {}", self.tasks_file.display())
        })?))
    }
}

fn parse_task_file(path: &Path) -> Result<TaskSpec> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Check that a task spec is well-formed enough to run.
///
/// Identifier, start URL, and instruction must be non-empty; limits must be
/// strictly positive; the spec must carry either success criteria or a
/// legacy expectation pair, and a legacy regex must compile.
pub fn validate_task_spec(task: &TaskSpec) -> Result<(), String> {
    if task.id.is_empty() {
        return Err("task id is empty".to_string());
    }
    if task.start_url.is_empty() {
        return Err("start_url is empty".to_string());
    }
    if task.instruction.is_empty() {
        return Err("instruction is empty".to_string());
    }

    if task.limits.max_steps == 0 {
        return Err("limits.max_steps must be strictly positive".to_string());
    }
    if task.limits.timeout_s == 0 {
        return Err("limits.timeout_s must be strictly positive".to_string());
    }

    match (&task.expected, &task.success_criteria) {
        (None, None) => {
            return Err(
                "task defines neither success_criteria nor an expected css/regex pair".to_string(),
            );
        }
        (Some(expected), _) => {
            if expected.css.is_empty() {
                return Err("expected.css is empty".to_string());
            }
            if expected.regex.is_empty() {
                return Err("expected.regex is empty".to_string());
            }
            if Regex::new(&expected.regex).is_err() {
                return Err(format!("expected.regex does not compile: {}", expected.regex));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Resolve the task spec for a run request.
///
/// The store entry for the task id (when present) contributes criteria and
/// gold actions; inline request fields take precedence; the request's limits
/// always win. The merged spec must validate or the run is rejected before
/// any browser session is opened.
pub fn task_from_run_request(request: &RunRequest, store: &TaskStore) -> Result<TaskSpec, EvalError> {
    let base = store.load(&request.task.task_id).ok();

    let task = &request.task;
    let spec = TaskSpec {
        id: task.task_id.clone(),
        start_url: task.start_url.clone(),
        instruction: task.instruction.clone(),
        expected: base.as_ref().and_then(|b| b.expected.clone()),
        limits: request.limits.clone(),
        benchmark: task
            .benchmark
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.benchmark.clone())),
        split: task
            .split
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.split.clone())),
        index: task.index.or_else(|| base.as_ref().and_then(|b| b.index)),
        assets: task
            .assets
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.assets.clone())),
        gold_actions: task
            .gold_actions
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.gold_actions.clone())),
        success_criteria: task
            .success_criteria
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.success_criteria.clone())),
    };

    validate_task_spec(&spec).map_err(EvalError::SpecInvalid)?;
    Ok(spec)
}
