use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on interactive elements included in an observation.
pub const MAX_OBSERVED_ELEMENTS: usize = 100;
/// Visible text per element is truncated to this many characters.
pub const ELEMENT_TEXT_MAX_CHARS: usize = 100;
/// Default per-call timeout for white-agent requests, in seconds.
pub const AGENT_CALL_TIMEOUT_S: u64 = 30;
/// Default per-action browser timeout, in milliseconds.
pub const ACTION_TIMEOUT_MS: u64 = 10_000;
/// The run stops once this many agent calls have timed out.
pub const MAX_AGENT_TIMEOUTS: u32 = 3;

/// A single step the white agent asks the harness to perform.
///
/// The vocabulary is closed: anything outside these six kinds is rejected
/// before it reaches the browser layer. Defaults mirror what the executor
/// assumes when an optional field is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        press_enter: bool,
    },
    Select {
        selector: String,
        value: String,
    },
    Scroll {
        #[serde(default)]
        delta_y: i64,
    },
    Wait {
        #[serde(default = "default_wait_ms")]
        ms: u64,
    },
    Stop {
        #[serde(default = "default_stop_reason")]
        reason: String,
    },
}

fn default_wait_ms() -> u64 {
    500
}

fn default_stop_reason() -> String {
    "done".to_string()
}

impl Action {
    /// Wire name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::Stop { .. } => "stop",
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            Action::Click { selector }
            | Action::Type { selector, .. }
            | Action::Select { selector, .. } => Some(selector),
            _ => None,
        }
    }
}

/// Outcome of applying one action to the live page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// URL observed after the action ran (or failed).
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// One interactive element surfaced to the white agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub selector: String,
    pub tag: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Point-in-time page snapshot handed to the white agent each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    pub title: String,
    pub dom_summary: Vec<ElementDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
}

/// Append-only record of one loop step. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub step_idx: u32,
    pub timestamp: DateTime<Utc>,
    pub observation_hash: String,
    /// The action payload as received from the agent, valid or not.
    pub action: Value,
    pub execution_result: ExecutionResult,
    pub url: String,
}

/// Aggregate metrics for a completed (or aborted) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub final_success: bool,
    pub steps_taken: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_match_ratio: Option<f64>,
    pub wall_time_s: f64,
    pub timeouts: u32,
    pub invalid_actions: u32,
}

/// Step/time budgets for one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLimits {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_timeout_s", alias = "timeout_sec")]
    pub timeout_s: u64,
}

fn default_max_steps() -> u32 {
    20
}

fn default_timeout_s() -> u64 {
    60
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_s: default_timeout_s(),
        }
    }
}

/// Legacy expectation pair: a CSS selector plus a regex over the answer text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExpected {
    pub css: String,
    pub regex: String,
}

/// Declarative success criteria. Every present key must pass for the run to
/// be judged successful; a map with no keys never succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_present: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_present: Option<String>,
}

impl SuccessCriteria {
    pub fn is_empty(&self) -> bool {
        self.url_contains.is_none()
            && self.text_present.is_none()
            && self.selector_present.is_none()
    }
}

/// Optional pre-recorded artifacts that ship with a benchmark task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub har_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<String>,
}

/// One reference action in a gold sequence. Only used for trace scoring,
/// never for pass/fail judging, so the shape is deliberately permissive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<i64>,
}

/// Immutable description of one evaluable task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(alias = "task_id")]
    pub id: String,
    pub start_url: String,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<TaskExpected>,
    #[serde(default)]
    pub limits: TaskLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<TaskAssets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_actions: Option<Vec<GoldAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<SuccessCriteria>,
}

/// Result of the scripted extraction pass used by the legacy endpoint.
#[derive(Debug, Clone)]
pub struct ScriptedRunResult {
    pub answer_text: String,
    pub evidence_selector: String,
    pub actions: Vec<String>,
    pub final_url: String,
    pub duration_sec: f64,
}

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteAgentRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTask {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    pub instruction: String,
    pub start_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<TaskAssets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<SuccessCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_actions: Option<Vec<GoldAction>>,
}

/// Inbound request to evaluate one task with one (or more) white agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    pub task: RunTask,
    pub white_agents: Vec<WhiteAgentRef>,
    #[serde(default)]
    pub limits: TaskLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_zip: Option<String>,
    pub screenshots_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playwright_trace: Option<String>,
}

/// Outbound report for one run. The caller always receives one of these,
/// even when the run failed before its first step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub task_id: String,
    pub success: bool,
    pub metrics: RunMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<RunArtifacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-step request to a white agent's `/act` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActRequest {
    pub run_id: String,
    pub task_id: String,
    pub instruction: String,
    pub step_idx: u32,
    pub observation: Observation,
    pub action_space: ActionSpace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpace {
    pub allowed: Vec<String>,
}

impl Default for ActionSpace {
    fn default() -> Self {
        Self {
            allowed: ["click", "type", "select", "scroll", "wait", "stop"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// White-agent reply. Only `action` is required; `thoughts` and `info` are
/// passed through for logging when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActResponse {
    pub action: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

// Legacy single-task endpoint.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub duration_sec: f64,
    pub step_count: usize,
    pub on_task_domain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvidence {
    pub matched_text: Option<String>,
    pub final_url: String,
    pub screenshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub task_id: String,
    pub success: bool,
    pub metrics: TaskMetrics,
    pub evidence: TaskEvidence,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: bool,
}
