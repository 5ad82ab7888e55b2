//! Step-loop budget behavior, exercised against an in-memory page driver
//! and a scripted agent so no browser or network is involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use navbench::agent::AgentConnector;
use navbench::artifacts::ArtifactStore;
use navbench::browser::PageDriver;
use navbench::error::AgentCallError;
use navbench::runner::{EvalRunner, RunConfig};
use navbench::types::{
    ActRequest, ActResponse, ElementDescriptor, EventRecord, GoldAction, SuccessCriteria,
    TaskLimits, TaskSpec,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct FakeDriver {
    url: Mutex<String>,
    html: String,
    ops: Mutex<Vec<String>>,
    fail_navigation: bool,
}

impl FakeDriver {
    fn new(html: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new("about:blank".to_string()),
            html: html.to_string(),
            ops: Mutex::new(Vec::new()),
            fail_navigation: false,
        })
    }

    fn failing_navigation() -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new("about:blank".to_string()),
            html: String::new(),
            ops: Mutex::new(Vec::new()),
            fail_navigation: true,
        })
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn push_op(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        if self.fail_navigation {
            return Err(anyhow!("net::ERR_CONNECTION_REFUSED"));
        }
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    async fn title(&self) -> String {
        "Fake Page".to_string()
    }

    async fn html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        // Screenshot failures must be tolerated by the observation builder.
        Err(anyhow!("screenshots unsupported"))
    }

    async fn elements(&self, _cap: usize) -> Result<Vec<ElementDescriptor>> {
        Ok(vec![ElementDescriptor {
            selector: "#product-3".into(),
            tag: "a".into(),
            text: "$29.99".into(),
            kind: "a".into(),
        }])
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.push_op(format!("click {selector}"));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, _timeout: Duration) -> Result<()> {
        self.push_op(format!("fill {selector} {text}"));
        Ok(())
    }

    async fn press_enter(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.push_op(format!("press_enter {selector}"));
        Ok(())
    }

    async fn select_value(&self, selector: &str, value: &str, _timeout: Duration) -> Result<()> {
        self.push_op(format!("select {selector} {value}"));
        Ok(())
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<()> {
        self.push_op(format!("scroll {delta_y}"));
        Ok(())
    }

    async fn text_content(&self, _selector: &str, _timeout: Duration) -> Result<Option<String>> {
        Ok(Some("$29.99".to_string()))
    }

    async fn count_matches(&self, _selector: &str) -> Result<usize> {
        Ok(1)
    }
}

enum StepScript {
    Action(Value),
    Timeout,
    Fail,
    Hang,
}

struct ScriptedAgent {
    steps: Vec<StepScript>,
    repeat_last: bool,
    cursor: AtomicUsize,
}

impl ScriptedAgent {
    fn new(steps: Vec<StepScript>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            repeat_last: false,
            cursor: AtomicUsize::new(0),
        })
    }

    fn repeating(steps: Vec<StepScript>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            repeat_last: true,
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AgentConnector for ScriptedAgent {
    async fn act(&self, _request: &ActRequest) -> Result<ActResponse, AgentCallError> {
        let called = self.cursor.fetch_add(1, Ordering::SeqCst);
        let idx = if called < self.steps.len() {
            called
        } else if self.repeat_last && !self.steps.is_empty() {
            self.steps.len() - 1
        } else {
            return Err(AgentCallError::Transport("script exhausted".into()));
        };

        match &self.steps[idx] {
            StepScript::Action(action) => Ok(ActResponse {
                action: action.clone(),
                thoughts: None,
                info: None,
            }),
            StepScript::Timeout => Err(AgentCallError::Timeout(Duration::from_secs(1))),
            StepScript::Fail => Err(AgentCallError::Transport("connection reset".into())),
            StepScript::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(AgentCallError::Transport("unreachable".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PRODUCT_HTML: &str = r#"<div id="product-3"><span class="price">$29.99</span></div>"#;

fn task(max_steps: u32, timeout_s: u64) -> TaskSpec {
    TaskSpec {
        id: "task_001".into(),
        start_url: "http://localhost:8000/site/product.html".into(),
        instruction: "Click the price of product 3".into(),
        expected: None,
        limits: TaskLimits {
            max_steps,
            timeout_s,
        },
        benchmark: Some("mind2web".into()),
        split: None,
        index: None,
        assets: None,
        gold_actions: None,
        success_criteria: Some(SuccessCriteria {
            selector_present: Some("#product-3 .price".into()),
            ..Default::default()
        }),
    }
}

fn runner(root: &std::path::Path) -> EvalRunner {
    EvalRunner::new(ArtifactStore::new(root), RunConfig::default())
}

fn read_events(root: &std::path::Path, run_id: &str) -> Vec<EventRecord> {
    let path = root.join(run_id).join("events.jsonl");
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_at_step_zero_consumes_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::new(vec![StepScript::Action(
        json!({"type": "stop", "reason": "answer visible"}),
    )]);

    let response = runner(dir.path())
        .run(driver.clone(), agent, "run-stop", &task(20, 30))
        .await;

    assert_eq!(response.metrics.steps_taken, 1);
    assert_eq!(response.metrics.timeouts, 0);
    assert_eq!(response.metrics.invalid_actions, 0);
    assert!(response.error.is_none());
    // Judged against the final page, independently of how the loop ended.
    assert!(response.success);

    let events = read_events(dir.path(), "run-stop");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].step_idx, 0);
    assert_eq!(
        events[0].execution_result.stop_reason.as_deref(),
        Some("answer visible")
    );
    // Stop never touches the page.
    assert!(driver.ops().is_empty());
}

#[tokio::test]
async fn three_timeouts_stop_the_loop_early() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::repeating(vec![StepScript::Timeout]);

    let response = runner(dir.path())
        .run(driver.clone(), agent, "run-timeouts", &task(20, 30))
        .await;

    // The loop stops after exactly three cumulative timeouts, well inside
    // the 20-step budget.
    assert_eq!(response.metrics.timeouts, 3);
    assert_eq!(response.metrics.steps_taken, 3);
    assert!(response.error.is_none());
    assert!(read_events(dir.path(), "run-timeouts").is_empty());
}

#[tokio::test]
async fn step_budget_bounds_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::repeating(vec![StepScript::Action(
        json!({"type": "scroll", "delta_y": 300}),
    )]);

    let response = runner(dir.path())
        .run(driver.clone(), agent, "run-budget", &task(4, 30))
        .await;

    assert_eq!(response.metrics.steps_taken, 4);
    assert_eq!(read_events(dir.path(), "run-budget").len(), 4);
    assert_eq!(driver.ops().len(), 4);
}

#[tokio::test]
async fn invalid_actions_are_counted_and_never_executed() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::new(vec![
        StepScript::Action(json!({"type": "click"})), // missing selector
        StepScript::Action(json!({"type": "hover", "selector": "#x"})),
        StepScript::Action(json!({"type": "stop", "reason": "done"})),
    ]);

    let response = runner(dir.path())
        .run(driver.clone(), agent, "run-invalid", &task(20, 30))
        .await;

    assert_eq!(response.metrics.invalid_actions, 2);
    assert_eq!(response.metrics.steps_taken, 3);
    // Nothing invalid ever reached the driver.
    assert!(driver.ops().is_empty());

    let events = read_events(dir.path(), "run-invalid");
    assert_eq!(events.len(), 3);
    assert!(!events[0].execution_result.success);
    assert_eq!(
        events[0].execution_result.error.as_deref(),
        Some("Click action missing 'selector' field")
    );
}

#[tokio::test]
async fn agent_call_failures_consume_budget_without_events() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::new(vec![
        StepScript::Fail,
        StepScript::Action(json!({"type": "stop", "reason": "done"})),
    ]);

    let response = runner(dir.path())
        .run(driver.clone(), agent, "run-callfail", &task(20, 30))
        .await;

    assert_eq!(response.metrics.steps_taken, 2);
    assert_eq!(response.metrics.timeouts, 0);
    assert_eq!(response.metrics.invalid_actions, 0);
    // Only the stop produced an event; the failed call just burned a step.
    assert_eq!(read_events(dir.path(), "run-callfail").len(), 1);
}

#[tokio::test]
async fn navigation_failure_is_fatal_with_zero_steps() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::failing_navigation();
    let agent = ScriptedAgent::repeating(vec![StepScript::Action(
        json!({"type": "stop", "reason": "done"}),
    )]);

    let response = runner(dir.path())
        .run(driver, agent, "run-nav", &task(20, 30))
        .await;

    assert!(!response.success);
    assert_eq!(response.metrics.steps_taken, 0);
    let error = response.error.expect("navigation failure must surface");
    assert!(error.contains("navigation failed"), "got: {error}");
}

#[tokio::test]
async fn run_timeout_aborts_but_still_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::new(vec![
        StepScript::Action(json!({"type": "scroll", "delta_y": 100})),
        StepScript::Hang,
    ]);

    let response = runner(dir.path())
        .run(driver, agent, "run-walltime", &task(20, 1))
        .await;

    assert!(!response.success);
    let error = response.error.expect("timeout must surface");
    assert!(error.contains("timed out"), "got: {error}");
    // The step before the hang is still visible in metrics and on disk.
    assert_eq!(response.metrics.steps_taken, 1);
    assert_eq!(read_events(dir.path(), "run-walltime").len(), 1);
}

#[tokio::test]
async fn matching_gold_trace_scores_one() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let mut task = task(20, 30);
    task.gold_actions = Some(vec![GoldAction {
        step: Some(0),
        kind: "click".into(),
        selector: Some("#product-3 .price".into()),
        text: None,
        value: None,
        delta_y: None,
    }]);

    let agent = ScriptedAgent::new(vec![
        StepScript::Action(json!({"type": "click", "selector": "#product-3 .price"})),
        StepScript::Action(json!({"type": "stop", "reason": "done"})),
    ]);

    let response = runner(dir.path())
        .run(driver, agent, "run-trace", &task)
        .await;

    assert_eq!(response.metrics.trace_match_ratio, Some(1.0));
    assert_eq!(response.metrics.steps_taken, 2);
}

#[tokio::test]
async fn artifacts_describe_the_event_log_and_screenshots() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(PRODUCT_HTML);
    let agent = ScriptedAgent::new(vec![StepScript::Action(
        json!({"type": "stop", "reason": "done"}),
    )]);

    let response = runner(dir.path())
        .run(driver, agent, "run-artifacts", &task(20, 30))
        .await;

    let artifacts = response.artifacts.expect("artifacts always described");
    assert!(artifacts.log_path.ends_with("events.jsonl"));
    assert!(std::path::Path::new(&artifacts.screenshots_dir).is_dir());
    assert!(artifacts.trace_zip.is_none());

    // The final report and markup land next to the event log.
    let run_dir = dir.path().join("run-artifacts");
    assert!(run_dir.join("report.json").exists());
    assert!(run_dir.join("final.html").exists());
}
