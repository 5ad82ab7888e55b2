//! The evaluation control loop: observe, ask the white agent, validate,
//! execute, record, all bounded by step and wall-clock budgets, then judge.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentConnector;
use crate::artifacts::{ArtifactStore, EventLog, RunPaths};
use crate::browser::PageDriver;
use crate::error::EvalError;
use crate::execute::ActionExecutor;
use crate::judge::{compute_trace_match, judge_final_success};
use crate::observe::{build_observation, observation_fingerprint};
use crate::types::{
    ACTION_TIMEOUT_MS, Action, ActRequest, ActionSpace, EventRecord, ExecutionResult,
    MAX_AGENT_TIMEOUTS, MAX_OBSERVED_ELEMENTS, RunArtifacts, RunMetrics, RunResponse, TaskSpec,
};

/// Markup persisted in place of the final page when a run aborts before it
/// can be captured.
const ABORTED_RUN_HTML: &str = "<html><body>Error occurred</body></html>";

#[derive(Clone)]
pub struct RunConfig {
    pub action_timeout: Duration,
    pub observe_cap: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_millis(ACTION_TIMEOUT_MS),
            observe_cap: MAX_OBSERVED_ELEMENTS,
        }
    }
}

/// Per-run counters, shared across the wall-clock timeout boundary so an
/// aborted run still reports how far it got.
#[derive(Default)]
struct RunCounters {
    steps: AtomicU32,
    timeouts: AtomicU32,
    invalid_actions: AtomicU32,
}

struct DriveOutcome {
    success: bool,
    trace_match_ratio: Option<f64>,
    final_html: String,
}

/// Owns one evaluation at a time. The orchestrator is handed its browser
/// session and agent connector explicitly; it holds no state between runs
/// beyond its configuration.
#[derive(Clone)]
pub struct EvalRunner {
    artifacts: ArtifactStore,
    config: RunConfig,
}

impl EvalRunner {
    pub fn new(artifacts: ArtifactStore, config: RunConfig) -> Self {
        Self { artifacts, config }
    }

    /// Execute one run to completion and always return a structured report.
    ///
    /// The entire evaluation, judging included, runs inside the task's
    /// wall-clock budget; exceeding it aborts the run rather than stopping
    /// it gracefully. The browser session is owned by this call and released
    /// on every exit path.
    pub async fn run(
        &self,
        driver: Arc<dyn PageDriver>,
        agent: Arc<dyn AgentConnector>,
        run_id: &str,
        task: &TaskSpec,
    ) -> RunResponse {
        let started = Instant::now();
        let counters = Arc::new(RunCounters::default());

        let paths = match self.artifacts.run_paths(run_id) {
            Ok(paths) => Some(paths),
            Err(e) => {
                warn!(run_id, error = %e, "artifact directory unavailable; run continues without a trail");
                None
            }
        };
        let mut event_log = match &paths {
            Some(paths) => EventLog::create(&paths.event_log),
            None => EventLog::disabled(),
        };

        let budget = Duration::from_secs(task.limits.timeout_s);
        let outcome = match tokio::time::timeout(
            budget,
            self.drive(
                driver.as_ref(),
                agent.as_ref(),
                run_id,
                task,
                &counters,
                &mut event_log,
                paths.as_ref(),
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EvalError::RunTimeout(task.limits.timeout_s)),
        };

        let metrics = RunMetrics {
            final_success: outcome.as_ref().map(|o| o.success).unwrap_or(false),
            steps_taken: counters.steps.load(Ordering::Relaxed),
            trace_match_ratio: outcome
                .as_ref()
                .ok()
                .and_then(|o| o.trace_match_ratio),
            wall_time_s: started.elapsed().as_secs_f64(),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
            invalid_actions: counters.invalid_actions.load(Ordering::Relaxed),
        };

        let response = RunResponse {
            run_id: run_id.to_string(),
            task_id: task.id.clone(),
            success: metrics.final_success,
            metrics,
            artifacts: paths.as_ref().map(|p| RunArtifacts {
                log_path: p.event_log.to_string_lossy().into_owned(),
                trace_zip: None,
                screenshots_dir: p.screenshots_dir.to_string_lossy().into_owned(),
                playwright_trace: None,
            }),
            error: outcome.as_ref().err().map(ToString::to_string),
        };

        if let Some(paths) = &paths {
            let final_html = match &outcome {
                Ok(o) => o.final_html.as_str(),
                Err(_) => ABORTED_RUN_HTML,
            };
            self.artifacts.save_run_outcome(paths, &response, final_html);
        }

        match &outcome {
            Ok(o) => info!(
                run_id,
                task_id = %task.id,
                success = o.success,
                steps = response.metrics.steps_taken,
                "run complete"
            ),
            Err(e) => warn!(run_id, task_id = %task.id, error = %e, "run failed"),
        }

        response
    }

    async fn drive(
        &self,
        driver: &dyn PageDriver,
        agent: &dyn AgentConnector,
        run_id: &str,
        task: &TaskSpec,
        counters: &RunCounters,
        event_log: &mut EventLog,
        paths: Option<&RunPaths>,
    ) -> Result<DriveOutcome, EvalError> {
        driver
            .goto(&task.start_url)
            .await
            .map_err(|e| EvalError::Navigation(format!("{e:#}")))?;

        let executor = ActionExecutor::new(self.config.action_timeout);
        let mut step_idx: u32 = 0;
        let mut executed: Vec<Action> = Vec::new();
        let mut exit_reason: Option<String> = None;

        while step_idx < task.limits.max_steps {
            let screenshot = paths.map(|p| p.screenshot_for_step(step_idx));
            let observation =
                build_observation(driver, self.config.observe_cap, screenshot.as_deref()).await;
            let observation_hash = observation_fingerprint(&observation);

            let request = ActRequest {
                run_id: run_id.to_string(),
                task_id: task.id.clone(),
                instruction: task.instruction.clone(),
                step_idx,
                observation,
                action_space: ActionSpace::default(),
            };

            let response = match agent.act(&request).await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    let timeouts = counters.timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        run_id,
                        step = step_idx,
                        timeouts,
                        "agent call timed out"
                    );
                    step_idx += 1;
                    counters.steps.store(step_idx, Ordering::Relaxed);
                    if timeouts >= MAX_AGENT_TIMEOUTS {
                        exit_reason = Some("too_many_timeouts".to_string());
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(run_id, step = step_idx, error = %e, "agent call failed");
                    step_idx += 1;
                    counters.steps.store(step_idx, Ordering::Relaxed);
                    continue;
                }
            };

            if let Some(thoughts) = &response.thoughts {
                debug!(run_id, step = step_idx, thoughts = %thoughts, "agent thoughts");
            }

            let action = match crate::validate::validate_action(&response.action) {
                Ok(action) => action,
                Err(reason) => {
                    counters.invalid_actions.fetch_add(1, Ordering::Relaxed);
                    warn!(run_id, step = step_idx, reason = %reason, "invalid action rejected");
                    let url = driver.url().await;
                    record_event(
                        event_log,
                        step_idx,
                        &observation_hash,
                        response.action.clone(),
                        ExecutionResult {
                            success: false,
                            error: Some(reason),
                            url,
                            stop_reason: None,
                        },
                    );
                    step_idx += 1;
                    counters.steps.store(step_idx, Ordering::Relaxed);
                    continue;
                }
            };

            if let Action::Stop { reason } = &action {
                // A stop consumes a step: a stop at step 0 yields exactly one
                // event record and steps_taken == 1.
                let url = driver.url().await;
                record_event(
                    event_log,
                    step_idx,
                    &observation_hash,
                    response.action.clone(),
                    ExecutionResult {
                        success: true,
                        error: None,
                        url,
                        stop_reason: Some(reason.clone()),
                    },
                );
                exit_reason = Some(format!("stop: {reason}"));
                executed.push(action);
                step_idx += 1;
                counters.steps.store(step_idx, Ordering::Relaxed);
                break;
            }

            let result = executor.execute(driver, &action).await;
            if let Some(error) = &result.error {
                debug!(run_id, step = step_idx, error = %error, "action failed");
            }
            record_event(
                event_log,
                step_idx,
                &observation_hash,
                response.action.clone(),
                result,
            );
            executed.push(action);
            step_idx += 1;
            counters.steps.store(step_idx, Ordering::Relaxed);
        }

        let exit_reason = exit_reason.unwrap_or_else(|| "max_steps_reached".to_string());
        info!(run_id, steps = step_idx, reason = %exit_reason, "step loop finished");

        let final_url = driver.url().await;
        let final_html = match driver.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(run_id, error = %e, "could not capture final markup");
                String::new()
            }
        };

        let success = judge_final_success(task, &final_html, &final_url);
        let trace_match_ratio = task
            .gold_actions
            .as_ref()
            .map(|gold| compute_trace_match(&executed, gold));

        Ok(DriveOutcome {
            success,
            trace_match_ratio,
            final_html,
        })
    }
}

fn record_event(
    event_log: &mut EventLog,
    step_idx: u32,
    observation_hash: &str,
    action: Value,
    execution_result: ExecutionResult,
) {
    let record = EventRecord {
        step_idx,
        timestamp: chrono::Utc::now(),
        observation_hash: observation_hash.to_string(),
        url: execution_result.url.clone(),
        action,
        execution_result,
    };
    event_log.append(&record);
}
