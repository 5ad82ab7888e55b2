//! Legacy single-task evaluation: a scripted extraction pass against the
//! task's expected selector, judged with the css/regex/domain rules. Kept
//! for callers of the older `/task` endpoint.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::browser::{ChromeSession, PageDriver};
use crate::error::EvalError;
use crate::judge::judge_outcome;
use crate::tasks::{TaskStore, validate_task_spec};
use crate::types::{Report, ScriptedRunResult, TaskSpec};

/// Timeout for locating the expected element during extraction.
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(5);

/// Load, execute, and judge one legacy task. Returns `SpecInvalid` for
/// unknown or malformed tasks; any browser-level failure is folded into the
/// scripted result and judged as-is.
pub async fn execute_task(
    store: &TaskStore,
    artifacts: &ArtifactStore,
    task_id: &str,
) -> Result<Report, EvalError> {
    let task = store
        .load(task_id)
        .map_err(|e| EvalError::SpecInvalid(format!("failed to load task '{task_id}': {e:#}")))?;
    validate_task_spec(&task).map_err(EvalError::SpecInvalid)?;

    let session = ChromeSession::launch()
        .await
        .map_err(|e| EvalError::Session(format!("{e:#}")))?;
    let driver: &dyn PageDriver = &session;

    let budget = Duration::from_secs(task.limits.timeout_s);
    let result = match tokio::time::timeout(budget, scripted_extraction(driver, &task)).await {
        Ok(result) => result,
        Err(_) => ScriptedRunResult {
            answer_text: String::new(),
            evidence_selector: expected_css(&task),
            actions: vec![format!("timeout after {}s", task.limits.timeout_s)],
            final_url: task.start_url.clone(),
            duration_sec: budget.as_secs_f64(),
        },
    };

    let final_html = driver.html().await.unwrap_or_default();
    let screenshot = driver.screenshot_png().await.unwrap_or_default();

    let (success, metrics, mut evidence) = judge_outcome(&task, &result, &final_html);
    evidence.screenshot = artifacts
        .root()
        .join(&task.id)
        .join("snap.png")
        .to_string_lossy()
        .into_owned();

    let report = Report {
        task_id: task.id.clone(),
        success,
        metrics,
        evidence,
        logs: result.actions.clone(),
    };

    if let Err(e) =
        artifacts.save_legacy_artifacts(&task.id, &report, &final_html, &screenshot, &result.actions)
    {
        warn!(task_id = %task.id, error = %e, "failed to save task artifacts");
    }

    info!(task_id = %task.id, success, steps = report.metrics.step_count, "legacy task judged");
    Ok(report)
}

fn expected_css(task: &TaskSpec) -> String {
    task.expected
        .as_ref()
        .map(|e| e.css.clone())
        .unwrap_or_default()
}

async fn scripted_extraction(driver: &dyn PageDriver, task: &TaskSpec) -> ScriptedRunResult {
    let started = Instant::now();
    let css = expected_css(task);
    let mut actions = Vec::new();
    let mut answer_text = String::new();
    let mut final_url = task.start_url.clone();

    match driver.goto(&task.start_url).await {
        Ok(()) => {
            actions.push(format!("goto {}", task.start_url));

            // Counting tasks answer with the number of matching elements;
            // everything else extracts the first match's text.
            if task.instruction.to_lowercase().contains("count") {
                match driver.count_matches(&css).await {
                    Ok(n) => {
                        answer_text = n.to_string();
                        actions.push(format!("count {css} => {answer_text}"));
                    }
                    Err(e) => actions.push(format!("count {css} => (error: {e:#})")),
                }
            } else {
                match driver.text_content(&css, EXTRACT_TIMEOUT).await {
                    Ok(Some(text)) => {
                        answer_text = text.trim().to_string();
                        actions.push(format!("extract {css} => {answer_text}"));
                    }
                    Ok(None) => actions.push(format!("extract {css} => (not found)")),
                    Err(e) => actions.push(format!("extract {css} => (error: {e:#})")),
                }
            }

            final_url = driver.url().await;
        }
        Err(e) => {
            actions.push(format!("error: {e:#}"));
        }
    }

    ScriptedRunResult {
        answer_text,
        evidence_selector: css,
        actions,
        final_url,
        duration_sec: started.elapsed().as_secs_f64(),
    }
}
