//! HTTP surface of the evaluation host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::WhiteAgentClient;
use crate::artifacts::ArtifactStore;
use crate::browser::ChromeSession;
use crate::error::EvalError;
use crate::runner::EvalRunner;
use crate::tasks::{TaskStore, task_from_run_request};
use crate::types::{
    HealthResponse, Report, ResetResponse, RunMetrics, RunRequest, RunResponse, TaskRequest,
};
use crate::{legacy, runner};

pub struct AppState {
    pub tasks: TaskStore,
    pub artifacts: ArtifactStore,
    pub runner_config: runner::RunConfig,
    pub agent_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/reset", post(reset_handler))
        .route("/run", post(run_handler))
        .route("/task", post(task_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: SharedState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "navbench",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "reset": "/reset",
            "run": "/run",
            "task": "/task"
        }
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn reset_handler(State(state): State<SharedState>) -> Json<ResetResponse> {
    state.tasks.reset();
    let reset = match state.artifacts.ensure_root() {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "reset could not recreate runs directory");
            false
        }
    };
    Json(ResetResponse { reset })
}

/// Evaluate one task with the first listed white agent. The caller always
/// receives a structured `RunResponse`; run-level failures are reported in
/// its `error` field rather than as HTTP errors.
async fn run_handler(
    State(state): State<SharedState>,
    Json(request): Json<RunRequest>,
) -> Json<RunResponse> {
    // Callers may leave the run id blank; every run still gets a unique
    // artifact directory.
    let run_id = if request.run_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        request.run_id.clone()
    };

    let task = match task_from_run_request(&request, &state.tasks) {
        Ok(task) => task,
        Err(e) => return Json(error_response(&run_id, &request, e)),
    };

    let Some(agent_ref) = request.white_agents.first() else {
        return Json(error_response(
            &run_id,
            &request,
            EvalError::SpecInvalid("no white agents provided".to_string()),
        ));
    };

    info!(
        run_id = %run_id,
        task_id = %task.id,
        agent = %agent_ref.name,
        "starting run"
    );

    let session = match ChromeSession::launch().await {
        Ok(session) => session,
        Err(e) => {
            return Json(error_response(
                &run_id,
                &request,
                EvalError::Session(format!("{e:#}")),
            ));
        }
    };

    let agent = WhiteAgentClient::new(&agent_ref.url, state.agent_timeout);
    let eval = EvalRunner::new(state.artifacts.clone(), state.runner_config.clone());
    let response = eval
        .run(Arc::new(session), Arc::new(agent), &run_id, &task)
        .await;
    Json(response)
}

async fn task_handler(
    State(state): State<SharedState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<Report>, (StatusCode, String)> {
    match legacy::execute_task(&state.tasks, &state.artifacts, &request.task_id).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ EvalError::SpecInvalid(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!(task_id = %request.task_id, error = %e, "legacy task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Task execution failed: {e}"),
            ))
        }
    }
}

/// A run that failed before its loop produced anything still yields a full
/// response shape with zeroed metrics.
fn error_response(run_id: &str, request: &RunRequest, error: EvalError) -> RunResponse {
    RunResponse {
        run_id: run_id.to_string(),
        task_id: request.task.task_id.clone(),
        success: false,
        metrics: RunMetrics {
            final_success: false,
            steps_taken: 0,
            trace_match_ratio: None,
            wall_time_s: 0.0,
            timeouts: 0,
            invalid_actions: 0,
        },
        artifacts: None,
        error: Some(error.to_string()),
    }
}
