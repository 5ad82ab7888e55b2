//! navbench: an evaluation harness that drives remote white agents through
//! web-navigation tasks, records every step, and deterministically judges
//! the outcome.

pub mod agent;
pub mod artifacts;
pub mod browser;
pub mod dom;
pub mod error;
pub mod execute;
pub mod judge;
pub mod legacy;
pub mod observe;
pub mod runner;
pub mod server;
pub mod tasks;
pub mod types;
pub mod validate;

pub use agent::{AgentConnector, WhiteAgentClient};
pub use artifacts::ArtifactStore;
pub use browser::{ChromeSession, PageDriver};
pub use error::{AgentCallError, EvalError};
pub use execute::ActionExecutor;
pub use judge::{compute_trace_match, judge_final_success, judge_outcome};
pub use observe::{build_observation, observation_fingerprint};
pub use runner::{EvalRunner, RunConfig};
pub use tasks::{TaskStore, validate_task_spec};
pub use types::{
    Action, ActRequest, ActResponse, EventRecord, ExecutionResult, Observation, Report,
    RunMetrics, RunRequest, RunResponse, TaskSpec,
};
pub use validate::validate_action;
