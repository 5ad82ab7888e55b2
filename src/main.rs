use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use navbench::artifacts::ArtifactStore;
use navbench::runner::RunConfig;
use navbench::server::{self, AppState};
use navbench::tasks::TaskStore;
use navbench::types::AGENT_CALL_TIMEOUT_S;

#[derive(Parser)]
#[command(name = "navbench", version, about = "Web-navigation evaluation host")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Keyed JSON file of legacy task specs.
    #[arg(long, default_value = "data/tasks.json")]
    tasks: PathBuf,

    /// Directory of per-task benchmark JSON files. Falls back to the
    /// NAVBENCH_DATA_DIR environment variable.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Root directory for per-run artifacts.
    #[arg(long, default_value = "runs")]
    runs_dir: PathBuf,

    /// Per-call white-agent timeout in seconds.
    #[arg(long, default_value_t = AGENT_CALL_TIMEOUT_S)]
    agent_timeout_s: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().or_else(|| {
        std::env::var("NAVBENCH_DATA_DIR")
            .ok()
            .map(PathBuf::from)
    });

    let artifacts = ArtifactStore::new(&cli.runs_dir);
    artifacts.ensure_root()?;

    let state = Arc::new(AppState {
        tasks: TaskStore::new(&cli.tasks, data_dir),
        artifacts,
        runner_config: RunConfig::default(),
        agent_timeout: Duration::from_secs(cli.agent_timeout_s),
    });

    let listener = TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    info!(addr = %listener.local_addr()?, "navbench listening");
    server::serve(listener, state).await
}
