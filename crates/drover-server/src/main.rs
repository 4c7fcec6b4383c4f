mod config;
mod serve;
mod shutdown;
#[cfg(test)]
mod test_util;

use clap::Parser;

use drover_core::agent::AgentRunner;
use drover_core::registry::ProcessRegistry;

use config::{CliOverrides, DroverConfig};
use serve::AppState;

#[derive(Parser)]
#[command(name = "drover", about = "HTTP API that drives a headless coding agent")]
struct Cli {
    /// Address to bind (overrides DROVER_BIND env var)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides PORT env var)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the agent entrypoint (overrides DROVER_AGENT_BIN env var)
    #[arg(long)]
    agent_bin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let resolved = DroverConfig::resolve(&CliOverrides {
        bind: cli.bind,
        port: cli.port,
        agent_bin: cli.agent_bin,
    })?;

    let runner = AgentRunner::new(
        resolved.agent_bin.clone(),
        resolved.agent_home.clone(),
        ProcessRegistry::new(),
    );
    let state = AppState {
        runner,
        fallback_api_key: resolved.fallback_api_key.clone(),
    };

    serve::run_serve(state, &resolved.bind, resolved.port, resolved.shutdown_grace).await
}
