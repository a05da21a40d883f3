use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use agent_dispatch::api;
use agent_dispatch::commands::{self, CommandParser};
use agent_dispatch::config::{ApiConfig, SupervisorConfig};
use agent_dispatch::runtime::{AgentExecutor, AgentRuntime, SimulatedExecutor};
use agent_dispatch::supervisor::{Supervisor, SupervisorEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SupervisorConfig::from_env().context("Invalid supervisor configuration")?;
    let api_config = ApiConfig::from_env().context("Invalid API configuration")?;

    // ── Supervisor ────────────────────────────────────────────────────────

    let supervisor = Supervisor::from_config(&config)
        .await
        .context("Failed to build supervisor")?;

    // ── Event log ─────────────────────────────────────────────────────────

    let mut events = supervisor.event_stream();
    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => log_event(&event),
                Err(e) => warn!(error = %e, "Event logger lagged"),
            }
        }
    });

    // ── Agent runtimes ────────────────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor: Arc<dyn AgentExecutor> = Arc::new(SimulatedExecutor::new(config.simulated_latency));
    let mut runtimes = Vec::new();
    for agent_id in supervisor.agent_ids().await {
        let handle = supervisor.agent(&agent_id).await?;
        let runtime = AgentRuntime::new(handle, executor.clone(), config.idle_poll_interval);
        runtimes.push(runtime.spawn(shutdown_rx.clone()));
    }
    info!(agents = runtimes.len(), "Agent runtimes started");

    // ── Control API ───────────────────────────────────────────────────────

    if api_config.enabled {
        let app = api::router(supervisor.clone())
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_config.port))
            .await
            .with_context(|| format!("Failed to bind API port {}", api_config.port))?;
        info!(port = api_config.port, "Control API started");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Control API stopped");
            }
        });
    }

    // ── Console ───────────────────────────────────────────────────────────

    eprintln!("{}", commands::HELP);
    eprint!("> ");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Error reading stdin");
                break;
            }
        };

        match commands::execute(&supervisor, CommandParser::parse(&line)).await {
            Some(reply) => {
                if !reply.is_empty() {
                    println!("{reply}");
                }
                eprint!("> ");
            }
            None => break,
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    for runtime in runtimes {
        if let Err(e) = runtime.await {
            warn!(error = %e, "Agent runtime panicked");
        }
    }
    Ok(())
}

fn log_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::InstructionCompleted { agent_id, result, .. } => {
            info!(agent_id = %agent_id, explanation = %result.explanation, "Instruction completed");
        }
        SupervisorEvent::InstructionFailed { agent_id, error, .. } => {
            warn!(agent_id = %agent_id, error = %error, "Instruction failed");
        }
        other => debug!(kind = ?other.kind(), agent_id = other.agent_id(), "Supervisor event"),
    }
}
