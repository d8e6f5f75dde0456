use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cohost::config::VoiceBackend;
use cohost::decision::gateway::DecisionService;
use cohost::inputs::console;
use cohost::outputs::console::{ConsoleAvatar, ConsoleVoice};
use cohost::outputs::say::SayVoice;
use cohost::outputs::OutputCollaborator;
use cohost::services::llm::LlmDecisionService;
use cohost::{CohostConfig, Event, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let config = CohostConfig::load().context("Invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    info!("Co-host booting...");

    let service: Arc<dyn DecisionService> = Arc::new(LlmDecisionService::new(&config.llm)?);
    let speech: Arc<dyn OutputCollaborator> = match config.voice {
        VoiceBackend::Console => Arc::new(ConsoleVoice::new()),
        VoiceBackend::Say => Arc::new(SayVoice::new("say")),
    };
    let avatar: Arc<dyn OutputCollaborator> = Arc::new(ConsoleAvatar::new());

    let orchestrator = Orchestrator::new(&config, service, speech, avatar);
    let queue = orchestrator.queue();

    let input = console::spawn_reader(tokio::io::stdin(), queue.clone());

    let ctrl_c_queue = queue.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = ctrl_c_queue.push(Event::shutdown("signal")) {
                warn!("Shutdown not queued: {}", e);
            }
        }
    });

    println!("Co-host active. Type `chat <name>: <text>`, `mention <name>: <text>`, `> <speech>`, `screen: <text>` or `quit`.");

    let report = orchestrator.run().await;
    input.abort();

    info!(
        "Stopped ({:?}): {} completed, {} interrupted, {} stale completions",
        report.phase, report.completed_actions, report.interruptions, report.stale_completions
    );
    info!("Queue: {:?}", report.queue);
    info!("Telemetry: {:?}", report.telemetry);
    Ok(())
}
