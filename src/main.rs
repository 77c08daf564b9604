use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use star_triage::compose::LlmComposer;
use star_triage::config::TriageConfig;
use star_triage::llm::{LlmConfig, create_provider};
use star_triage::mail::JsonMailStore;
use star_triage::pipeline::ThreadProcessor;

/// Exit code when a reply went out but its conversation is still starred.
const EXIT_NEEDS_ATTENTION: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing; keep the appender guard alive until exit.
    let log_dir = std::env::var("TRIAGE_LOG_DIR").ok();
    let (file_layer, _guard) = match log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    let config = TriageConfig::from_env().context("invalid triage configuration")?;
    let llm_config = LlmConfig::from_env().context("invalid LLM configuration")?;

    let snapshot_path =
        std::env::var("TRIAGE_SNAPSHOT_PATH").unwrap_or_else(|_| "./data/mailbox.json".to_string());

    eprintln!("📬 Star Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent: {}", config.agent_identity.address());
    eprintln!("   Mode: {}", config.mode);
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Mailbox: {}", snapshot_path);
    if let Some(ref dir) = log_dir {
        eprintln!("   Logs: {}/triage.log", dir);
    }
    eprintln!();

    let store = JsonMailStore::open(&snapshot_path, config.agent_identity.clone())
        .await
        .with_context(|| format!("failed to open mailbox snapshot at {snapshot_path}"))?;

    let llm = create_provider(&llm_config);
    let composer = LlmComposer::new(llm).with_persona(config.persona.clone());

    let processor = ThreadProcessor::from_config(&config, Arc::new(store), Arc::new(composer))?;

    // Ctrl-C stops new conversations; delivered replies still get unstarred.
    let shutdown = processor.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, finishing in-flight conversations");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    let report = processor.run_once().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let flagged = report.needs_attention();
    if !flagged.is_empty() {
        warn!(
            count = flagged.len(),
            "Conversations need operator attention (replied but still starred)"
        );
        return Ok(ExitCode::from(EXIT_NEEDS_ATTENTION));
    }

    info!("Done");
    Ok(ExitCode::SUCCESS)
}
