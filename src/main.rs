//! Courier entry point: validates configuration, wires the components, and
//! serves the webhook until shutdown.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use courier::agent::{
    AgentConnector, ExecutorOptions, ProcessAgentConnector, SessionExecutor, load_memory_prompt,
};
use courier::channels::{GatewayContext, TelegramChannel, router};
use courier::heartbeat::{
    AlertCallback, HeartbeatDelivery, HeartbeatExecutor, HeartbeatScheduler, TargetResolver,
};
use courier::history::ChatHistoryStore;
use courier::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Telegram gateway to a coding agent")]
struct Cli {
    /// Validate configuration and exit without serving.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("courier=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting courier - Telegram gateway");

    let settings = Settings::from_env().context("failed to load settings")?;
    let errors = settings.validate_ready();
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("Configuration error: {}", error);
        }
        anyhow::bail!("configuration is not ready ({} error(s))", errors.len());
    }

    tracing::info!("Workspace: {}", settings.workspace_dir.display());
    tracing::info!("Agent binary: {}", settings.agent_binary.display());
    tracing::info!("Allowed users: {:?}", settings.allowed_user_ids);
    tracing::info!("Webhook path: {}", settings.webhook_path);

    let settings = Arc::new(settings);

    let memory_prompt = load_memory_prompt(&settings.memory_path())
        .context("failed to read memory directory")?;
    if memory_prompt.is_some() {
        tracing::info!("Loaded memory priming from {}", settings.memory_path().display());
    }

    let connector: Arc<dyn AgentConnector> =
        Arc::new(ProcessAgentConnector::new(&settings.agent_binary)?);

    let mut options = ExecutorOptions::new(&settings.workspace_dir);
    options.model = settings.agent_model.clone();
    options.memory_prompt = memory_prompt.clone();
    let executor = Arc::new(SessionExecutor::new(connector.clone(), options)?);

    let telegram = Arc::new(TelegramChannel::new(settings.bot_token.clone()));
    let history = Arc::new(ChatHistoryStore::new(settings.history_path()));
    let delivery =
        Arc::new(HeartbeatDelivery::new(telegram.clone(), settings.heartbeat.target.clone()));

    // Heartbeat can run on a cheaper model; that needs its own executor so
    // user conversations keep theirs.
    let heartbeat_core = match &settings.heartbeat.model {
        Some(model) if settings.agent_model.as_deref() != Some(model.as_str()) => {
            let mut options = ExecutorOptions::new(&settings.workspace_dir);
            options.model = Some(model.clone());
            options.memory_prompt = memory_prompt;
            Arc::new(SessionExecutor::new(connector, options)?)
        }
        _ => executor.clone(),
    };

    let heartbeat_executor = Arc::new(HeartbeatExecutor::new(
        settings.heartbeat.clone(),
        heartbeat_core.clone(),
        Some(settings.checklist_path()),
    ));

    let on_alert: AlertCallback = {
        let delivery = delivery.clone();
        Arc::new(move |result| {
            let delivery = delivery.clone();
            Box::pin(async move { delivery.deliver(&result).await })
        })
    };
    let resolve_target: TargetResolver = {
        let delivery = delivery.clone();
        Arc::new(move || delivery.target_chat())
    };

    let mut scheduler = HeartbeatScheduler::new(
        settings.heartbeat.clone(),
        heartbeat_executor,
        Some(on_alert),
        Some(resolve_target),
    );

    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    scheduler.start();

    let context = Arc::new(GatewayContext::new(
        settings.clone(),
        executor.clone(),
        telegram,
        history,
        delivery,
    ));
    let app = router(context);

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Webhook server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server error")?;

    tracing::info!("Shutting down");
    scheduler.stop().await;
    executor.shutdown().await;
    if !Arc::ptr_eq(&heartbeat_core, &executor) {
        heartbeat_core.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
