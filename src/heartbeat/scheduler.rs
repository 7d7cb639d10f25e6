//! Heartbeat scheduling: the periodic execution loop.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::heartbeat::active_hours::is_within_active_hours;
use crate::heartbeat::config::HeartbeatConfig;
use crate::heartbeat::executor::{HeartbeatExecutor, HeartbeatResult};

/// Async callback invoked with deliverable heartbeat results.
pub type AlertCallback = Arc<dyn Fn(HeartbeatResult) -> BoxFuture<'static, ()> + Send + Sync>;

/// Resolves the conversation a heartbeat should run in and deliver to.
/// Returning `None` skips the tick entirely.
pub type TargetResolver = Arc<dyn Fn() -> Option<i64> + Send + Sync>;

/// Everything one tick needs; cloned into the loop task.
#[derive(Clone)]
struct TickContext {
    config: HeartbeatConfig,
    executor: Arc<HeartbeatExecutor>,
    on_alert: Option<AlertCallback>,
    resolve_target: Option<TargetResolver>,
}

impl TickContext {
    /// One gated tick: resolve a target, check active hours, then execute.
    async fn tick(&self) {
        let target = match &self.resolve_target {
            Some(resolve) => match resolve() {
                Some(chat_id) => Some(chat_id),
                None => {
                    tracing::info!("Heartbeat skipped: no delivery target available");
                    return;
                }
            },
            None => None,
        };

        let within = is_within_active_hours(
            self.config.active_hours.as_deref(),
            &self.config.timezone,
            None,
        );
        match within {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Heartbeat skipped: outside active hours");
                return;
            }
            Err(e) => {
                // Config is validated at startup, so this is unexpected.
                tracing::error!("Heartbeat skipped: active hours check failed: {}", e);
                return;
            }
        }

        self.execute(target).await;
    }

    /// Execute the heartbeat and hand deliverable results to the alert
    /// callback. Failures are logged; nothing escapes a tick.
    async fn execute(&self, chat_id: Option<i64>) {
        let result = self.executor.run(chat_id).await;

        if !result.success {
            tracing::error!(
                "Heartbeat execution failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            return;
        }

        if result.should_deliver {
            if let Some(on_alert) = &self.on_alert {
                tracing::info!("Heartbeat alert triggered, delivering...");
                on_alert(result).await;
            } else {
                tracing::info!("Heartbeat deliverable but no alert callback configured");
            }
        } else if result.is_ok {
            tracing::info!("Heartbeat OK (suppressed, {} chars)", result.content.chars().count());
        } else {
            tracing::info!(
                "Heartbeat complete (is_ok={}, should_deliver={})",
                result.is_ok,
                result.should_deliver
            );
        }
    }
}

/// Schedules periodic heartbeat execution.
///
/// Runs one tick immediately on start, then once per configured interval.
/// Ticks never terminate the loop; only [`HeartbeatScheduler::stop`] does.
pub struct HeartbeatScheduler {
    context: TickContext,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    pub fn new(
        config: HeartbeatConfig,
        executor: Arc<HeartbeatExecutor>,
        on_alert: Option<AlertCallback>,
        resolve_target: Option<TargetResolver>,
    ) -> Self {
        Self {
            context: TickContext { config, executor, on_alert, resolve_target },
            task: None,
        }
    }

    /// Start the background loop. No-op when disabled or already running.
    pub fn start(&mut self) {
        if !self.context.config.enabled {
            tracing::info!("Heartbeat is disabled, not starting scheduler");
            return;
        }
        if self.task.is_some() {
            tracing::warn!("Heartbeat scheduler already running");
            return;
        }

        let interval = match self.context.config.interval() {
            Ok(interval) => interval,
            Err(e) => {
                // Settings validation makes this unreachable in practice.
                tracing::error!("Heartbeat not started: invalid interval: {}", e);
                return;
            }
        };

        let context = self.context.clone();
        self.task = Some(tokio::spawn(async move {
            let mut iteration: u64 = 0;
            loop {
                iteration += 1;
                tracing::debug!("Heartbeat loop iteration {} starting", iteration);
                context.tick().await;
                tokio::time::sleep(interval).await;
            }
        }));
        tracing::info!(
            "Heartbeat scheduler started with interval {}",
            self.context.config.every
        );
    }

    /// Whether the loop task is currently running.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the background loop and wait for it to wind down. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            tracing::info!("Heartbeat scheduler stopped");
        }
    }

    /// Run one heartbeat immediately, bypassing interval, target, and
    /// active-hours gating.
    pub async fn trigger(&self) {
        self.context.execute(None).await;
    }
}
