//! Implementation of the `approvalflow sweep` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::adapters::sqlite::{initialize_database, SqliteTaskRepository, SqliteTemplateRepository};
use crate::adapters::webhook::WebhookNotifier;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{EventNotifier, TaskRepository, TemplateRepository};
use crate::services::WorkflowEngine;

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Seconds between sweeps (defaults to engine.sweep_interval_secs)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Run a single sweep and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct SweepOutput {
    pub timed_out: Vec<String>,
}

impl CommandOutput for SweepOutput {
    fn to_human(&self) -> String {
        if self.timed_out.is_empty() {
            return "No overdue tasks.".to_string();
        }
        let mut lines = vec![format!("{} task(s) timed out:", self.timed_out.len())];
        lines.extend(self.timed_out.iter().map(|id| format!("  - {id}")));
        lines.join("\n")
    }
}

pub async fn execute(args: SweepArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = initialize_database(&config.database)
        .await
        .context("Failed to open database")?;
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let template_repo = Arc::new(SqliteTemplateRepository::new(pool));

    let notifier = Arc::new(WebhookNotifier::start(&config.notifier, Arc::clone(&template_repo))?);
    let engine = WorkflowEngine::new(task_repo, template_repo)
        .with_notifier(Arc::clone(&notifier) as Arc<dyn EventNotifier>);

    let interval = Duration::from_secs(args.interval.unwrap_or(config.engine.sweep_interval_secs));
    let result = if args.once {
        sweep_once(&engine, json_mode).await
    } else {
        run_loop(&engine, interval, json_mode).await
    };

    notifier.shutdown().await;
    result
}

async fn sweep_once<T, P>(engine: &WorkflowEngine<T, P>, json_mode: bool) -> Result<()>
where
    T: TaskRepository,
    P: TemplateRepository,
{
    let timed_out = engine
        .sweep_timeouts()
        .await
        .context("Timeout sweep failed")?;
    tracing::info!(count = timed_out.len(), "Timeout sweep finished");
    output(
        &SweepOutput {
            timed_out: timed_out.iter().map(ToString::to_string).collect(),
        },
        json_mode,
    );
    Ok(())
}

async fn run_loop<T, P>(engine: &WorkflowEngine<T, P>, interval: Duration, json_mode: bool) -> Result<()>
where
    T: TaskRepository,
    P: TemplateRepository,
{
    tracing::info!(interval_secs = interval.as_secs(), "Timeout sweeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed pass is retried on the next tick.
                if let Err(e) = sweep_once(engine, json_mode).await {
                    tracing::error!(error = %format!("{e:#}"), "Timeout sweep failed");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                tracing::info!("Shutdown requested, stopping sweeper");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_output_human() {
        let none = SweepOutput { timed_out: vec![] };
        assert_eq!(none.to_human(), "No overdue tasks.");

        let some = SweepOutput {
            timed_out: vec!["a".into(), "b".into()],
        };
        assert_eq!(some.to_human(), "2 task(s) timed out:\n  - a\n  - b");
    }

    #[tokio::test]
    async fn test_execute_once_against_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("flow.db").display().to_string();

        execute(SweepArgs { interval: None, once: true }, &config, true)
            .await
            .unwrap();
    }
}
