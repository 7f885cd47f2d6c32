use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use spindle_core::app::{AppBuilder, DispatcherSettings, ReaperLoop, WorkerGroup};
use spindle_core::automate::{
    AutomateService, ContractEventHandler, ContractMetric, EthereumAutomateRun, EthereumBalance,
    EthereumGasPrice, Evaluator, Executor, Notification, RunSettings, ScheduleCondition,
    ScheduleTick, ScheduleTickHandler, TransactionRunHandler, TriggerRunHandler, TriggerRunner,
};
use spindle_core::automate::{ContractEvent, TransactionRun, TriggerRun};
use spindle_core::config::SpindleConfig;
use spindle_core::domain::{PushOptions, PushOutcome, TaskType};
use spindle_core::impls::InMemoryAutomateStore;
use spindle_core::ports::{Clock, SystemClock, TaskStore};
use spindle_core::queue::{InMemoryTaskStore, SqliteTaskStore};
use spindle_core::typed::Task;

mod adapters;
mod rules;

use adapters::{LoggingChain, LoggingNotifier};

/// Durable task queue and automation rule runner.
#[derive(Parser, Debug)]
#[command(name = "spindle", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run workers, the reaper and the schedule tick until Ctrl-C.
    Run {
        /// JSON file with trigger definitions.
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Enqueue one task in the durable store.
    Push {
        handler: String,
        /// Params as a JSON document.
        params: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        collision_sign: Option<String>,
        #[arg(long)]
        delay_secs: Option<u64>,
    },
    /// Print task counts by status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SpindleConfig::load(path)?,
        None => SpindleConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    match cli.command {
        Command::Run { rules } => run(config, clock, rules).await,
        Command::Push {
            handler,
            params,
            priority,
            topic,
            collision_sign,
            delay_secs,
        } => {
            let store = durable_store(&config, clock.clone())?;
            let handler: TaskType = handler.parse()?;
            let params: serde_json::Value =
                serde_json::from_str(&params).context("params must be a JSON document")?;

            let mut options = PushOptions::default()
                .with_priority(priority)
                .with_topic(topic.unwrap_or_else(|| config.automate.topic.clone()));
            if let Some(sign) = collision_sign {
                options = options.with_collision_sign(sign);
            }
            if let Some(secs) = delay_secs {
                let delay = chrono::Duration::try_seconds(i64::try_from(secs)?)
                    .context("delay out of range")?;
                options = options.with_start_at(clock.now() + delay);
            }

            match store.push(handler.as_str(), params, options).await? {
                PushOutcome::Queued(task) => println!("queued {}", task.id),
                PushOutcome::Collided { task, existing } => {
                    println!("collided {} (in flight: {existing})", task.id)
                }
            }
            Ok(())
        }
        Command::Status => {
            let store = durable_store(&config, clock)?;
            let counts = store.counts_by_status().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            Ok(())
        }
    }
}

fn durable_store(config: &SpindleConfig, clock: Arc<dyn Clock>) -> Result<SqliteTaskStore> {
    let Some(path) = &config.storage.path else {
        bail!("storage.path is not configured; push/status need the durable store");
    };
    SqliteTaskStore::open(path, clock).with_context(|| format!("failed to open {}", path.display()))
}

async fn run(config: SpindleConfig, clock: Arc<dyn Clock>, rules: Option<PathBuf>) -> Result<()> {
    let tasks: Arc<dyn TaskStore> = match &config.storage.path {
        Some(_) => Arc::new(durable_store(&config, clock.clone())?),
        None => {
            tracing::warn!("storage.path not set, tasks are kept in memory");
            Arc::new(InMemoryTaskStore::new(clock.clone()))
        }
    };
    let automate = Arc::new(InMemoryAutomateStore::new());
    let chain = Arc::new(LoggingChain);

    let mut evaluator = Evaluator::new();
    evaluator.register(ScheduleCondition::new(clock.clone()))?;
    evaluator.register(EthereumBalance::new(chain.clone()))?;
    evaluator.register(EthereumGasPrice::new(chain.clone()))?;
    evaluator.register(ContractMetric::new(chain.clone()))?;
    let evaluator = Arc::new(evaluator);

    let mut executor = Executor::new();
    executor.register(Notification::new(Arc::new(LoggingNotifier)))?;
    executor.register(EthereumAutomateRun::new(tasks.clone(), config.automate.topic.clone()))?;
    let executor = Arc::new(executor);

    let runner = Arc::new(TriggerRunner::new(
        automate.clone(),
        evaluator.clone(),
        executor.clone(),
        clock.clone(),
        config.automate.max_trigger_retries,
    ));
    let settings = RunSettings {
        topic: config.automate.topic.clone(),
        priority: config.automate.run_priority,
    };

    let app = AppBuilder::new()
        .register::<TriggerRun, _>(TriggerRunHandler::new(runner))?
        .register::<ScheduleTick, _>(ScheduleTickHandler::new(
            automate.clone(),
            tasks.clone(),
            settings.clone(),
            config.automate.tick_interval(),
        ))?
        .register::<ContractEvent, _>(ContractEventHandler::new(
            automate.clone(),
            tasks.clone(),
            settings,
        ))?
        .register::<TransactionRun, _>(TransactionRunHandler::new(
            chain.clone(),
            config.automate.transaction_poll(),
        ))?
        .expect_tasks(&TaskType::ALL)
        .build()?;

    if let Some(path) = rules {
        let service = AutomateService::new(automate.clone(), evaluator, executor, chain, clock.clone());
        let loaded = rules::install(&service, rules::read(&path)?).await?;
        tracing::info!(loaded, path = %path.display(), "rules loaded");
    }

    let tick = PushOptions::default()
        .watcher()
        .with_topic(config.automate.topic.clone())
        .with_collision_sign(ScheduleTick::collision_sign());
    let raw = serde_json::to_value(ScheduleTick {})?;
    if let PushOutcome::Collided { existing, .. } = tasks.push(ScheduleTick::TYPE.as_str(), raw, tick).await? {
        tracing::debug!(%existing, "schedule tick already armed");
    }

    let dispatcher = app.dispatcher(
        tasks.clone(),
        Arc::new(config.queue.decider()),
        clock.clone(),
        DispatcherSettings {
            topics: config.queue.topics.clone(),
            handler_timeout: config.queue.handler_timeout(),
            poll_interval: config.queue.poll_interval(),
        },
    );
    let workers = WorkerGroup::spawn(config.queue.workers, Arc::new(dispatcher));

    let (reaper_tx, reaper_rx) = watch::channel(false);
    let reaper = ReaperLoop::new(
        tasks,
        clock,
        config.queue.stale_after(),
        config.queue.reap_interval(),
    )
    .with_retention(config.queue.retention());
    let reaper = tokio::spawn(reaper.run(reaper_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    let _ = reaper_tx.send(true);
    workers.shutdown_and_join().await;
    reaper.await?;
    Ok(())
}
