use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use autoscript_core::{
    normalize_script, resolve_config, validate, ExecutionContext, Executor, ExecutorOutcome,
    MockEvent, OperationExecutor, PartialRunnerConfig, Runner, WatchHandle, Watcher,
};
use autoscript_observability::{init_logging, NullObserver};
use autoscript_types::{Operation, Subscription, WatcherEvent};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "autoscript")]
#[command(about = "Headless autoscript runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, validate and run a script to completion.
    Run {
        script_path: PathBuf,
        #[arg(long)]
        events: Option<PathBuf>,
        #[arg(long)]
        profile_id: Option<String>,
        #[arg(long, default_value_t = false)]
        drain_on_exhaustion: bool,
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
    /// Normalize and statically validate a script without running it.
    Validate { script_path: PathBuf },
    /// Inspect the effective layered runtime configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let (config, _provenance) = resolve_config(&project_dir, PartialRunnerConfig::default())
        .context("resolving runtime configuration")?;
    init_logging(&config.log_level);

    match cli.command {
        Command::Run {
            script_path,
            events,
            profile_id,
            drain_on_exhaustion,
            snapshot_out,
        } => {
            run(
                &script_path,
                events.as_deref(),
                profile_id,
                drain_on_exhaustion,
                snapshot_out.as_deref(),
                &project_dir,
            )
            .await
        }
        Command::Validate { script_path } => validate_script(&script_path),
        Command::Config {
            command: ConfigCommand::Show,
        } => config_show(&project_dir),
    }
}

fn load_script_document(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {} as YAML", path.display()))
        }
        _ => serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display())),
    }
}

#[derive(serde::Deserialize)]
struct RawMockEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "subscriptionId")]
    subscription_id: Option<String>,
    selector: Option<String>,
    count: Option<u64>,
    #[serde(rename = "delayMs")]
    delay_ms: Option<u64>,
}

impl RawMockEvent {
    fn into_mock_event(self) -> MockEvent {
        MockEvent {
            kind: self.kind,
            subscription_id: self.subscription_id,
            selector: self.selector,
            count: self.count,
            delay_ms: self.delay_ms,
        }
    }
}

fn load_mock_events(path: &Path) -> anyhow::Result<Vec<MockEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading mock events file {}", path.display()))?;
    let parsed: Vec<RawMockEvent> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {} as a mock event array", path.display()))?;
    Ok(parsed.into_iter().map(RawMockEvent::into_mock_event).collect())
}

async fn run(
    script_path: &Path,
    events_path: Option<&Path>,
    profile_id_override: Option<String>,
    drain_on_exhaustion: bool,
    snapshot_out: Option<&Path>,
    project_dir: &Path,
) -> anyhow::Result<()> {
    let raw = load_script_document(script_path)?;
    let mut script = normalize_script(&raw);
    if let Some(profile_id) = profile_id_override {
        script.profile_id = profile_id;
    }

    let report = validate(&script);
    if !report.ok {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
        anyhow::bail!("script '{}' failed validation", script_path.display());
    }

    let (config, _) = resolve_config(project_dir, PartialRunnerConfig::default())?;
    let executor = Arc::new(OperationExecutor {
        executor: Arc::new(NoopExecutor),
        validator: None,
        checkpoint: None,
        mock_hook: None,
        skip_validation: true,
    });

    let runner = Runner::new(script, config, executor, Arc::new(NullObserver))?;
    let runner = match events_path {
        Some(path) => {
            let events = load_mock_events(path)?;
            runner.with_mock_feed(events, drain_on_exhaustion)
        }
        None => runner.with_watcher(Arc::new(StartupOnlyWatcher)),
    };

    runner.start(now_ms).await?;
    let done = runner.wait_done().await;
    tracing::info!(run_id = %done.run_id, reason = %done.reason, "run complete");

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let snapshot_json = serde_json::to_string_pretty(&envelope)?;
    match snapshot_out {
        Some(path) => std::fs::write(path, snapshot_json)
            .with_context(|| format!("writing snapshot to {}", path.display()))?,
        None => println!("{snapshot_json}"),
    }

    Ok(())
}

fn validate_script(script_path: &Path) -> anyhow::Result<()> {
    let raw = load_script_document(script_path)?;
    let script = normalize_script(&raw);
    let report = validate(&script);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn config_show(project_dir: &Path) -> anyhow::Result<()> {
    let (config, provenance) = resolve_config(project_dir, PartialRunnerConfig::default())?;
    let combined = serde_json::json!({
        "config": config,
        "provenance": provenance,
    });
    println!("{}", serde_json::to_string_pretty(&combined)?);
    Ok(())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Stands in for a real action executor when none is wired in: every
/// operation completes successfully with no data. Useful against a script
/// whose actions are inert (dry runs, scheduling-only scripts).
struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn execute_operation(
        &self,
        _profile_id: &str,
        _operation: &Operation,
        _context: &ExecutionContext,
    ) -> ExecutorOutcome {
        ExecutorOutcome::success(Value::Null)
    }
}

/// The CLI's default event source when `--events` isn't given: never reports
/// a subscription event, so only the runner's synthesized `startup` event
/// drives scheduling.
struct StartupOnlyWatcher;

#[async_trait]
impl Watcher for StartupOnlyWatcher {
    async fn watch_subscriptions(
        &self,
        _profile_id: &str,
        _subscriptions: &[Subscription],
        _throttle_ms: u64,
        _on_event: Arc<dyn Fn(WatcherEvent) + Send + Sync>,
        _on_error: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Box<dyn WatchHandle> {
        Box::new(NoopWatchHandle)
    }
}

struct NoopWatchHandle;

impl WatchHandle for NoopWatchHandle {
    fn stop(&self) {}
}
