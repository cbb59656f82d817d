use crate::backend::{HttpBackend, SimulationBackend};
use crate::model::{
    BatchReport, DispatchFailurePolicy, OrchestratorEvent, ResultId, RunConfig, Scenario,
    DEFAULT_SCENARIOS, DEFAULT_SIMULATION_SCENARIO,
};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "renovation-optimizer",
    version,
    about = "Run renovation-scenario simulations on the heat advisory backend"
)]
pub struct Cli {
    /// Base URL of the advisory web application
    #[arg(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Renovation scenario to simulate (repeat for several; defaults to scenario1..scenario3)
    #[arg(long = "scenario", value_name = "LABEL")]
    pub scenarios: Vec<String>,

    /// JSON file holding an array of renovation scenario labels
    #[arg(long, conflicts_with = "scenarios")]
    pub scenarios_file: Option<std::path::PathBuf>,

    /// Scenario tag the backend runs the simulations under
    #[arg(long, default_value = DEFAULT_SIMULATION_SCENARIO)]
    pub simulation_scenario: String,

    /// Pause between two poll cycles
    #[arg(long, default_value = "5s")]
    pub poll_interval: humantime::Duration,

    /// Give up after this many poll cycles (unbounded when omitted)
    #[arg(long)]
    pub max_poll_cycles: Option<u32>,

    /// Leave already dispatched simulations running when a later dispatch fails
    #[arg(long)]
    pub no_rollback: bool,

    /// Timeout for each backend request
    #[arg(long, default_value = "90s")]
    pub request_timeout: humantime::Duration,

    /// Session id of a logged-in advisory session (sent as the `sessionid` cookie)
    #[arg(long, env = "SESSION_ID", hide_env_values = true)]
    pub session_id: Option<String>,

    /// Print the batch report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Scenario labels from the flags, a scenarios file, or the built-in defaults.
fn resolve_scenarios(args: &Cli) -> Result<Vec<Scenario>> {
    if !args.scenarios.is_empty() {
        return Ok(args.scenarios.iter().map(Scenario::new).collect());
    }
    if let Some(path) = args.scenarios_file.as_deref() {
        return load_scenarios(path);
    }
    Ok(DEFAULT_SCENARIOS.iter().map(|s| Scenario::new(*s)).collect())
}

fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenarios file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("scenarios file {} is not a JSON array of labels", path.display()))
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<RunConfig> {
    Ok(RunConfig {
        base_url: args.base_url.clone(),
        simulation_scenario: args.simulation_scenario.clone(),
        scenarios: resolve_scenarios(args)?,
        poll_interval: Duration::from(args.poll_interval),
        max_poll_cycles: args.max_poll_cycles,
        dispatch_failure_policy: if args.no_rollback {
            DispatchFailurePolicy::Abort
        } else {
            DispatchFailurePolicy::Rollback
        },
        request_timeout: Duration::from(args.request_timeout),
        session_id: args.session_id.clone(),
        user_agent: format!("renovation-optimizer/{}", env!("CARGO_PKG_VERSION")),
    })
}

type EventTx = mpsc::UnboundedSender<OrchestratorEvent>;

/// Start the batch and follow its events until the results hand-off, a poll failure or `cancel`.
///
/// `cancel` is watched from before the first dispatch. Every exit except the hand-off stops the
/// batch, so no simulation is left running on the backend.
async fn drive_batch<B, C>(
    orchestrator: &Orchestrator<B, EventTx, EventTx>,
    evt_rx: &mut mpsc::UnboundedReceiver<OrchestratorEvent>,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    cancel: C,
) -> Result<Vec<ResultId>>
where
    B: SimulationBackend,
    C: Future,
{
    tokio::pin!(cancel);

    let start = orchestrator.start();
    tokio::pin!(start);
    let cancelled_during_dispatch = tokio::select! {
        res = &mut start => {
            res.context("optimization could not be started")?;
            false
        }
        _ = &mut cancel => true,
    };

    let outcome: Result<Vec<ResultId>> = if cancelled_during_dispatch {
        let _ = out_tx.send(OutputLine::Stderr("Cancelling…".into()));
        // Dropping the dispatch would lose the task ids it already got; let it finish so the
        // stop below sees the whole batch.
        if let Err(e) = start.await {
            warn!(error = %e, "dispatch failed while cancelling");
        }
        Err(anyhow::anyhow!("optimization cancelled"))
    } else {
        loop {
            tokio::select! {
                ev = evt_rx.recv() => match ev {
                    Some(OrchestratorEvent::Progress(p)) => {
                        let _ = out_tx.send(OutputLine::Stderr(p.to_string()));
                    }
                    Some(OrchestratorEvent::Message(msg)) => {
                        let _ = out_tx.send(OutputLine::Stderr(msg));
                    }
                    Some(OrchestratorEvent::ControlChanged { label, enabled }) => {
                        debug!(%label, enabled, "control changed");
                    }
                    Some(OrchestratorEvent::PanelVisibility(_)) => {}
                    Some(OrchestratorEvent::ResultsReady(ids)) => break Ok(ids),
                    Some(OrchestratorEvent::PollFailed(msg)) => {
                        break Err(anyhow::anyhow!("polling stopped: {msg}"));
                    }
                    None => break Err(anyhow::anyhow!("orchestrator event stream closed")),
                },
                _ = &mut cancel => {
                    let _ = out_tx.send(OutputLine::Stderr("Cancelling…".into()));
                    break Err(anyhow::anyhow!("optimization cancelled"));
                }
            }
        }
    };

    if outcome.is_err() {
        // Do not leave simulations running server-side.
        if let Err(stop_err) = orchestrator.stop().await {
            warn!(error = %stop_err, "could not terminate all simulations");
        }
    }
    outcome
}

/// Run one batch to completion, printing progress to stderr and the report to stdout.
pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let backend = HttpBackend::new(&cfg)?;
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<OrchestratorEvent>();
    let orchestrator = Orchestrator::new(
        backend,
        evt_tx.clone(),
        evt_tx,
        OrchestratorConfig::from(&cfg),
    );
    let (out_tx, out_handle) = spawn_output_writer();

    let started = tokio::time::Instant::now();
    info!(scenarios = cfg.scenarios.len(), base_url = %cfg.base_url, "starting optimization");
    let outcome = drive_batch(&orchestrator, &mut evt_rx, &out_tx, tokio::signal::ctrl_c()).await;

    let result_ids = match outcome {
        Ok(ids) => ids,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    let report = BatchReport {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        base_url: cfg.base_url.clone(),
        scenarios: cfg.scenarios.clone(),
        result_ids,
        poll_cycles: orchestrator.poll_cycles().await,
        elapsed: started.elapsed(),
    };

    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
