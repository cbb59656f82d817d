//! Poll loop of the active batch.

use super::controller::{Inner, Shared};
use crate::backend::SimulationBackend;
use crate::error::{OrchestratorError, Result};
use crate::model::{OrchestratorState, TaskStatus};
use crate::status::{ResultsRenderer, StatusSurface, IDLE_LABEL};
use std::sync::Weak;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

enum Cycle {
    Pending,
    Complete,
}

/// Sleep one interval, run one cycle, repeat until the batch completes, fails, or is cancelled.
///
/// Cycles are strictly sequential: the next sleep starts only after every response of the
/// previous cycle arrived. The loop only holds the orchestrator weakly, so it also ends once
/// every `Orchestrator` handle is gone.
pub(super) async fn run<B, S, R>(
    weak: Weak<Shared<B, S, R>>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()>
where
    B: SimulationBackend,
    S: StatusSurface,
    R: ResultsRenderer,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(shared) = weak.upgrade() else {
            return Ok(());
        };

        let mut inner = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            guard = shared.inner.lock() => guard,
        };
        // A stop may have cancelled us between the wake-up and acquiring the lock.
        if cancel.is_cancelled() {
            return Ok(());
        }

        match poll_cycle(&shared, &mut inner).await {
            Ok(Cycle::Pending) => {}
            Ok(Cycle::Complete) => return Ok(()),
            Err(e) => {
                error!(error = %e, "poll loop aborted");
                inner.state = OrchestratorState::Stalled;
                inner.poller = None;
                shared.status.set_control(IDLE_LABEL, true);
                shared.status.poll_failed(&e.to_string());
                return Err(e);
            }
        }
    }
}

async fn poll_cycle<B, S, R>(shared: &Shared<B, S, R>, inner: &mut Inner) -> Result<Cycle>
where
    B: SimulationBackend,
    S: StatusSurface,
    R: ResultsRenderer,
{
    inner.poll_cycles += 1;
    let cycle = inner.poll_cycles;
    let Some(batch) = inner.batch.as_mut() else {
        return Ok(Cycle::Complete);
    };

    let mut failure = None;
    for task in batch.tasks.iter_mut().filter(|t| !t.is_complete()) {
        match shared.backend.poll(&task.task_id).await {
            Ok(Some(result_id)) => {
                debug!(task_id = %task.task_id, %result_id, "simulation finished");
                task.status = TaskStatus::Complete(result_id);
            }
            Ok(None) => {}
            Err(source) => {
                failure = Some(OrchestratorError::Poll {
                    task_id: task.task_id.clone(),
                    source,
                });
                break;
            }
        }
    }

    let progress = batch.progress();
    debug!(cycle, %progress, "poll cycle finished");
    shared.status.set_progress(progress);
    if let Some(e) = failure {
        return Err(e);
    }

    if let Some(result_ids) = batch.result_ids() {
        inner.state = OrchestratorState::Completing;
        info!(?result_ids, cycles = cycle, "simulation batch complete");
        inner.batch = None;
        inner.poller = None;
        shared.renderer.render(result_ids);
        inner.state = OrchestratorState::Idle;
        shared.status.set_control(IDLE_LABEL, true);
        return Ok(Cycle::Complete);
    }

    if let Some(max) = shared.cfg.max_poll_cycles {
        if cycle >= max {
            return Err(OrchestratorError::PollLimitExceeded { cycles: cycle });
        }
    }
    Ok(Cycle::Pending)
}
