//! Write-only status surface and results hand-off.
//!
//! The orchestrator never reads UI state back; it pushes updates through these traits.
//! Both are implemented for an event channel so presentation layers consume a single
//! stream of [`OrchestratorEvent`]s.

use crate::model::{OrchestratorEvent, Progress, ResultId};
use tokio::sync::mpsc::UnboundedSender;

pub const IDLE_LABEL: &str = "Start optimization";
pub const STARTED_LABEL: &str = "Optimization started...";

pub trait StatusSurface: Send + Sync + 'static {
    fn set_control(&self, label: &str, enabled: bool);
    fn set_panel_visible(&self, visible: bool);
    fn set_progress(&self, progress: Progress);
    /// Free-form notices (poll failures, rollback outcomes).
    fn notify(&self, _message: &str) {}
    /// The poll loop gave up; the batch needs an explicit stop or restart.
    fn poll_failed(&self, _message: &str) {}
}

/// Receives the ordered result ids of a fully completed batch.
pub trait ResultsRenderer: Send + Sync + 'static {
    fn render(&self, result_ids: Vec<ResultId>);
}

// A closed receiver only means nobody is watching anymore.
impl StatusSurface for UnboundedSender<OrchestratorEvent> {
    fn set_control(&self, label: &str, enabled: bool) {
        let _ = self.send(OrchestratorEvent::ControlChanged {
            label: label.to_string(),
            enabled,
        });
    }

    fn set_panel_visible(&self, visible: bool) {
        let _ = self.send(OrchestratorEvent::PanelVisibility(visible));
    }

    fn set_progress(&self, progress: Progress) {
        let _ = self.send(OrchestratorEvent::Progress(progress));
    }

    fn notify(&self, message: &str) {
        let _ = self.send(OrchestratorEvent::Message(message.to_string()));
    }

    fn poll_failed(&self, message: &str) {
        let _ = self.send(OrchestratorEvent::PollFailed(message.to_string()));
    }
}

impl ResultsRenderer for UnboundedSender<OrchestratorEvent> {
    fn render(&self, result_ids: Vec<ResultId>) {
        let _ = self.send(OrchestratorEvent::ResultsReady(result_ids));
    }
}
