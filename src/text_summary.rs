//! Text summary builder for CLI output.

use crate::model::BatchReport;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a completed batch.
pub(crate) fn build_text_summary(report: &BatchReport) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Backend: {}", report.base_url));
    lines.push(format!(
        "Finished: {} ({} scenarios, {} poll cycles, {})",
        report.timestamp_utc,
        report.scenarios.len(),
        report.poll_cycles,
        humantime::format_duration(report.elapsed)
    ));

    let width = report
        .scenarios
        .iter()
        .map(|s| s.label().len())
        .max()
        .unwrap_or(0);
    for (scenario, result_id) in report.scenarios.iter().zip(&report.result_ids) {
        lines.push(format!(
            "  {:<width$}  simulation {}",
            scenario.label(),
            result_id
        ));
    }

    TextSummary { lines }
}
