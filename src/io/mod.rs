use std::io::Write;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::perf::PerfReport;

/// Progress bar over `total` units, drawn on stderr so stdout stays clean
/// for the summary.
pub fn create_progress_bar(total: usize, unit: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit}"
    );
    match ProgressStyle::default_bar().template(&template) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(err) => tracing::debug!(error = %err, "falling back to default progress style"),
    }
    pb
}

/// Writes the performance summary the way the benchmark reports it.
pub fn write_summary<W: Write>(mut out: W, report: &PerfReport) -> Result<()> {
    writeln!(out).context("Failed to write summary")?;
    writeln!(out, "{report}").context("Failed to write summary")?;
    out.flush().context("Failed to flush summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::perf::ResourceUsage;

    #[test]
    fn hidden_bar_still_counts() {
        let pb = create_progress_bar(10, "items", false);
        pb.inc(3);
        assert_eq!(pb.position(), 3);
        assert!(pb.is_hidden());
    }

    #[test]
    fn summary_starts_with_blank_line() {
        let report = PerfReport {
            label: "hybrid (P=2, T=2)".to_string(),
            wall_time: Duration::from_millis(1),
            usage: ResourceUsage::default(),
        };
        let mut buf = Vec::new();
        write_summary(&mut buf, &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("\nMode: hybrid (P=2, T=2)\n"));
        assert!(text.ends_with("Total Context Switches:   0\n"));
    }
}
