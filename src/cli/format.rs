//! Output formatting for CLI display.

use std::fmt::Write;

use jiff::Timestamp;

use almanac::model::{NewsRecord, StepLinkRecord, StepRecord, SyncRecord};
use almanac::sync::SyncReport;

const DATE_TIME: &str = "%Y-%m-%d %H:%M UTC";

/// Milliseconds since the epoch as a UTC date and time.
pub(super) fn format_millis(ms: i64) -> String {
    Timestamp::from_millisecond(ms).map_or_else(
        |_| ms.to_string(),
        |t| t.strftime(DATE_TIME).to_string(),
    )
}

/// Unix seconds as a UTC date and time.
pub(super) fn format_seconds(secs: i64) -> String {
    Timestamp::from_second(secs).map_or_else(
        |_| secs.to_string(),
        |t| t.strftime(DATE_TIME).to_string(),
    )
}

fn short_id(id: Option<&str>) -> &str {
    id.map_or("-", |id| id.get(..8).unwrap_or(id))
}

pub(super) fn format_step_line(step: &StepRecord) -> String {
    let mark = if step.completed { "x" } else { " " };
    format!(
        "{:>3}  [{mark}]  {}  ({})",
        step.position, step.title, step.possible_date
    )
}

pub(super) fn format_step(step: &StepRecord, links: &[StepLinkRecord]) -> String {
    let mut out = format!("{}\n\n", format_step_line(step));
    if !step.description.is_empty() {
        let _ = writeln!(out, "{}\n", step.description);
    }
    for link in links {
        let _ = writeln!(out, "  - {}: {}", link.title, link.url);
    }
    out
}

pub(super) fn format_news(item: &NewsRecord) -> String {
    let mut out = format!("{}  {}\n", format_seconds(item.date), item.title);
    let _ = writeln!(out, "    {}", item.url);
    if let Some(tldr) = &item.tldr {
        let _ = writeln!(out, "    {tldr}");
    }
    out
}

pub(super) fn format_sync(sync: &SyncRecord) -> String {
    let created = sync.time_created.map_or_else(|| "-".to_string(), format_millis);
    let state = match (sync.pending, sync.time_synced) {
        (true, _) => "pending".to_string(),
        (false, Some(at)) => format!("synced {}", format_millis(at)),
        (false, None) => "completed".to_string(),
    };
    format!("{}  created {created}  {state}", short_id(sync.id.as_deref()))
}

pub(super) fn format_report(report: &SyncReport) -> String {
    let mut out = String::new();
    let kind = if report.forced { "forced sync" } else { "sync" };
    let _ = writeln!(out, "{kind} {}", format_sync(&report.sync));
    for (name, result) in [("steps", &report.steps), ("news", &report.news)] {
        match result {
            Ok(applied) => {
                let _ = writeln!(out, "  {name}: {applied}");
            }
            Err(e) => {
                let _ = writeln!(out, "  {name}: {e}");
            }
        }
    }
    out
}
