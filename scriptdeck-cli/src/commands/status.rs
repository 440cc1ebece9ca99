//! `scriptdeck status` - one-shot status table

use chrono::{DateTime, Utc};

use scriptdeck_core::backend::Backend;
use scriptdeck_core::error::ClientError;
use scriptdeck_core::model::{ScriptStatus, SnapshotSource, StatusSnapshot};
use scriptdeck_core::state::{Aggregates, Reconciler, uptime};
use scriptdeck_core::view::ListView;

pub(crate) const HEADER: &str = "ID                   NAME                 GROUP        STATUS    PID      CPU%    MEM(MB)  UPTIME";

pub(crate) fn format_row(entry: &ScriptStatus, now: DateTime<Utc>) -> String {
    let (color, reset) = if entry.is_running() {
        ("\x1b[32m", "\x1b[0m")
    } else {
        ("\x1b[90m", "\x1b[0m")
    };
    let pid = entry.pid().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
    let cpu = entry
        .cpu_percent()
        .map(|c| format!("{:.1}", c))
        .unwrap_or_else(|| "-".into());
    let mem = entry
        .memory_mb()
        .map(|m| format!("{:.1}", m))
        .unwrap_or_else(|| "-".into());
    let up = uptime(entry, now).unwrap_or_else(|| "-".into());

    format!(
        "{:<20} {:<20} {:<12} {}{:<9}{} {:<8} {:<7} {:<8} {}",
        truncate(&entry.id, 20),
        truncate(&entry.name, 20),
        truncate(&entry.group, 12),
        color,
        entry.status_label(),
        reset,
        pid,
        cpu,
        mem,
        up
    )
}

pub(crate) fn format_aggregates(agg: &Aggregates) -> String {
    format!(
        "{} scripts: {} running, {} stopped | cpu {:.1}% | mem {:.1} MB",
        agg.total, agg.running, agg.stopped, agg.cpu_percent, agg.memory_mb
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub async fn run_status(backend: &dyn Backend) -> Result<(), ClientError> {
    let entries = backend.fetch_status().await?;
    let mut reconciler = Reconciler::new();
    reconciler.apply(StatusSnapshot::new(SnapshotSource::Poll, entries));

    let now = Utc::now();
    println!("{}", HEADER);
    for entry in ListView::new().rows(reconciler.map()) {
        println!("{}", format_row(entry, now));
    }
    println!("\n{}", format_aggregates(reconciler.aggregates()));
    Ok(())
}
