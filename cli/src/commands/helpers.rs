use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use coach_core::Session;
use coach_core::models::{Entry, SyncStatus};
use coach_core::sync::SyncReport;

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// First block of a UUID, enough to tell entries apart in a table.
pub(crate) fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}

pub(crate) fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Pending => "pending",
        SyncStatus::Syncing => "syncing",
        SyncStatus::Synced => "synced",
        SyncStatus::Failed => "FAILED",
    }
}

pub(crate) fn describe_report(report: &SyncReport) -> String {
    let mut line = format!("Synced {} of {} entries", report.synced, report.attempted);
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    if report.undelivered > 0 {
        line.push_str(&format!(", {} still queued", report.undelivered));
    }
    line
}

#[derive(Serialize)]
struct LoggedJson<'a, T> {
    entry: &'a Entry<T>,
    status: SyncStatus,
    offline_mode: bool,
    last_error: Option<String>,
}

/// Wait for the opportunistic sync triggered by a log command, then report
/// where the entry ended up.
pub(crate) async fn finish_log<T: Serialize>(
    session: &Session,
    added: coach_core::Added<T>,
    headline: &str,
    json: bool,
) -> Result<()> {
    let coach_core::Added { entry, sync } = added;
    let outcome = match sync {
        Some(handle) => Some(handle.await.context("Background sync task failed")?),
        None => None,
    };
    let status = session.status_of(&entry.id).unwrap_or(entry.status);

    if json {
        let out = LoggedJson {
            entry: &entry,
            status,
            offline_mode: session.offline_mode(),
            last_error: session.last_error(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{headline}");
    match (status, outcome) {
        (SyncStatus::Synced, _) => println!("  Saved and synced."),
        (_, None) if session.offline_mode() => {
            println!("  Saved locally. Offline; run `coach sync` when back online.");
        }
        (_, None) => println!("  Saved locally. Run `coach sync` to upload."),
        (_, Some(_)) => {
            println!("  Saved locally ({}).", status_label(status));
            if let Some(err) = session.last_error() {
                eprintln!("  {err}");
            }
        }
    }
    Ok(())
}
