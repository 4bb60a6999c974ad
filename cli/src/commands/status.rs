use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use coach_core::Session;
use coach_core::models::{Entry, EntryKind, SyncStatus};

use super::helpers::{local_time, short_id, status_label, truncate};

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Logged")]
    logged: String,
    #[tabled(rename = "Details")]
    details: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Error")]
    error: String,
}

struct Row {
    seq: u64,
    row: EntryRow,
}

fn row<T>(kind: EntryKind, entry: &Entry<T>, details: String) -> Row {
    Row {
        seq: entry.seq,
        row: EntryRow {
            id: short_id(&entry.id).to_string(),
            kind: kind.to_string(),
            logged: local_time(entry.logged_at),
            details,
            status: status_label(entry.status).to_string(),
            error: entry
                .sync_error
                .as_deref()
                .map(|e| truncate(e, 40))
                .unwrap_or_default(),
        },
    }
}

#[derive(Serialize)]
struct StatusJson {
    pending_count: usize,
    offline_mode: bool,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    meals: Vec<coach_core::models::MealEntry>,
    exercises: Vec<coach_core::models::ExerciseEntry>,
    weights: Vec<coach_core::models::WeightEntry>,
}

pub(crate) fn cmd_status(session: &Session, json: bool) -> Result<()> {
    if json {
        let out = StatusJson {
            pending_count: session.pending_count(),
            offline_mode: session.offline_mode(),
            last_error: session.last_error(),
            last_synced_at: session.last_synced_at(),
            meals: session.meals(),
            exercises: session.exercises(),
            weights: session.weights(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut rows: Vec<Row> = Vec::new();
    for e in session.meals() {
        let t = &e.payload.totals;
        let names: Vec<&str> = e.payload.items.iter().map(|i| i.name.as_str()).collect();
        let details = format!("{} ({} kcal)", truncate(&names.join(", "), 30), t.kcal);
        rows.push(row(EntryKind::Meal, &e, details));
    }
    for e in session.exercises() {
        let ex = &e.payload;
        let kcal = ex.est_kcal.map(|k| format!(", {k} kcal")).unwrap_or_default();
        let details = format!("{} {:.0} min{kcal}", truncate(&ex.exercise_type, 20), ex.duration_min);
        rows.push(row(EntryKind::Exercise, &e, details));
    }
    for e in session.weights() {
        let details = format!("{:.1} kg", e.payload.weight_kg);
        rows.push(row(EntryKind::Weight, &e, details));
    }
    rows.sort_by_key(|r| r.seq);

    if rows.is_empty() {
        eprintln!("No local entries. Use `coach log` to record a meal, exercise or weight.");
    } else {
        let rows: Vec<EntryRow> = rows.into_iter().map(|r| r.row).collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..4)).with(Alignment::left()))
            .to_string();
        println!("{table}\n");
    }

    let pending = session.pending_count();
    let failed = session
        .meals()
        .iter()
        .map(|e| e.status)
        .chain(session.exercises().iter().map(|e| e.status))
        .chain(session.weights().iter().map(|e| e.status))
        .filter(|s| *s == SyncStatus::Failed)
        .count();
    println!("  Unsynced: {pending} ({failed} failed)");
    match session.last_synced_at() {
        Some(at) => println!("  Last sync: {}", local_time(at)),
        None => println!("  Last sync: never"),
    }
    if let Some(err) = session.last_error() {
        println!("  Last error: {err}");
    }
    Ok(())
}
