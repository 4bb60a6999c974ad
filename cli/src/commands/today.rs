use anyhow::Result;
use std::process;

use coach_core::Session;
use coach_core::models::{DailyAggregate, LogSummary};
use coach_core::refresh::RefreshOutcome;

use super::helpers::local_time;

fn pct(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

fn log_line(log: &LogSummary) -> Option<String> {
    match log {
        LogSummary::Meal { ts, kcal } => Some(match kcal {
            Some(k) => format!("{ts}  meal      {k} kcal"),
            None => format!("{ts}  meal"),
        }),
        LogSummary::Exercise { ts, kcal } => Some(match kcal {
            Some(k) => format!("{ts}  exercise  -{k} kcal"),
            None => format!("{ts}  exercise"),
        }),
        LogSummary::Weight { ts, weight_kg } => Some(match weight_kg {
            Some(kg) => format!("{ts}  weight    {kg:.1} kg"),
            None => format!("{ts}  weight"),
        }),
        LogSummary::Unknown => None,
    }
}

fn print_aggregate(agg: &DailyAggregate) {
    let date = agg.date;
    println!("=== {date} ===\n");

    let (kin, kout, net) = (agg.kcal_in, agg.kcal_out, agg.net_kcal());
    println!("  IN: {kin} kcal | OUT: {kout} kcal | NET: {net} kcal");
    let (p, c, f) = (agg.protein_g, agg.carbs_g, agg.fat_g);
    println!("  MACROS: P:{p:.0}g C:{c:.0}g F:{f:.0}g");

    if let Some(target) = &agg.targets {
        let tcal = target.kcal;
        if let (Some(pg), Some(cg), Some(fg)) = (target.protein_g, target.carbs_g, target.fat_g) {
            println!("  TARGET: {tcal} kcal | P:{pg:.0}g C:{cg:.0}g F:{fg:.0}g");
        } else {
            println!("  TARGET: {tcal} kcal");
        }
    }
    if let Some(progress) = agg.progress() {
        let mut line = format!("  PROGRESS: {} kcal", pct(progress.kcal));
        for (label, value) in [("P", progress.protein), ("C", progress.carbs), ("F", progress.fat)] {
            if let Some(v) = value {
                line.push_str(&format!(" | {label}:{}", pct(v)));
            }
        }
        println!("{line}");
    }
    if agg.streak_days > 0 {
        println!("  STREAK: {} days", agg.streak_days);
    }
    if let Some(next) = agg.next_dose_ts {
        println!("  NEXT DOSE: {}", local_time(next));
    }

    let logs: Vec<String> = agg.last_logs.iter().filter_map(log_line).collect();
    if !logs.is_empty() {
        println!("\n  Recent:");
        for line in logs {
            println!("    {line}");
        }
    }
    if !agg.suggested_actions.is_empty() {
        println!("\n  Suggested:");
        for action in &agg.suggested_actions {
            println!("    - {action}");
        }
    }
}

pub(crate) async fn cmd_today(session: &Session, cached: bool, json: bool) -> Result<()> {
    if !cached {
        if let RefreshOutcome::Failed(_) = session.refresh().await {
            if let Some(err) = session.last_error() {
                eprintln!("{err}");
            }
        }
    }

    let Some(aggregate) = session.aggregate() else {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No daily totals available yet" })
            );
        } else {
            eprintln!("No daily totals available yet. Connect to the server and run `coach today`.");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
    } else {
        print_aggregate(&aggregate);
    }
    Ok(())
}
