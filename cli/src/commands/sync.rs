use anyhow::Result;
use std::process;

use coach_core::Session;
use coach_core::sync::SyncOutcome;

use super::helpers::describe_report;

pub(crate) async fn cmd_sync(session: &Session, json: bool) -> Result<()> {
    let outcome = session.sync_pending().await;

    if json {
        let body = match &outcome {
            SyncOutcome::Idle => serde_json::json!({ "outcome": "idle" }),
            SyncOutcome::Cancelled => serde_json::json!({ "outcome": "cancelled" }),
            SyncOutcome::Completed(r) => serde_json::json!({
                "outcome": "completed",
                "attempted": r.attempted,
                "synced": r.synced,
                "failed": r.failed,
                "undelivered": r.undelivered,
                "summary": r.summary,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        match &outcome {
            SyncOutcome::Idle => println!("Nothing to sync."),
            SyncOutcome::Cancelled => eprintln!("Sync was interrupted."),
            SyncOutcome::Completed(report) => {
                println!("{}", describe_report(report));
                if let Some(summary) = &report.summary {
                    eprintln!("{summary}");
                }
            }
        }
    }

    if let SyncOutcome::Completed(report) = outcome {
        if report.synced < report.attempted {
            process::exit(2);
        }
    }
    Ok(())
}
