use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{EntityCache, EntryRef};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{EntryKind, ExerciseEntry, MealEntry, WeightEntry};
use crate::session::Shared;
use crate::supervisor::{TaskKind, TaskTicket};

/// Result of one `sync_pending` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was pending; no state was touched and no remote call made.
    Idle,
    /// Superseded by a newer pass or torn down by sign-out.
    Cancelled,
    Completed(SyncReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    /// Rejected or unreadable answers from the remote; entries are `failed`.
    pub failed: usize,
    /// Never reached the remote; entries are back to `pending`.
    pub undelivered: usize,
    pub summary: Option<String>,
}

/// Owned copy of an entry taken out of the cache for submission, so the
/// cache lock is not held across the network call.
enum Submission {
    Meal(MealEntry),
    Exercise(ExerciseEntry),
    Weight(WeightEntry),
}

impl Submission {
    fn from_cache(cache: &EntityCache, entry: &EntryRef) -> Option<Self> {
        match entry.kind {
            EntryKind::Meal => cache.meal(&entry.id).cloned().map(Self::Meal),
            EntryKind::Exercise => cache.exercise(&entry.id).cloned().map(Self::Exercise),
            EntryKind::Weight => cache.weight(&entry.id).cloned().map(Self::Weight),
        }
    }

    async fn submit(&self, gateway: &dyn RemoteGateway) -> Result<String, GatewayError> {
        match self {
            Self::Meal(e) => gateway.submit_meal(e).await,
            Self::Exercise(e) => gateway.submit_exercise(e).await,
            Self::Weight(e) => gateway.submit_weight(e).await,
        }
    }
}

fn apply_result(cache: &mut EntityCache, id: &str, result: &Result<String, GatewayError>) {
    let applied = match result {
        Ok(remote_id) => {
            cache.set_offline_mode(false);
            cache.mark_synced(id, remote_id.clone())
        }
        Err(e) if e.is_connectivity() => {
            cache.set_offline_mode(true);
            cache.mark_undelivered(id, e.user_message())
        }
        Err(e) => cache.mark_failed(id, e.user_message()),
    };
    if let Err(e) = applied {
        warn!(%id, "could not record sync result: {e:#}");
    }
}

fn summarize(report: &SyncReport, errors: &[GatewayError]) -> Option<String> {
    let headline = errors.iter().max_by_key(|e| e.severity())?;
    Some(format!(
        "{} of {} entries could not be synced. {}",
        report.failed + report.undelivered,
        report.attempted,
        headline.user_message()
    ))
}

/// Drains pending entries through the [`RemoteGateway`], one at a time in
/// insertion order.
pub struct SyncOrchestrator {
    gateway: Arc<dyn RemoteGateway>,
}

impl SyncOrchestrator {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    pub(crate) async fn sync_pending(&self, shared: &Shared) -> SyncOutcome {
        let Some(ticket) = shared.begin_if(TaskKind::Sync, |cache| !cache.sync_queue().is_empty())
        else {
            debug!("sync: nothing pending");
            return SyncOutcome::Idle;
        };
        let outcome = self.run(shared, &ticket).await;
        shared.finish(&ticket);
        outcome
    }

    async fn run(&self, shared: &Shared, ticket: &TaskTicket) -> SyncOutcome {
        let queue = shared.read(EntityCache::sync_queue);
        let mut report = SyncReport::default();
        let mut errors: Vec<GatewayError> = Vec::new();

        for entry in &queue {
            let claimed = shared.commit(ticket, |cache| {
                let submission = Submission::from_cache(cache, entry)?;
                match cache.mark_syncing(&entry.id) {
                    Ok(()) => Some(submission),
                    Err(e) => {
                        debug!(id = %entry.id, "skipping entry: {e:#}");
                        None
                    }
                }
            });
            let submission = match claimed {
                None => return SyncOutcome::Cancelled,
                Some(None) => continue,
                Some(Some(submission)) => submission,
            };

            report.attempted += 1;
            let result = submission.submit(self.gateway.as_ref()).await;

            if shared
                .commit(ticket, |cache| apply_result(cache, &entry.id, &result))
                .is_none()
            {
                debug!(id = %entry.id, "sync pass superseded; dropping result");
                return SyncOutcome::Cancelled;
            }

            match result {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    warn!(id = %entry.id, kind = %entry.kind, "submission failed: {e}");
                    if e.is_connectivity() {
                        report.undelivered += 1;
                    } else {
                        report.failed += 1;
                    }
                    errors.push(e);
                }
            }
        }

        report.summary = summarize(&report, &errors);
        let finished = shared.commit(ticket, |cache| {
            cache.set_last_error(report.summary.clone());
            if report.synced > 0 {
                cache.set_last_synced_at(Utc::now());
            }
            if let Err(e) = cache.persist() {
                warn!("sync: {e:#}");
                cache.set_last_error(Some(format!("Could not save local changes: {e}")));
            }
        });
        if finished.is_none() {
            return SyncOutcome::Cancelled;
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed,
            undelivered = report.undelivered,
            "sync pass complete"
        );
        SyncOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use crate::session::{Session, SessionOptions};
    use crate::testing::{FakeGateway, manual_session, sample_meal, sample_weight};

    #[tokio::test]
    async fn test_sync_with_nothing_pending_is_a_noop() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let before = session.status();

        assert_eq!(session.sync_pending().await, SyncOutcome::Idle);
        assert_eq!(gateway.calls().len(), 0);
        assert_eq!(session.status(), before);

        // Everything already synced is also a no-op
        session.add_weight(sample_weight(80.0)).unwrap();
        assert!(matches!(
            session.sync_pending().await,
            SyncOutcome::Completed(_)
        ));
        let calls = gateway.calls().len();
        let before = session.status();
        assert_eq!(session.sync_pending().await, SyncOutcome::Idle);
        assert_eq!(gateway.calls().len(), calls);
        assert_eq!(session.status(), before);
    }

    #[tokio::test]
    async fn test_entries_synced_in_insertion_order() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let w = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let m = session.add_meal(sample_meal()).unwrap().entry;

        let SyncOutcome::Completed(report) = session.sync_pending().await else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.attempted, 2);
        assert_eq!(report.synced, 2);
        assert!(report.summary.is_none());
        assert_eq!(gateway.submitted_ids(), vec![w.id.clone(), m.id.clone()]);

        let weights = session.weights();
        assert_eq!(weights[0].status, SyncStatus::Synced);
        assert_eq!(weights[0].remote_id.as_deref(), Some(format!("remote-{}", w.id).as_str()));
        assert_eq!(session.pending_count(), 0);
        assert!(session.last_synced_at().is_some());
    }

    #[tokio::test]
    async fn test_status_visible_as_syncing_during_submission() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let first = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let second = session.add_weight(sample_weight(80.5)).unwrap().entry;

        let release = gateway.push_submit_held(Ok("r1".to_string()));
        let pass = tokio::spawn({
            let session = session.clone();
            async move { session.sync_pending().await }
        });
        gateway.wait_for_calls(1).await;

        assert_eq!(session.status_of(&first.id), Some(SyncStatus::Syncing));
        assert_eq!(session.status_of(&second.id), Some(SyncStatus::Pending));

        release.send(()).unwrap();
        assert!(matches!(pass.await.unwrap(), SyncOutcome::Completed(_)));
        assert_eq!(session.status_of(&first.id), Some(SyncStatus::Synced));
        assert_eq!(session.status_of(&second.id), Some(SyncStatus::Synced));
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let a = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let b = session.add_weight(sample_weight(81.0)).unwrap().entry;
        let c = session.add_weight(sample_weight(82.0)).unwrap().entry;
        gateway.push_submit(Ok("r-a".to_string()));
        gateway.push_submit(Err(GatewayError::ServerError(500)));
        gateway.push_submit(Ok("r-c".to_string()));

        let SyncOutcome::Completed(report) = session.sync_pending().await else {
            panic!("expected a completed pass");
        };
        assert_eq!((report.synced, report.failed), (2, 1));
        assert_eq!(session.status_of(&a.id), Some(SyncStatus::Synced));
        assert_eq!(session.status_of(&b.id), Some(SyncStatus::Failed));
        assert_eq!(session.status_of(&c.id), Some(SyncStatus::Synced));
        // Server errors are not connectivity problems
        assert!(!session.offline_mode());
        assert!(session.last_error().unwrap().contains("1 of 3"));
    }

    #[tokio::test]
    async fn test_failed_entry_retried_on_next_pass() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let entry = session.add_weight(sample_weight(80.0)).unwrap().entry;

        gateway.push_submit(Err(GatewayError::MalformedResponse("bad json".to_string())));
        session.sync_pending().await;
        assert_eq!(session.status_of(&entry.id), Some(SyncStatus::Failed));
        assert!(session.weights()[0].sync_error.is_some());

        session.sync_pending().await;
        assert_eq!(session.status_of(&entry.id), Some(SyncStatus::Synced));
        assert!(session.weights()[0].sync_error.is_none());
        assert!(session.last_error().is_none());
        assert_eq!(gateway.submitted_ids(), vec![entry.id.clone(), entry.id]);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_entry_without_offline_mode() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let first = session.add_meal(sample_meal()).unwrap().entry;
        let second = session.add_weight(sample_weight(82.3)).unwrap().entry;
        gateway.push_submit(Ok("r1".to_string()));
        gateway.push_submit(Err(GatewayError::Unauthorized));

        session.sync_pending().await;

        assert_eq!(session.status_of(&first.id), Some(SyncStatus::Synced));
        assert_eq!(session.status_of(&second.id), Some(SyncStatus::Failed));
        assert!(session.last_error().unwrap().contains("re-authenticate"));
        assert!(!session.offline_mode());
    }

    #[tokio::test]
    async fn test_rejected_entry_fails_and_next_is_attempted() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let bad = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let good = session.add_meal(sample_meal()).unwrap().entry;
        gateway.push_submit(Err(GatewayError::Rejected(422)));
        gateway.push_submit(Ok("r2".to_string()));

        let SyncOutcome::Completed(report) = session.sync_pending().await else {
            panic!("expected a completed pass");
        };
        assert_eq!((report.synced, report.failed, report.undelivered), (1, 1, 0));
        assert_eq!(session.status_of(&bad.id), Some(SyncStatus::Failed));
        assert_eq!(session.status_of(&good.id), Some(SyncStatus::Synced));
        assert!(session.weights()[0]
            .sync_error
            .as_deref()
            .unwrap()
            .contains("rejected"));
        assert!(!session.offline_mode());
        assert!(session.last_error().unwrap().contains("1 of 2"));
    }

    #[tokio::test]
    async fn test_transport_failure_returns_entry_to_pending() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let entry = session.add_weight(sample_weight(82.3)).unwrap().entry;
        gateway.fail_all_submits(GatewayError::TransportFailure("no route".to_string()));

        let SyncOutcome::Completed(report) = session.sync_pending().await else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.undelivered, 1);
        assert_eq!(session.status_of(&entry.id), Some(SyncStatus::Pending));
        assert!(session.offline_mode());
        assert!(session.last_error().unwrap().contains("offline"));
        assert!(session.last_synced_at().is_none());

        // Connectivity comes back: success clears offline mode
        gateway.clear_submit_failure();
        session.sync_pending().await;
        assert_eq!(session.status_of(&entry.id), Some(SyncStatus::Synced));
        assert!(!session.offline_mode());
    }

    #[tokio::test]
    async fn test_superseded_pass_drops_its_results() {
        let gateway = FakeGateway::new();
        let session = manual_session(&gateway);
        let first = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let second = session.add_weight(sample_weight(81.0)).unwrap().entry;

        // Pass A stalls on the first entry with a failure it must never record
        let release_a = gateway.push_submit_held(Err(GatewayError::ServerError(502)));
        let pass_a = tokio::spawn({
            let session = session.clone();
            async move { session.sync_pending().await }
        });
        gateway.wait_for_calls(1).await;

        // Pass B supersedes A and re-claims the orphaned entry
        let pass_b = session.sync_pending().await;
        assert!(matches!(pass_b, SyncOutcome::Completed(ref r) if r.synced == 2));

        release_a.send(()).unwrap();
        assert_eq!(pass_a.await.unwrap(), SyncOutcome::Cancelled);

        assert_eq!(session.status_of(&first.id), Some(SyncStatus::Synced));
        assert_eq!(session.status_of(&second.id), Some(SyncStatus::Synced));
        assert!(session.last_error().is_none());
        assert_eq!(
            gateway.submitted_ids(),
            vec![first.id.clone(), first.id, second.id]
        );
    }

    #[tokio::test]
    async fn test_status_sequence_is_monotonic() {
        let gateway = FakeGateway::new();
        let session = Session::open(
            crate::store::SnapshotStore::open_in_memory().unwrap(),
            gateway.clone(),
            SessionOptions {
                opportunistic_sync: false,
            },
        )
        .unwrap();
        let entry = session.add_weight(sample_weight(80.0)).unwrap().entry;
        let mut seen = vec![session.status_of(&entry.id).unwrap()];

        let rounds = [Err(GatewayError::ServerError(503)), Ok("r".to_string())];
        for (round, result) in rounds.into_iter().enumerate() {
            let release = gateway.push_submit_held(result);
            let pass = tokio::spawn({
                let session = session.clone();
                async move { session.sync_pending().await }
            });
            gateway.wait_for_calls(round + 1).await;
            seen.push(session.status_of(&entry.id).unwrap());
            release.send(()).unwrap();
            pass.await.unwrap();
            seen.push(session.status_of(&entry.id).unwrap());
        }

        use SyncStatus::{Failed, Pending, Synced, Syncing};
        assert_eq!(seen, vec![Pending, Syncing, Failed, Syncing, Synced]);
        assert_eq!(session.sync_pending().await, SyncOutcome::Idle);
        assert_eq!(session.status_of(&entry.id), Some(Synced));
    }
}
