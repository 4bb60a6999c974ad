use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::DailyAggregate;
use crate::session::Shared;
use crate::supervisor::{TaskKind, TaskTicket};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated(DailyAggregate),
    /// The cached aggregate was kept; the error is also reflected in the
    /// session flags.
    Failed(GatewayError),
    /// A newer refresh or a sign-out took over before this one finished.
    Cancelled,
}

/// Fetches the daily aggregate and commits it if no newer refresh started
/// in the meantime.
pub struct RefreshController {
    gateway: Arc<dyn RemoteGateway>,
}

impl RefreshController {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    pub(crate) async fn refresh(&self, shared: &Shared) -> RefreshOutcome {
        let ticket = shared.begin(TaskKind::Refresh);
        let outcome = self.run(shared, &ticket).await;
        shared.finish(&ticket);
        outcome
    }

    async fn run(&self, shared: &Shared, ticket: &TaskTicket) -> RefreshOutcome {
        if !shared.is_current(ticket) {
            return RefreshOutcome::Cancelled;
        }

        let result = tokio::select! {
            biased;
            () = ticket.cancelled() => {
                debug!(generation = ticket.generation(), "refresh cancelled in flight");
                return RefreshOutcome::Cancelled;
            }
            result = self.gateway.fetch_daily_aggregate() => result,
        };

        let committed = shared.commit(ticket, |cache| match result {
            Ok(aggregate) => {
                cache.replace_aggregate(aggregate.clone());
                cache.set_offline_mode(false);
                cache.set_last_error(None);
                if let Err(e) = cache.persist() {
                    warn!("refresh: {e:#}");
                    cache.set_last_error(Some(format!("Could not save local changes: {e}")));
                }
                info!(date = %aggregate.date, kcal_in = aggregate.kcal_in, "daily aggregate refreshed");
                RefreshOutcome::Updated(aggregate)
            }
            Err(e) => {
                warn!("refresh failed: {e}");
                if e.is_unavailable() {
                    cache.set_offline_mode(true);
                }
                cache.set_last_error(Some(e.user_message()));
                if let Err(err) = cache.persist() {
                    warn!("refresh: {err:#}");
                }
                RefreshOutcome::Failed(e)
            }
        });

        committed.unwrap_or_else(|| {
            debug!(generation = ticket.generation(), "refresh superseded; dropping result");
            RefreshOutcome::Cancelled
        })
    }
}
