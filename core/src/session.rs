use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::gateway::RemoteGateway;
use crate::models::{
    DailyAggregate, Entry, Exercise, ExerciseEntry, Meal, MealEntry, SyncStatus, Weight,
    WeightEntry,
};
use crate::refresh::{RefreshController, RefreshOutcome};
use crate::store::SnapshotStore;
use crate::supervisor::{TaskKind, TaskSupervisor, TaskTicket};
use crate::sync::{SyncOrchestrator, SyncOutcome};

/// Snapshot of the session flags, published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Bumped on every published change.
    pub revision: u64,
    pub pending_count: usize,
    pub offline_mode: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Start a background sync pass after each successful log, unless the
    /// session is in offline mode.
    pub opportunistic_sync: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            opportunistic_sync: true,
        }
    }
}

/// A freshly logged entry, plus the background sync it triggered, if any.
#[derive(Debug)]
pub struct Added<T> {
    pub entry: Entry<T>,
    pub sync: Option<JoinHandle<SyncOutcome>>,
}

struct SessionState {
    cache: EntityCache,
    supervisor: TaskSupervisor,
}

/// State shared by the session handle and the tasks it spawns. The lock is
/// never held across an await.
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    status_tx: watch::Sender<SessionStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, cache: &EntityCache) {
        self.status_tx.send_modify(|status| {
            status.revision += 1;
            status.pending_count = cache.pending_count();
            status.offline_mode = cache.offline_mode();
            status.last_error = cache.last_error().map(str::to_string);
        });
    }

    /// Mutate the cache and publish the resulting status.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut EntityCache) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state.cache);
        self.publish(&state.cache);
        out
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&EntityCache) -> R) -> R {
        f(&self.lock().cache)
    }

    pub(crate) fn begin(&self, kind: TaskKind) -> TaskTicket {
        self.lock().supervisor.begin(kind)
    }

    /// Begin a task only if `ready` holds, checked under the same lock.
    pub(crate) fn begin_if(
        &self,
        kind: TaskKind,
        ready: impl FnOnce(&EntityCache) -> bool,
    ) -> Option<TaskTicket> {
        let mut state = self.lock();
        if !ready(&state.cache) {
            return None;
        }
        Some(state.supervisor.begin(kind))
    }

    pub(crate) fn is_current(&self, ticket: &TaskTicket) -> bool {
        self.lock().supervisor.is_current(ticket)
    }

    /// Apply `f` only if `ticket` is still current. The check and the write
    /// happen under one lock, so a superseded task can never write.
    pub(crate) fn commit<R>(
        &self,
        ticket: &TaskTicket,
        f: impl FnOnce(&mut EntityCache) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        if !state.supervisor.is_current(ticket) {
            return None;
        }
        let out = f(&mut state.cache);
        self.publish(&state.cache);
        Some(out)
    }

    pub(crate) fn finish(&self, ticket: &TaskTicket) {
        self.lock().supervisor.finish(ticket);
    }
}

struct Inner {
    shared: Shared,
    sync: SyncOrchestrator,
    refresh: RefreshController,
    options: SessionOptions,
}

/// The tracker's session context: local entries, the cached daily
/// aggregate, and the background work that keeps them in step with the
/// remote.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn open(
        store: SnapshotStore,
        gateway: Arc<dyn RemoteGateway>,
        options: SessionOptions,
    ) -> Result<Self> {
        let cache = EntityCache::load(store)?;
        let status = SessionStatus {
            revision: 0,
            pending_count: cache.pending_count(),
            offline_mode: cache.offline_mode(),
            last_error: cache.last_error().map(str::to_string),
        };
        let (status_tx, _) = watch::channel(status);
        Ok(Self {
            inner: Arc::new(Inner {
                shared: Shared {
                    state: Mutex::new(SessionState {
                        cache,
                        supervisor: TaskSupervisor::new(),
                    }),
                    status_tx,
                },
                sync: SyncOrchestrator::new(gateway.clone()),
                refresh: RefreshController::new(gateway),
                options,
            }),
        })
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    // --- Logging ---

    pub fn add_meal(&self, meal: Meal) -> Result<Added<Meal>> {
        let entry = self.shared().update(|c| c.add_meal(meal, Utc::now()))?;
        Ok(Added {
            entry,
            sync: self.request_sync(),
        })
    }

    pub fn add_exercise(&self, exercise: Exercise) -> Result<Added<Exercise>> {
        let entry = self
            .shared()
            .update(|c| c.add_exercise(exercise, Utc::now()))?;
        Ok(Added {
            entry,
            sync: self.request_sync(),
        })
    }

    pub fn add_weight(&self, weight: Weight) -> Result<Added<Weight>> {
        let entry = self.shared().update(|c| c.add_weight(weight, Utc::now()))?;
        Ok(Added {
            entry,
            sync: self.request_sync(),
        })
    }

    fn request_sync(&self) -> Option<JoinHandle<SyncOutcome>> {
        if !self.inner.options.opportunistic_sync {
            return None;
        }
        if self.offline_mode() {
            debug!("offline; leaving entry queued");
            return None;
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let session = self.clone();
        Some(handle.spawn(async move { session.sync_pending().await }))
    }

    // --- Remote work ---

    /// Push every pending or failed entry to the remote. A call supersedes
    /// any pass still in flight.
    pub async fn sync_pending(&self) -> SyncOutcome {
        self.inner.sync.sync_pending(self.shared()).await
    }

    /// Re-fetch the daily aggregate. A call supersedes any refresh still in
    /// flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh.refresh(self.shared()).await
    }

    /// Cancel in-flight work and purge local state.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.shared().lock();
        state.supervisor.cancel_all();
        state.cache.clear()?;
        self.shared().publish(&state.cache);
        info!("session cleared");
        Ok(())
    }

    pub fn sign_out(self) -> Result<()> {
        self.clear()
    }

    // --- Read accessors ---

    #[must_use]
    pub fn meals(&self) -> Vec<MealEntry> {
        self.shared().read(|c| c.meals().to_vec())
    }

    #[must_use]
    pub fn exercises(&self) -> Vec<ExerciseEntry> {
        self.shared().read(|c| c.exercises().to_vec())
    }

    #[must_use]
    pub fn weights(&self) -> Vec<WeightEntry> {
        self.shared().read(|c| c.weights().to_vec())
    }

    #[must_use]
    pub fn status_of(&self, id: &str) -> Option<SyncStatus> {
        self.shared().read(|c| c.status_of(id))
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared().read(EntityCache::pending_count)
    }

    #[must_use]
    pub fn aggregate(&self) -> Option<DailyAggregate> {
        self.shared().read(|c| c.aggregate().cloned())
    }

    #[must_use]
    pub fn offline_mode(&self) -> bool {
        self.shared().read(EntityCache::offline_mode)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared().read(|c| c.last_error().map(str::to_string))
    }

    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.shared().read(EntityCache::last_synced_at)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared().status_tx.borrow().clone()
    }

    /// Receiver that wakes on every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared().status_tx.subscribe()
    }
}
