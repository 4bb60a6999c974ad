use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    DEFAULT_BODY_WEIGHT_KG, DailyAggregate, Entry, EntryId, EntryKind, Exercise, ExerciseEntry,
    Meal, MealEntry, SyncStatus, Weight, WeightEntry, estimate_exercise_kcal, validate_exercise,
    validate_meal, validate_weight_kg,
};
use crate::store::{
    KEY_AGGREGATE, KEY_EXERCISES, KEY_LAST_ERROR, KEY_LAST_SYNCED_AT, KEY_MEALS, KEY_WEIGHTS,
    SnapshotStore,
};

/// Position of an entry in the sync queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    pub kind: EntryKind,
    pub id: EntryId,
    pub seq: u64,
}

struct MetaMut<'a> {
    status: &'a mut SyncStatus,
    remote_id: &'a mut Option<String>,
    sync_error: &'a mut Option<String>,
}

fn restore<T: DeserializeOwned>(store: &SnapshotStore, key: &str) -> Result<Option<T>> {
    let Some(json) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&json) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, "unreadable snapshot, starting empty: {e}");
            Ok(None)
        }
    }
}

fn meta_of<T>(entry: &mut Entry<T>) -> MetaMut<'_> {
    MetaMut {
        status: &mut entry.status,
        remote_id: &mut entry.remote_id,
        sync_error: &mut entry.sync_error,
    }
}

/// In-memory collections of locally known entries, the cached daily
/// aggregate, and the session flags derived from remote calls.
///
/// Every mutation is written through to the [`SnapshotStore`] before it
/// returns.
pub struct EntityCache {
    store: SnapshotStore,
    meals: Vec<MealEntry>,
    exercises: Vec<ExerciseEntry>,
    weights: Vec<WeightEntry>,
    aggregate: Option<DailyAggregate>,
    last_synced_at: Option<DateTime<Utc>>,
    offline_mode: bool,
    last_error: Option<String>,
    next_seq: u64,
}

impl EntityCache {
    /// Restore the cache from the last persisted snapshot.
    ///
    /// A key whose blob no longer decodes is logged and treated as absent,
    /// so the rest of the snapshot stays usable. Store I/O errors still fail.
    pub fn load(store: SnapshotStore) -> Result<Self> {
        let meals: Vec<MealEntry> = restore(&store, KEY_MEALS)?.unwrap_or_default();
        let exercises: Vec<ExerciseEntry> = restore(&store, KEY_EXERCISES)?.unwrap_or_default();
        let weights: Vec<WeightEntry> = restore(&store, KEY_WEIGHTS)?.unwrap_or_default();
        let aggregate = restore::<Option<DailyAggregate>>(&store, KEY_AGGREGATE)?.flatten();
        let last_synced_at =
            restore::<Option<DateTime<Utc>>>(&store, KEY_LAST_SYNCED_AT)?.flatten();
        let last_error = restore::<Option<String>>(&store, KEY_LAST_ERROR)?.flatten();

        let max_seq = meals
            .iter()
            .map(|e| e.seq)
            .chain(exercises.iter().map(|e| e.seq))
            .chain(weights.iter().map(|e| e.seq))
            .max()
            .unwrap_or(0);

        debug!(
            meals = meals.len(),
            exercises = exercises.len(),
            weights = weights.len(),
            "loaded cache snapshot"
        );

        Ok(Self {
            store,
            meals,
            exercises,
            weights,
            aggregate,
            last_synced_at,
            offline_mode: false,
            last_error,
            next_seq: max_seq + 1,
        })
    }

    /// Give the store back, dropping all in-memory state.
    #[must_use]
    pub fn into_store(self) -> SnapshotStore {
        self.store
    }

    pub fn persist(&self) -> Result<()> {
        let snapshot = [
            (KEY_MEALS, serde_json::to_string(&self.meals)?),
            (KEY_EXERCISES, serde_json::to_string(&self.exercises)?),
            (KEY_WEIGHTS, serde_json::to_string(&self.weights)?),
            (KEY_AGGREGATE, serde_json::to_string(&self.aggregate)?),
            (KEY_LAST_SYNCED_AT, serde_json::to_string(&self.last_synced_at)?),
            (KEY_LAST_ERROR, serde_json::to_string(&self.last_error)?),
        ];
        self.store
            .put_many(&snapshot)
            .context("Failed to persist cache snapshot")
    }

    fn envelope<T>(&mut self, payload: T, logged_at: DateTime<Utc>) -> Entry<T> {
        let seq = self.next_seq;
        self.next_seq += 1;
        Entry {
            id: Uuid::new_v4().to_string(),
            seq,
            logged_at,
            status: SyncStatus::Pending,
            remote_id: None,
            sync_error: None,
            payload,
        }
    }

    // --- Optimistic inserts ---

    pub fn add_meal(&mut self, meal: Meal, logged_at: DateTime<Utc>) -> Result<MealEntry> {
        validate_meal(&meal)?;
        let entry = self.envelope(meal, logged_at);
        self.meals.push(entry.clone());
        if let Err(e) = self.persist() {
            self.meals.pop();
            return Err(e);
        }
        debug!(id = %entry.id, seq = entry.seq, "queued meal");
        Ok(entry)
    }

    pub fn add_exercise(
        &mut self,
        mut exercise: Exercise,
        logged_at: DateTime<Utc>,
    ) -> Result<ExerciseEntry> {
        validate_exercise(&exercise)?;
        if exercise.est_kcal.is_none() {
            let description = exercise
                .source_text
                .as_deref()
                .unwrap_or(&exercise.exercise_type)
                .to_string();
            exercise.est_kcal = Some(estimate_exercise_kcal(
                &description,
                exercise.duration_min,
                exercise.intensity,
                self.latest_weight_kg().unwrap_or(DEFAULT_BODY_WEIGHT_KG),
            ));
        }
        let entry = self.envelope(exercise, logged_at);
        self.exercises.push(entry.clone());
        if let Err(e) = self.persist() {
            self.exercises.pop();
            return Err(e);
        }
        debug!(id = %entry.id, seq = entry.seq, "queued exercise");
        Ok(entry)
    }

    pub fn add_weight(&mut self, mut weight: Weight, logged_at: DateTime<Utc>) -> Result<WeightEntry> {
        weight.weight_kg = validate_weight_kg(weight.weight_kg)?;
        let entry = self.envelope(weight, logged_at);
        self.weights.push(entry.clone());
        if let Err(e) = self.persist() {
            self.weights.pop();
            return Err(e);
        }
        debug!(id = %entry.id, seq = entry.seq, "queued weight");
        Ok(entry)
    }

    // --- Read views ---

    #[must_use]
    pub fn meals(&self) -> &[MealEntry] {
        &self.meals
    }

    #[must_use]
    pub fn exercises(&self) -> &[ExerciseEntry] {
        &self.exercises
    }

    #[must_use]
    pub fn weights(&self) -> &[WeightEntry] {
        &self.weights
    }

    #[must_use]
    pub fn meal(&self, id: &str) -> Option<&MealEntry> {
        self.meals.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn exercise(&self, id: &str) -> Option<&ExerciseEntry> {
        self.exercises.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn weight(&self, id: &str) -> Option<&WeightEntry> {
        self.weights.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn status_of(&self, id: &str) -> Option<SyncStatus> {
        self.meal(id)
            .map(|e| e.status)
            .or_else(|| self.exercise(id).map(|e| e.status))
            .or_else(|| self.weight(id).map(|e| e.status))
    }

    /// Entries not yet confirmed by the remote.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.meals.iter().filter(|e| e.status.needs_sync()).count()
            + self.exercises.iter().filter(|e| e.status.needs_sync()).count()
            + self.weights.iter().filter(|e| e.status.needs_sync()).count()
    }

    #[must_use]
    pub fn aggregate(&self) -> Option<&DailyAggregate> {
        self.aggregate.as_ref()
    }

    #[must_use]
    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Most recently logged body weight.
    #[must_use]
    pub fn latest_weight_kg(&self) -> Option<f64> {
        self.weights
            .iter()
            .max_by_key(|e| (e.logged_at, e.seq))
            .map(|e| e.payload.weight_kg)
    }

    /// Entries a sync pass has to walk, in insertion order. Entries still
    /// marked `syncing` belong to a superseded pass and are re-claimed.
    #[must_use]
    pub fn sync_queue(&self) -> Vec<EntryRef> {
        fn refs<T>(kind: EntryKind, entries: &[Entry<T>]) -> impl Iterator<Item = EntryRef> + '_ {
            entries
                .iter()
                .filter(|e| e.status.needs_sync())
                .map(move |e| EntryRef {
                    kind,
                    id: e.id.clone(),
                    seq: e.seq,
                })
        }
        let mut queue: Vec<EntryRef> = refs(EntryKind::Meal, &self.meals)
            .chain(refs(EntryKind::Exercise, &self.exercises))
            .chain(refs(EntryKind::Weight, &self.weights))
            .collect();
        queue.sort_by_key(|r| r.seq);
        queue
    }

    // --- Status mutations (sync orchestrator only) ---

    fn meta_mut(&mut self, id: &str) -> Option<MetaMut<'_>> {
        let Self {
            meals,
            exercises,
            weights,
            ..
        } = self;
        if let Some(e) = meals.iter_mut().find(|e| e.id == id) {
            return Some(meta_of(e));
        }
        if let Some(e) = exercises.iter_mut().find(|e| e.id == id) {
            return Some(meta_of(e));
        }
        weights.iter_mut().find(|e| e.id == id).map(meta_of)
    }

    /// Move an entry to `next`, rejecting transitions the status graph does
    /// not allow. Returns the previous status.
    pub fn transition(&mut self, id: &str, next: SyncStatus) -> Result<SyncStatus> {
        let Some(meta) = self.meta_mut(id) else {
            bail!("Entry not found: {id}");
        };
        let prev = *meta.status;
        if !prev.can_transition_to(next) {
            bail!("Illegal status transition for {id}: {prev} -> {next}");
        }
        *meta.status = next;
        debug!(%id, from = %prev, to = %next, "status transition");
        Ok(prev)
    }

    pub fn mark_syncing(&mut self, id: &str) -> Result<()> {
        self.transition(id, SyncStatus::Syncing).map(|_| ())
    }

    pub fn mark_synced(&mut self, id: &str, remote_id: String) -> Result<()> {
        self.transition(id, SyncStatus::Synced)?;
        if let Some(meta) = self.meta_mut(id) {
            *meta.remote_id = Some(remote_id);
            *meta.sync_error = None;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &str, message: String) -> Result<()> {
        self.transition(id, SyncStatus::Failed)?;
        if let Some(meta) = self.meta_mut(id) {
            *meta.sync_error = Some(message);
        }
        Ok(())
    }

    /// The submission never reached the remote; the entry goes back to the
    /// queue untouched by the remote.
    pub fn mark_undelivered(&mut self, id: &str, message: String) -> Result<()> {
        self.transition(id, SyncStatus::Pending)?;
        if let Some(meta) = self.meta_mut(id) {
            *meta.sync_error = Some(message);
        }
        Ok(())
    }

    // --- Aggregate and session flags ---

    pub fn replace_aggregate(&mut self, aggregate: DailyAggregate) {
        self.aggregate = Some(aggregate);
    }

    pub fn set_offline_mode(&mut self, offline: bool) {
        self.offline_mode = offline;
    }

    pub fn set_last_error(&mut self, message: Option<String>) {
        self.last_error = message;
    }

    pub fn set_last_synced_at(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(at);
    }

    /// Purge memory and persisted state (sign-out).
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.meals.clear();
        self.exercises.clear();
        self.weights.clear();
        self.aggregate = None;
        self.last_synced_at = None;
        self.offline_mode = false;
        self.last_error = None;
        self.next_seq = 1;
        Ok(())
    }
}
