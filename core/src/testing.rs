//! Scripted gateway and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Notify, oneshot};

use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{
    DailyAggregate, EntryKind, ExerciseEntry, FoodItem, Meal, MealEntry, Weight, WeightEntry,
    WeightMethod,
};
use crate::session::{Session, SessionOptions};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(EntryKind, String),
    Fetch,
}

struct Step<T> {
    result: Result<T, GatewayError>,
    hold: Option<oneshot::Receiver<()>>,
}

/// Answers from a queue of scripted results. Unscripted submissions succeed
/// with `remote-<id>` unless [`FakeGateway::fail_all_submits`] is set;
/// unscripted fetches fail as transport errors.
#[derive(Default)]
pub struct FakeGateway {
    submits: Mutex<VecDeque<Step<String>>>,
    fetches: Mutex<VecDeque<Step<DailyAggregate>>>,
    submit_failure: Mutex<Option<GatewayError>>,
    calls: Mutex<Vec<Call>>,
    entered: Notify,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_submit(&self, result: Result<String, GatewayError>) {
        self.submits.lock().unwrap().push_back(Step { result, hold: None });
    }

    /// Script a submission that blocks until the returned sender fires.
    pub fn push_submit_held(&self, result: Result<String, GatewayError>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.submits.lock().unwrap().push_back(Step {
            result,
            hold: Some(rx),
        });
        tx
    }

    pub fn push_fetch(&self, result: Result<DailyAggregate, GatewayError>) {
        self.fetches.lock().unwrap().push_back(Step { result, hold: None });
    }

    pub fn push_fetch_held(
        &self,
        result: Result<DailyAggregate, GatewayError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetches.lock().unwrap().push_back(Step {
            result,
            hold: Some(rx),
        });
        tx
    }

    pub fn fail_all_submits(&self, err: GatewayError) {
        *self.submit_failure.lock().unwrap() = Some(err);
    }

    pub fn clear_submit_failure(&self) {
        *self.submit_failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(_, id) => Some(id),
                Call::Fetch => None,
            })
            .collect()
    }

    /// Wait until at least `n` calls have reached the gateway.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            if self.calls.lock().unwrap().len() >= n {
                return;
            }
            self.entered.notified().await;
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        self.entered.notify_one();
    }

    async fn submit(&self, kind: EntryKind, id: &str) -> Result<String, GatewayError> {
        let step = self.submits.lock().unwrap().pop_front();
        self.record(Call::Submit(kind, id.to_string()));
        match step {
            Some(Step { result, hold }) => {
                if let Some(hold) = hold {
                    let _ = hold.await;
                }
                result
            }
            None => {
                let failure = self.submit_failure.lock().unwrap().clone();
                failure.map_or_else(|| Ok(format!("remote-{id}")), Err)
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn submit_meal(&self, entry: &MealEntry) -> Result<String, GatewayError> {
        self.submit(EntryKind::Meal, &entry.id).await
    }

    async fn submit_exercise(&self, entry: &ExerciseEntry) -> Result<String, GatewayError> {
        self.submit(EntryKind::Exercise, &entry.id).await
    }

    async fn submit_weight(&self, entry: &WeightEntry) -> Result<String, GatewayError> {
        self.submit(EntryKind::Weight, &entry.id).await
    }

    async fn fetch_daily_aggregate(&self) -> Result<DailyAggregate, GatewayError> {
        let step = self.fetches.lock().unwrap().pop_front();
        self.record(Call::Fetch);
        let Some(Step { result, hold }) = step else {
            return Err(GatewayError::TransportFailure("no scripted response".to_string()));
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        result
    }
}

/// In-memory session that only syncs when asked.
pub fn manual_session(gateway: &Arc<FakeGateway>) -> Session {
    Session::open(
        SnapshotStore::open_in_memory().unwrap(),
        gateway.clone(),
        SessionOptions {
            opportunistic_sync: false,
        },
    )
    .unwrap()
}

pub fn sample_meal() -> Meal {
    Meal::manual(
        vec![FoodItem {
            name: "Chicken salad".to_string(),
            qty: 1.0,
            unit: "bowl".to_string(),
            kcal: 450,
            protein_g: 38.0,
            carbs_g: 12.0,
            fat_g: 26.0,
            fdc_id: None,
        }],
        None,
    )
}

pub fn sample_weight(kg: f64) -> Weight {
    Weight {
        weight_kg: kg,
        method: WeightMethod::Scale,
    }
}

pub fn aggregate_with_kcal(kcal_in: u32) -> DailyAggregate {
    let mut aggregate = DailyAggregate::empty(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    aggregate.kcal_in = kcal_in;
    aggregate
}
