use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type EntryId = String;

/// Per-entry synchronization state.
///
/// Within one sync attempt an entry moves `pending → syncing → {synced, failed}`.
/// `failed` entries re-enter `syncing` on the next pass; `synced` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SyncStatus {
    /// Whether `self → next` is a legal transition.
    ///
    /// `syncing → pending` is reserved for submissions that never reached the
    /// remote, and `syncing → syncing` for an orphaned entry re-claimed by a
    /// newer pass.
    #[must_use]
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Failed | Self::Syncing, Self::Syncing)
                | (Self::Syncing, Self::Synced | Self::Failed | Self::Pending)
        )
    }

    #[must_use]
    pub fn needs_sync(self) -> bool {
        self != Self::Synced
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally recorded event plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<T> {
    pub id: EntryId,
    /// Insertion order across all collections; sync passes walk entries by `seq`.
    pub seq: u64,
    pub logged_at: DateTime<Utc>,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    pub payload: T,
}

pub type MealEntry = Entry<Meal>;
pub type ExerciseEntry = Entry<Exercise>;
pub type WeightEntry = Entry<Weight>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Meal,
    Exercise,
    Weight,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Meal => "meal",
            Self::Exercise => "exercise",
            Self::Weight => "weight",
        })
    }
}

// --- Meals ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSource {
    Image,
    Text,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub qty: f64,
    pub unit: String,
    pub kcal: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub kcal: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl MacroTotals {
    #[must_use]
    pub fn sum(items: &[FoodItem]) -> Self {
        items.iter().fold(Self::default(), |acc, item| Self {
            kcal: acc.kcal.saturating_add(item.kcal),
            protein_g: acc.protein_g + item.protein_g,
            carbs_g: acc.carbs_g + item.carbs_g,
            fat_g: acc.fat_g + item.fat_g,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub source: MealSource,
    pub items: Vec<FoodItem>,
    pub totals: MacroTotals,
    pub confidence: f64,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Meal {
    /// A manually entered meal whose totals are the sum of its items.
    #[must_use]
    pub fn manual(items: Vec<FoodItem>, notes: Option<String>) -> Self {
        let totals = MacroTotals::sum(&items);
        Self {
            source: MealSource::Manual,
            items,
            totals,
            confidence: 1.0,
            low_confidence: false,
            notes,
        }
    }
}

// --- Exercise ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

impl Intensity {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            _ => bail!("Intensity must be one of: low, moderate, high"),
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Moderate => 1,
            Self::High => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub exercise_type: String,
    pub duration_min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<Intensity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_kcal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

// --- Weight ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMethod {
    Scale,
    Manual,
    #[serde(rename = "healthkit")]
    HealthKit,
}

impl WeightMethod {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "scale" => Ok(Self::Scale),
            "manual" => Ok(Self::Manual),
            "healthkit" => Ok(Self::HealthKit),
            _ => bail!("Invalid weight method '{s}'. Use scale, manual or healthkit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub weight_kg: f64,
    pub method: WeightMethod,
}

// --- Daily aggregate ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTargets {
    pub kcal: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
}

/// Fraction of each target reached so far (1.0 = on target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub kcal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
}

/// One recent log line in the daily aggregate. Kinds this client does not
/// know about decode as `Unknown` instead of failing the whole aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogSummary {
    Meal {
        ts: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kcal: Option<u32>,
    },
    Exercise {
        ts: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kcal: Option<u32>,
    },
    Weight {
        ts: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight_kg: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

/// Authoritative daily totals owned by the remote service. Always replaced
/// wholesale, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub kcal_in: u32,
    pub kcal_out: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<DailyTargets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_dose_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_logs: Vec<LogSummary>,
}

impl DailyAggregate {
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            kcal_in: 0,
            kcal_out: 0,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
            targets: None,
            progress: None,
            streak_days: 0,
            suggested_actions: Vec::new(),
            next_dose_ts: None,
            last_logs: Vec::new(),
        }
    }

    #[must_use]
    pub fn net_kcal(&self) -> i64 {
        i64::from(self.kcal_in) - i64::from(self.kcal_out)
    }

    /// Progress as reported by the remote, or derived from the targets when
    /// the remote omitted it.
    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        if let Some(p) = &self.progress {
            return Some(p.clone());
        }
        let targets = self.targets.as_ref()?;
        if targets.kcal == 0 {
            return None;
        }
        let ratio = |value: f64, target: Option<f64>| {
            target.filter(|t| *t > 0.0).map(|t| value / t)
        };
        Some(Progress {
            kcal: f64::from(self.kcal_in) / f64::from(targets.kcal),
            protein: ratio(self.protein_g, targets.protein_g),
            carbs: ratio(self.carbs_g, targets.carbs_g),
            fat: ratio(self.fat_g, targets.fat_g),
        })
    }
}

// --- Validation ---

pub const MIN_WEIGHT_KG: f64 = 20.0;
pub const MAX_WEIGHT_KG: f64 = 500.0;
pub const MAX_EXERCISE_DURATION_MIN: f64 = 1440.0;
pub const MAX_ITEMS_PER_MEAL: usize = 50;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_ITEM_KCAL: u32 = 50_000;
pub const MAX_MACRO_G: f64 = 1000.0;

/// Validate a body weight and round it to one decimal place.
pub fn validate_weight_kg(weight_kg: f64) -> Result<f64> {
    if !weight_kg.is_finite() {
        bail!("Weight must be a number");
    }
    if weight_kg < MIN_WEIGHT_KG {
        bail!("Weight too low (minimum {MIN_WEIGHT_KG} kg)");
    }
    if weight_kg > MAX_WEIGHT_KG {
        bail!("Weight too high (maximum {MAX_WEIGHT_KG} kg)");
    }
    Ok((weight_kg * 10.0).round() / 10.0)
}

pub fn validate_exercise(exercise: &Exercise) -> Result<()> {
    if exercise.exercise_type.trim().is_empty() {
        bail!("Exercise type must not be empty");
    }
    if exercise.exercise_type.chars().count() > MAX_NAME_LEN {
        bail!("Exercise type exceeds maximum length of {MAX_NAME_LEN} characters");
    }
    if !exercise.duration_min.is_finite() || exercise.duration_min <= 0.0 {
        bail!("Duration must be positive");
    }
    if exercise.duration_min > MAX_EXERCISE_DURATION_MIN {
        bail!("Duration too long (maximum {MAX_EXERCISE_DURATION_MIN} minutes)");
    }
    if let Some(kcal) = exercise.est_kcal {
        if kcal > MAX_ITEM_KCAL {
            bail!("Calorie count too high");
        }
    }
    Ok(())
}

pub fn validate_meal(meal: &Meal) -> Result<()> {
    if meal.items.is_empty() {
        bail!("Meal must contain at least one item");
    }
    if meal.items.len() > MAX_ITEMS_PER_MEAL {
        bail!("Too many items (maximum {MAX_ITEMS_PER_MEAL})");
    }
    for (i, item) in meal.items.iter().enumerate() {
        let n = i + 1;
        if item.name.trim().is_empty() {
            bail!("Item {n} name must not be empty");
        }
        if item.name.chars().count() > MAX_NAME_LEN {
            bail!("Item {n} name exceeds maximum length of {MAX_NAME_LEN} characters");
        }
        if item.kcal > MAX_ITEM_KCAL {
            bail!("Item {n} calorie count too high");
        }
        for (macro_name, value) in [
            ("protein", item.protein_g),
            ("carbs", item.carbs_g),
            ("fat", item.fat_g),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("Item {n} {macro_name} cannot be negative");
            }
            if value > MAX_MACRO_G {
                bail!("Item {n} {macro_name} value too high");
            }
        }
    }
    if !(0.0..=1.0).contains(&meal.confidence) {
        bail!("Confidence must be between 0 and 1");
    }
    if meal
        .notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
    {
        bail!("Notes exceed maximum length of {MAX_NOTES_LEN} characters");
    }
    Ok(())
}

// --- Exercise estimate ---

pub const DEFAULT_BODY_WEIGHT_KG: f64 = 70.0;

/// MET values per exercise for low / moderate / high intensity.
const MET_TABLE: &[(&str, [f64; 3])] = &[
    ("walking", [2.5, 3.5, 5.0]),
    ("running", [6.0, 8.5, 11.0]),
    ("cycling", [4.0, 6.5, 10.0]),
    ("swimming", [5.0, 7.0, 10.0]),
    ("strength training", [3.0, 5.0, 8.0]),
    ("yoga", [2.0, 3.0, 4.0]),
    ("elliptical", [4.5, 6.5, 8.5]),
];

/// Estimate calories burned as `MET × kg × hours`. The exercise is matched by
/// name inside `description`; unrecognised activities count as walking.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn estimate_exercise_kcal(
    description: &str,
    duration_min: f64,
    intensity: Option<Intensity>,
    weight_kg: f64,
) -> u32 {
    let lower = description.to_lowercase();
    let mets = MET_TABLE
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map_or(MET_TABLE[0].1, |(_, mets)| *mets);
    let met = mets[intensity.unwrap_or(Intensity::Moderate).index()];
    let kcal = met * weight_kg * (duration_min / 60.0);
    if kcal.is_finite() && kcal > 0.0 {
        kcal.floor() as u32
    } else {
        0
    }
}
