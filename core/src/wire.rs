use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::GatewayError;
use crate::models::{
    DailyAggregate, DailyTargets, ExerciseEntry, FoodItem, Intensity, LogSummary, MacroTotals,
    MealEntry, MealSource, Progress, WeightEntry, WeightMethod,
};

pub const LOG_MEAL_PATH: &str = "/log/meal";
pub const LOG_EXERCISE_PATH: &str = "/log/exercise";
pub const LOG_WEIGHT_PATH: &str = "/log/weight";
pub const TODAY_PATH: &str = "/today";

#[derive(Debug, Serialize)]
pub struct MealParse<'a> {
    pub items: &'a [FoodItem],
    pub totals: &'a MacroTotals,
    pub confidence: f64,
    pub low_confidence: bool,
}

#[derive(Debug, Serialize)]
pub struct LogMealRequest<'a> {
    pub datetime: DateTime<Utc>,
    pub source: MealSource,
    pub parse: MealParse<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LogExerciseRequest<'a> {
    pub datetime: DateTime<Utc>,
    #[serde(rename = "type")]
    pub exercise_type: &'a str,
    pub duration_min: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<Intensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_kcal: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LogWeightRequest {
    pub datetime: DateTime<Utc>,
    pub weight_kg: f64,
    pub method: WeightMethod,
}

fn default_ok() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IdResponse {
    #[serde(default = "default_ok")]
    pub ok: bool,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TodayResponse {
    pub date: NaiveDate,
    pub kcal_in: u32,
    pub kcal_out: u32,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub next_dose_ts: Option<String>,
    #[serde(default)]
    pub last_logs: Vec<LogSummary>,
    #[serde(default)]
    pub targets: Option<DailyTargets>,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

#[must_use]
pub fn meal_request(entry: &MealEntry) -> LogMealRequest<'_> {
    let meal = &entry.payload;
    LogMealRequest {
        datetime: entry.logged_at,
        source: meal.source,
        parse: MealParse {
            items: &meal.items,
            totals: &meal.totals,
            confidence: meal.confidence,
            low_confidence: meal.low_confidence,
        },
        notes: meal.notes.as_deref(),
    }
}

#[must_use]
pub fn exercise_request(entry: &ExerciseEntry) -> LogExerciseRequest<'_> {
    let ex = &entry.payload;
    LogExerciseRequest {
        datetime: entry.logged_at,
        exercise_type: &ex.exercise_type,
        duration_min: ex.duration_min,
        intensity: ex.intensity,
        est_kcal: ex.est_kcal,
        source_text: ex.source_text.as_deref(),
    }
}

#[must_use]
pub fn weight_request(entry: &WeightEntry) -> LogWeightRequest {
    LogWeightRequest {
        datetime: entry.logged_at,
        weight_kg: entry.payload.weight_kg,
        method: entry.payload.method,
    }
}

/// Extract the remote id from a submit response.
pub fn remote_id(resp: IdResponse) -> Result<String, GatewayError> {
    if !resp.ok {
        return Err(GatewayError::MalformedResponse(
            "submit response reported ok=false".to_string(),
        ));
    }
    if resp.id.trim().is_empty() {
        return Err(GatewayError::MalformedResponse(
            "submit response has an empty id".to_string(),
        ));
    }
    Ok(resp.id)
}

/// Accepts RFC 3339, or a naive ISO timestamp which is taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn today_to_aggregate(resp: TodayResponse) -> Result<DailyAggregate, GatewayError> {
    let next_dose_ts = match resp.next_dose_ts.as_deref() {
        Some(s) => Some(parse_timestamp(s).ok_or_else(|| {
            GatewayError::MalformedResponse(format!("invalid next_dose_ts '{s}'"))
        })?),
        None => None,
    };
    Ok(DailyAggregate {
        date: resp.date,
        kcal_in: resp.kcal_in,
        kcal_out: resp.kcal_out,
        protein_g: resp.protein_g,
        carbs_g: resp.carbs_g,
        fat_g: resp.fat_g,
        targets: resp.targets,
        progress: resp.progress,
        streak_days: resp.streak_days,
        suggested_actions: resp.suggested_actions,
        next_dose_ts,
        last_logs: resp.last_logs,
    })
}
