use anyhow::Result;

use coach_core::Session;
use coach_core::models::{Exercise, FoodItem, Intensity, Meal};

use super::helpers::finish_log;

pub(crate) struct MealArgs {
    pub name: String,
    pub kcal: u32,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub qty: f64,
    pub unit: String,
    pub notes: Option<String>,
}

impl MealArgs {
    fn into_meal(self) -> Meal {
        let item = FoodItem {
            name: self.name.trim().to_string(),
            qty: self.qty,
            unit: self.unit,
            kcal: self.kcal,
            protein_g: self.protein.unwrap_or(0.0),
            carbs_g: self.carbs.unwrap_or(0.0),
            fat_g: self.fat.unwrap_or(0.0),
            fdc_id: None,
        };
        Meal::manual(vec![item], self.notes)
    }
}

pub(crate) async fn cmd_log_meal(session: &Session, args: MealArgs, json: bool) -> Result<()> {
    let meal = args.into_meal();
    let t = &meal.totals;
    let headline = format!(
        "Logged meal: {} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        t.kcal, t.protein_g, t.carbs_g, t.fat_g
    );
    let added = session.add_meal(meal)?;
    finish_log(session, added, &headline, json).await
}

pub(crate) async fn cmd_log_exercise(
    session: &Session,
    activity: &str,
    duration_min: f64,
    intensity: Option<&str>,
    kcal: Option<u32>,
    json: bool,
) -> Result<()> {
    let intensity = intensity.map(Intensity::parse).transpose()?;
    let exercise = Exercise {
        exercise_type: activity.trim().to_lowercase(),
        duration_min,
        intensity,
        est_kcal: kcal,
        source_text: Some(activity.to_string()),
    };
    let added = session.add_exercise(exercise)?;

    let ex = &added.entry.payload;
    let burned = ex.est_kcal.unwrap_or(0);
    let estimated = if kcal.is_some() { "" } else { " (estimated)" };
    let headline = format!(
        "Logged {} for {:.0} min: {burned} kcal{estimated}",
        ex.exercise_type, ex.duration_min
    );
    finish_log(session, added, &headline, json).await
}
