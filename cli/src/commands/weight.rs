use anyhow::{Result, bail};

use coach_core::Session;
use coach_core::models::{Weight, WeightMethod};

use super::helpers::{finish_log, no_neg_zero};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

/// Convert a weight given in `unit` to kilograms.
pub(crate) fn to_kg(value: f64, unit: &str) -> Result<f64> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

pub(crate) async fn cmd_log_weight(
    session: &Session,
    value: f64,
    unit: &str,
    method: &str,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") && !json {
        eprintln!("Converting {value:.1} lbs → {weight_kg:.2} kg");
    }
    let weight = Weight {
        weight_kg,
        method: WeightMethod::parse(method)?,
    };
    let added = session.add_weight(weight)?;

    let kg = added.entry.payload.weight_kg;
    let headline = format!("Logged {kg:.1} kg ({:.1} lbs)", kg * LBS_PER_KG);
    finish_log(session, added, &headline, json).await
}
