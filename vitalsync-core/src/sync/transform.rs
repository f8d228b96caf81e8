//! Per-endpoint payload transforms.
//!
//! Maps one fetched record into named daily metric samples. Each endpoint
//! owns its field mapping; a malformed payload fails the transform for that
//! endpoint only and is classified as a data error by the executor.

use crate::types::{Endpoint, Metric};
use serde_json::Value;

/// Extract `(metric_name, value)` samples from one endpoint record.
///
/// A `null` field means the device produced no reading that day and the
/// sample is skipped; a missing or non-numeric field is a transform error.
pub fn metric_values(
    endpoint: Endpoint,
    payload: &Value,
) -> Result<Vec<(&'static str, f64)>, String> {
    let mut samples = Vec::new();

    match endpoint {
        Endpoint::Sleep => {
            push(&mut samples, Metric::SleepScore.as_str(), field(payload, "sleep_score")?);
        }
        Endpoint::Recharge => {
            push(&mut samples, Metric::HrvRmssd.as_str(), field(payload, "hrv_avg")?);
            push(
                &mut samples,
                Metric::RestingHr.as_str(),
                field(payload, "heart_rate_avg")?,
            );
        }
        Endpoint::Activity => {
            push(&mut samples, "active_calories", field(payload, "active_calories")?);
            push(&mut samples, "steps", field(payload, "steps")?);
        }
        Endpoint::Exercises => {
            push(&mut samples, "exercise_minutes", field(payload, "duration_minutes")?);
        }
        Endpoint::CardioLoad => {
            // The provider reports -1.0 when load was not computed; only
            // positive loads are real measurements.
            push(
                &mut samples,
                Metric::TrainingLoad.as_str(),
                field(payload, "cardio_load")?.filter(|&v| v > 0.0),
            );
            push(
                &mut samples,
                Metric::TrainingLoadRatio.as_str(),
                field(payload, "cardio_load_ratio")?.filter(|&v| v > 0.0),
            );
        }
        Endpoint::SleepwiseAlertness => {
            push(&mut samples, "alertness_score", field(payload, "alertness_score")?);
        }
        Endpoint::SleepwiseBedtime => {
            push(&mut samples, "bedtime_consistency", field(payload, "consistency")?);
        }
        Endpoint::ActivitySamples => {
            push(&mut samples, "active_minutes", field(payload, "active_minutes")?);
        }
        Endpoint::ContinuousHr => {
            push(&mut samples, "hr_avg", field(payload, "hr_avg")?);
        }
        Endpoint::Spo2 => {
            push(&mut samples, "spo2_percent", field(payload, "spo2_percent")?);
        }
        Endpoint::Ecg => {
            push(&mut samples, "ecg_hr_avg", field(payload, "avg_heart_rate")?);
        }
        Endpoint::BodyTemperature => {
            push(
                &mut samples,
                "body_temp_deviation",
                field(payload, "temperature_deviation")?,
            );
        }
        Endpoint::SkinTemperature => {
            push(
                &mut samples,
                "skin_temp_deviation",
                field(payload, "temperature_deviation")?,
            );
        }
    }

    Ok(samples)
}

fn push(samples: &mut Vec<(&'static str, f64)>, metric: &'static str, value: Option<f64>) {
    if let Some(value) = value {
        samples.push((metric, value));
    }
}

/// Read a numeric field. `null` reads as `None`; a missing key or a
/// non-numeric value is an error.
fn field(payload: &Value, key: &str) -> Result<Option<f64>, String> {
    match payload.get(key) {
        None => Err(format!("missing field '{}'", key)),
        Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("field '{}' is not numeric: {}", key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recharge_produces_hrv_and_resting_hr() {
        let payload = json!({
            "date": "2026-07-01",
            "hrv_avg": 48.5,
            "heart_rate_avg": 52.0,
        });
        let samples = metric_values(Endpoint::Recharge, &payload).unwrap();
        assert_eq!(samples, vec![("hrv_rmssd", 48.5), ("resting_hr", 52.0)]);
    }

    #[test]
    fn test_null_field_skips_sample() {
        let payload = json!({ "date": "2026-07-01", "sleep_score": null });
        let samples = metric_values(Endpoint::Sleep, &payload).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_missing_field_is_transform_error() {
        let payload = json!({ "date": "2026-07-01" });
        let err = metric_values(Endpoint::Sleep, &payload).unwrap_err();
        assert!(err.contains("sleep_score"));
    }

    #[test]
    fn test_non_numeric_field_is_transform_error() {
        let payload = json!({ "date": "2026-07-01", "sleep_score": "great" });
        assert!(metric_values(Endpoint::Sleep, &payload).is_err());
    }

    #[test]
    fn test_cardio_load_sentinel_skipped() {
        let payload = json!({
            "date": "2026-07-01",
            "cardio_load": -1.0,
            "cardio_load_ratio": 1.2,
        });
        let samples = metric_values(Endpoint::CardioLoad, &payload).unwrap();
        assert_eq!(samples, vec![("training_load_ratio", 1.2)]);
    }
}
