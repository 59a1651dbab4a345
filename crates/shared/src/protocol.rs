use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{EnergyLevel, PeriodDescription, PeriodRegularity, UserSummary},
    error::FieldRangeError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Body of a successful login, register or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Payload for `POST /profiles/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub height_cm: i32,
    pub weight_kg: f64,
    pub cycle_length: i32,
    pub luteal_length: i32,
    pub menses_length: i32,
    pub unusual_bleeding: bool,
    pub number_of_peak: i32,
    pub period_regularity: PeriodRegularity,
    pub period_description: PeriodDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_conditions: Option<String>,
    pub last_period_start: NaiveDate,
    pub last_period_end: NaiveDate,
}

fn check_range(field: &'static str, value: i32, min: i32, max: i32) -> Result<(), FieldRangeError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(FieldRangeError::new(field, min.into(), max.into()))
    }
}

fn check_weight(value: f64) -> Result<(), FieldRangeError> {
    if (30.0..=200.0).contains(&value) {
        Ok(())
    } else {
        Err(FieldRangeError::new("weight_kg", 30, 200))
    }
}

impl NewProfile {
    /// Same bounds the service enforces, checked before the request is sent.
    pub fn validate(&self) -> Result<(), FieldRangeError> {
        check_range("height_cm", self.height_cm, 100, 250)?;
        check_weight(self.weight_kg)?;
        check_range("cycle_length", self.cycle_length, 20, 40)?;
        check_range("luteal_length", self.luteal_length, 10, 20)?;
        check_range("menses_length", self.menses_length, 2, 10)?;
        check_range("number_of_peak", self.number_of_peak, 1, 5)?;
        Ok(())
    }
}

/// Payload for `PUT /profiles/me`; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub luteal_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menses_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unusual_bleeding: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_peak: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_regularity: Option<PeriodRegularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_description: Option<PeriodDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_conditions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_period_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_period_end: Option<NaiveDate>,
}

impl ProfileChanges {
    pub fn validate(&self) -> Result<(), FieldRangeError> {
        let ranges = [
            ("height_cm", self.height_cm, 100, 250),
            ("cycle_length", self.cycle_length, 20, 40),
            ("luteal_length", self.luteal_length, 10, 20),
            ("menses_length", self.menses_length, 2, 10),
            ("number_of_peak", self.number_of_peak, 1, 5),
        ];
        for (field, value, min, max) in ranges {
            if let Some(value) = value {
                check_range(field, value, min, max)?;
            }
        }
        if let Some(weight) = self.weight_kg {
            check_weight(weight)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriod {
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMood {
    pub date: NaiveDate,
    pub energy_level: EnergyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Paging and date filter shared by the period and mood listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// Cycle-based forecast for one day, as served by `/predictions/current`.
/// Energy levels arrive as the words `low`, `medium` and `high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePrediction {
    pub day_of_cycle: i32,
    pub cycle_phase: String,
    pub predicted_energy_level: String,
    #[serde(default)]
    pub predicted_mood: Option<String>,
    #[serde(default)]
    pub predicted_symptoms: Option<Vec<String>>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub next_period_in_days: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrediction {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub prediction: CyclePrediction,
}

/// Days the server could not forecast are left out of `predictions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionHistory {
    pub predictions: Vec<DailyPrediction>,
    pub total_predictions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

/// Inclusive range for `/predictions/history`. The server defaults to the
/// last 30 days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub has_model: bool,
    #[serde(default)]
    pub model_accuracy: Option<f64>,
    #[serde(default)]
    pub model_created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatusReport {
    pub energy_model_status: ModelStatus,
    pub mood_model_status: ModelStatus,
    pub symptom_model_status: ModelStatus,
}

/// Outcome of `/predictions/retrain`. `results` is per-model and free-form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub message: String,
    #[serde(default)]
    pub results: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub predicted_energy_level: String,
    pub predicted_mood: String,
    pub predicted_symptoms: Vec<String>,
    pub recommendation: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SevenDayPlan {
    pub plan: Vec<DailyPlan>,
}

/// Narrative summaries from `/insights/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    #[serde(default)]
    pub key_insights: String,
    #[serde(default)]
    pub symptom_patterns: String,
    #[serde(default)]
    pub mood_correlations: String,
    #[serde(default)]
    pub health_recommendations: String,
}
