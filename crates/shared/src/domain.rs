use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(ProfileId);
id_newtype!(PeriodId);
id_newtype!(MoodId);

/// Account identity as returned by `/auth/login`, `/auth/register` and `/auth/me`.
///
/// Everything except the display name is optional on the wire so a cached
/// summary written by an older client still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodRegularity {
    Regular,
    Irregular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodDescription {
    Usual,
    Unusual,
}

/// One-time onboarding record. Distinct from the account identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub user_id: UserId,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub id: PeriodId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Energy is sent as 0/1/2 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl TryFrom<u8> for EnergyLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Medium),
            2 => Ok(Self::High),
            other => Err(format!("energy level out of range: {other}")),
        }
    }
}

impl From<EnergyLevel> for u8 {
    fn from(value: EnergyLevel) -> Self {
        match value {
            EnergyLevel::Low => 0,
            EnergyLevel::Medium => 1,
            EnergyLevel::High => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: MoodId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub energy_level: EnergyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_cycle: Option<i32>,
    pub created_at: DateTime<Utc>,
}
