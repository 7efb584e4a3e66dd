use crate::error::StateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Inactive,
    Active,
    Maintenance,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Inactive => "inactive",
            SensorStatus::Active => "active",
            SensorStatus::Maintenance => "maintenance",
        }
    }

    /// Lifecycle rules of a sensor.
    ///
    /// `active -> active` is a reassignment to another plant.
    pub fn can_transition_to(&self, next: SensorStatus) -> bool {
        use SensorStatus::*;
        matches!(
            (self, next),
            (Inactive, Active)
                | (Active, Active)
                | (Active, Inactive)
                | (Inactive, Maintenance)
                | (Active, Maintenance)
                | (Maintenance, Inactive)
        )
    }

    pub fn transition(&self, next: SensorStatus) -> Result<SensorStatus, StateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateError::InvalidTransition(*self, next))
        }
    }
}

impl Default for SensorStatus {
    fn default() -> Self {
        SensorStatus::Inactive
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorStatus {
    type Err = std::string::String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SensorStatus::Inactive),
            "active" => Ok(SensorStatus::Active),
            "maintenance" => Ok(SensorStatus::Maintenance),
            other => Err(format!("Unknown sensor status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sensor {
    pub id: i32,
    pub device_id: String,
    pub name: String,
    pub device_type: String,
    pub user_id: i32,
    pub plant_id: Option<i32>,
    pub status: SensorStatus,
    pub last_connection: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Sensor {
    pub fn is_owned_by(&self, user_id: i32) -> bool {
        self.user_id == user_id
    }

    /// Returns the plant new readings are attributed to.
    ///
    /// Status and plant are checked independently, an active sensor
    /// without a plant is reported instead of being trusted.
    pub fn accepting_plant(&self) -> Result<i32, StateError> {
        if self.status != SensorStatus::Active {
            return Err(StateError::SensorInactive(self.device_id.clone()));
        }
        self.plant_id
            .ok_or_else(|| StateError::UnassignedSensor(self.device_id.clone()))
    }
}
