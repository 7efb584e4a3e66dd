use crate::Reading;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::trace;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics over all readings of one sensor on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyAggregate {
    pub sensor_id: i32,
    pub date: NaiveDate,
    pub temperature: MetricSummary,
    pub air_humidity: MetricSummary,
    pub soil_moisture: MetricSummary,
    pub reading_count: u32,
}

impl DailyAggregate {
    /// `None` for an empty day. Zero is a valid metric value and must not
    /// stand in for missing data.
    pub fn compute(sensor_id: i32, date: NaiveDate, readings: &[Reading]) -> Option<Self> {
        let mut temperature = Accumulator::default();
        let mut air_humidity = Accumulator::default();
        let mut soil_moisture = Accumulator::default();

        for reading in readings {
            temperature.push(f64::from(reading.temperature));
            air_humidity.push(reading.air_humidity);
            soil_moisture.push(reading.soil_moisture);
        }

        let aggregate = DailyAggregate {
            sensor_id,
            date,
            temperature: temperature.summary()?,
            air_humidity: air_humidity.summary()?,
            soil_moisture: soil_moisture.summary()?,
            reading_count: temperature.count,
        };
        trace!(sensor_id = sensor_id, %date, count = aggregate.reading_count, "Aggregated day");
        Some(aggregate)
    }
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: u32,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    fn summary(&self) -> Option<MetricSummary> {
        if self.count == 0 {
            return None;
        }
        Some(MetricSummary {
            avg: self.sum / f64::from(self.count),
            min: self.min,
            max: self.max,
        })
    }
}
