//! Maps a window of readings to one line series per quantity.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{SensorReading, WindowTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    Pitch,
    Roll,
    Yaw,
}

impl Quantity {
    pub const ALL: [Quantity; 6] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Pressure,
        Quantity::Pitch,
        Quantity::Roll,
        Quantity::Yaw,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Quantity::Temperature => "Temperature",
            Quantity::Humidity => "Humidity",
            Quantity::Pressure => "Pressure",
            Quantity::Pitch => "Pitch",
            Quantity::Roll => "Roll",
            Quantity::Yaw => "Yaw",
        }
    }

    pub fn value(self, reading: &SensorReading) -> Option<f64> {
        match self {
            Quantity::Temperature => reading.temperature,
            Quantity::Humidity => reading.humidity,
            Quantity::Pressure => reading.pressure,
            Quantity::Pitch => reading.pitch,
            Quantity::Roll => reading.roll,
            Quantity::Yaw => reading.yaw,
        }
    }
}

/// A missing measurement stays in the series as a gap so every series keeps
/// the window's length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub quantity: Quantity,
    pub title: &'static str,
    pub points: Vec<SeriesPoint>,
}

impl LineSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Six series in `Quantity::ALL` order, each following the window's
/// newest-first row order.
pub fn render(window: &WindowTable) -> Vec<LineSeries> {
    Quantity::ALL
        .iter()
        .map(|&quantity| LineSeries {
            quantity,
            title: quantity.title(),
            points: window
                .rows()
                .iter()
                .map(|reading| SeriesPoint {
                    timestamp: reading.timestamp,
                    value: quantity.value(reading),
                })
                .collect(),
        })
        .collect()
}
