use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{format_timestamp, parse_datetime, to_i64},
    models::{NewReading, SensorReading},
    Database,
};

const SELECT_COLUMNS: &str =
    "id, timestamp, temperature, humidity, pressure, pitch, roll, yaw";

/// Maps one row, or `None` when its timestamp is unreadable. Such a row can
/// only come from another writer and is left out of the window.
fn reading_from_row(row: &Row<'_>) -> Result<Option<SensorReading>> {
    let id: i64 = row.get(0)?;
    let timestamp_str: String = row.get(1)?;
    let timestamp = match parse_datetime(&timestamp_str, "timestamp") {
        Ok(timestamp) => timestamp,
        Err(err) => {
            warn!("Skipping sensor_data row {id}: {err:#}");
            return Ok(None);
        }
    };

    Ok(Some(SensorReading {
        id,
        timestamp,
        temperature: row.get(2)?,
        humidity: row.get(3)?,
        pressure: row.get(4)?,
        pitch: row.get(5)?,
        roll: row.get(6)?,
        yaw: row.get(7)?,
    }))
}

impl Database {
    /// Inserts one reading in its own transaction and returns the stored row.
    ///
    /// Caller timestamps are stored as given. A store-assigned timestamp is
    /// the current time, raised to the newest stored one if the wall clock
    /// has stepped back, so successive appends stay ordered.
    pub async fn insert_reading(&self, reading: &NewReading) -> Result<SensorReading> {
        if let Some((field, value)) = reading.first_non_finite() {
            bail!("refusing to store non-finite {field} ({value})");
        }

        let record = reading.clone();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open insert transaction")?;

            let timestamp = match record.timestamp {
                Some(ts) => ts,
                None => {
                    let now = Utc::now();
                    let newest: Option<String> = tx
                        .query_row(
                            "SELECT timestamp FROM sensor_data
                             ORDER BY julianday(timestamp) DESC, id DESC
                             LIMIT 1",
                            [],
                            |row| row.get(0),
                        )
                        .optional()?;
                    match newest.and_then(|raw| parse_datetime(&raw, "timestamp").ok()) {
                        Some(newest) => now.max(newest),
                        None => now,
                    }
                }
            };

            tx.execute(
                "INSERT INTO sensor_data (timestamp, temperature, humidity, pressure, pitch, roll, yaw)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    format_timestamp(timestamp),
                    record.temperature,
                    record.humidity,
                    record.pressure,
                    record.pitch,
                    record.roll,
                    record.yaw,
                ],
            )
            .with_context(|| "failed to insert sensor reading")?;
            let id = tx.last_insert_rowid();

            tx.commit().context("failed to commit sensor reading")?;

            Ok(stored(id, timestamp, &record))
        })
        .await
    }

    /// Up to `limit` readings, newest first.
    pub async fn latest_readings(&self, limit: usize) -> Result<Vec<SensorReading>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS}
                 FROM sensor_data
                 ORDER BY julianday(timestamp) DESC, id DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                if let Some(reading) = reading_from_row(row)? {
                    readings.push(reading);
                }
            }

            Ok(readings)
        })
        .await
    }

    pub async fn count_readings(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

fn stored(id: i64, timestamp: DateTime<Utc>, record: &NewReading) -> SensorReading {
    SensorReading {
        id,
        timestamp,
        temperature: Some(record.temperature),
        humidity: Some(record.humidity),
        pressure: Some(record.pressure),
        pitch: Some(record.pitch),
        roll: Some(record.roll),
        yaw: Some(record.yaw),
    }
}
