use anyhow::{Context, Result};
use rusqlite::Connection;

/// Creates `sensor_data` and its index when absent. Safe to run on every start.
pub fn ensure_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to open schema transaction")?;

    tx.execute_batch(include_str!("schemas/sensor_data.sql"))
        .context("failed to execute sensor_data.sql")?;

    tx.commit().context("failed to commit schema")?;
    Ok(())
}
