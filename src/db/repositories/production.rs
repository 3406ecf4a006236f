use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_timestamp, parse_datetime, parse_optional_datetime, to_i64, to_u32, to_u64},
    models::ProductionRecord,
    Database,
};

const SELECT_COLUMNS: &str = "SELECT id, machine_name, batch, batch_size, product, start_time,
        running_time, stop_time, actual_value, expected_value, efficiency, created_at
 FROM production_data";

fn row_to_record(row: &Row) -> Result<ProductionRecord> {
    let start_time: Option<String> = row.get("start_time")?;
    let created_at: String = row.get("created_at")?;

    Ok(ProductionRecord {
        id: row.get("id")?,
        machine_name: row.get("machine_name")?,
        batch: row.get("batch")?,
        batch_size: to_u32(row.get("batch_size")?, "batch_size")?,
        product: row.get("product")?,
        start_time: parse_optional_datetime(start_time, "start_time")?,
        running_seconds: to_u64(row.get("running_time")?, "running_time")?,
        stop_seconds: to_u64(row.get("stop_time")?, "stop_time")?,
        actual_units: to_u64(row.get("actual_value")?, "actual_value")?,
        expected_units: to_u64(row.get("expected_value")?, "expected_value")?,
        efficiency: row.get("efficiency")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_production_record(&self, record: &ProductionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO production_data
                 (id, machine_name, batch, batch_size, product, start_time, running_time,
                  stop_time, actual_value, expected_value, efficiency, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.machine_name,
                    record.batch,
                    record.batch_size,
                    record.product,
                    record.start_time.as_ref().map(format_timestamp),
                    to_i64(record.running_seconds)?,
                    to_i64(record.stop_seconds)?,
                    to_i64(record.actual_units)?,
                    to_i64(record.expected_units)?,
                    record.efficiency,
                    format_timestamp(&record.created_at),
                ],
            )
            .with_context(|| "failed to insert production record")?;
            Ok(())
        })
        .await
    }

    /// Newest first, at most `limit` rows.
    pub async fn list_recent_production(&self, limit: usize) -> Result<Vec<ProductionRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Every stored row, newest first. Backs the CSV export.
    pub async fn list_all_production(&self) -> Result<Vec<ProductionRecord>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}
