use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{
    helpers::{format_timestamp, parse_optional_datetime, to_i64, to_u64},
    Database, PendingTask,
};
use crate::machine::AccountingAnchors;

impl Database {
    /// Queue an anchor write; writes land in the order they were queued.
    pub fn queue_anchor_save(&self, anchors: &AccountingAnchors) -> Result<PendingTask<()>> {
        let anchors = anchors.clone();
        self.submit(move |conn| {
            conn.execute(
                "INSERT INTO machine_anchors
                 (id, has_started, is_running, run_started_at, last_paused_at,
                  cumulative_stop_seconds, running_seconds, stop_seconds, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     has_started = excluded.has_started,
                     is_running = excluded.is_running,
                     run_started_at = excluded.run_started_at,
                     last_paused_at = excluded.last_paused_at,
                     cumulative_stop_seconds = excluded.cumulative_stop_seconds,
                     running_seconds = excluded.running_seconds,
                     stop_seconds = excluded.stop_seconds,
                     updated_at = excluded.updated_at",
                params![
                    anchors.has_started,
                    anchors.is_running,
                    anchors.run_started_at.as_ref().map(format_timestamp),
                    anchors.last_paused_at.as_ref().map(format_timestamp),
                    to_i64(anchors.cumulative_stop_seconds)?,
                    to_i64(anchors.running_seconds)?,
                    to_i64(anchors.stop_seconds)?,
                    format_timestamp(&Utc::now()),
                ],
            )
            .with_context(|| "failed to save machine anchors")?;
            Ok(())
        })
    }

    pub async fn load_anchors(&self) -> Result<Option<AccountingAnchors>> {
        self.execute(|conn| {
            let raw = conn
                .query_row(
                    "SELECT has_started, is_running, run_started_at, last_paused_at,
                            cumulative_stop_seconds, running_seconds, stop_seconds
                     FROM machine_anchors
                     WHERE id = 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, bool>(0)?,
                            row.get::<_, bool>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    },
                )
                .optional()?;

            let Some((has_started, is_running, started, paused, cumulative, running, stop)) = raw
            else {
                return Ok(None);
            };

            Ok(Some(AccountingAnchors {
                has_started,
                is_running,
                run_started_at: parse_optional_datetime(started, "run_started_at")?,
                last_paused_at: parse_optional_datetime(paused, "last_paused_at")?,
                cumulative_stop_seconds: to_u64(cumulative, "cumulative_stop_seconds")?,
                running_seconds: to_u64(running, "running_seconds")?,
                stop_seconds: to_u64(stop, "stop_seconds")?,
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::db::Database;
    use crate::machine::AccountingAnchors;

    #[tokio::test]
    async fn missing_row_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("packline.sqlite3")).unwrap();
        assert_eq!(db.load_anchors().await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_queued_save_wins_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packline.sqlite3");
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let paused = Utc.with_ymd_and_hms(2024, 3, 1, 6, 10, 0).unwrap();

        let running = AccountingAnchors {
            has_started: true,
            is_running: true,
            run_started_at: Some(started),
            ..Default::default()
        };
        let stopped = AccountingAnchors {
            has_started: true,
            is_running: false,
            run_started_at: Some(started),
            last_paused_at: Some(paused),
            cumulative_stop_seconds: 30,
            running_seconds: 570,
            stop_seconds: 30,
        };

        {
            let db = Database::new(path.clone()).unwrap();
            let first = db.queue_anchor_save(&running).unwrap();
            let second = db.queue_anchor_save(&stopped).unwrap();
            // replies awaited out of order; the writes still land in queue order
            Database::finish(second).await.unwrap();
            Database::finish(first).await.unwrap();
        }

        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.load_anchors().await.unwrap(), Some(stopped));
    }
}
