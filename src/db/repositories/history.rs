use std::collections::HashMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use log::{error, info};
use rusqlite::{params, OptionalExtension};
use tokio::runtime::Handle;

use crate::{
    db::{
        helpers::{format_date, parse_date},
        Database,
    },
    models::HistoryEntry,
    timer::HistorySink,
};

impl Database {
    /// Stores `completed_on` as the latest completion of `routine_id`,
    /// replacing any earlier date.
    pub async fn record_completion(&self, routine_id: &str, completed_on: NaiveDate) -> Result<()> {
        let routine_id = routine_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO workout_history (routine_id, completed_on, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(routine_id) DO UPDATE SET
                     completed_on = excluded.completed_on,
                     updated_at = excluded.updated_at",
                params![routine_id, format_date(completed_on), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn last_completion(&self, routine_id: &str) -> Result<Option<NaiveDate>> {
        let routine_id = routine_id.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT completed_on FROM workout_history WHERE routine_id = ?1",
                    params![routine_id],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|value| parse_date(&value, "completed_on")).transpose()
        })
        .await
    }

    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT routine_id, completed_on
                 FROM workout_history
                 ORDER BY completed_on DESC, routine_id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(HistoryEntry {
                    routine_id: row.get(0)?,
                    completed_on: row.get(1)?,
                });
            }
            Ok(entries)
        })
        .await
    }

    /// History keyed by routine id, the shape the dashboard reads.
    pub async fn history_map(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .list_history()
            .await?
            .into_iter()
            .map(|entry| (entry.routine_id, entry.completed_on))
            .collect())
    }
}

impl HistorySink for Database {
    /// Fire-and-forget write; failures are logged, never surfaced to the engine.
    fn record_completion(&self, routine_id: &str, completed_on: NaiveDate) {
        let Ok(runtime) = Handle::try_current() else {
            error!("no async runtime; completion of {routine_id} not saved");
            return;
        };
        let db = self.clone();
        let routine_id = routine_id.to_string();
        runtime.spawn(async move {
            match Database::record_completion(&db, &routine_id, completed_on).await {
                Ok(()) => info!("saved completion of {routine_id} on {completed_on}"),
                Err(err) => error!("Save history failed for {routine_id}: {err:#}"),
            }
        });
    }
}
