use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order; `user_version` counts how many have been applied.
const STEPS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

const SCHEMA_VERSION: i32 = STEPS.len() as i32;

pub fn migrate(conn: &mut Connection) -> Result<()> {
    let applied: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;

    if applied > SCHEMA_VERSION {
        bail!("history database is at schema {applied}, this build knows {SCHEMA_VERSION}");
    }
    if applied == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in STEPS.iter().enumerate().skip(applied as usize) {
        tx.execute_batch(sql)
            .with_context(|| format!("schema step {} failed", index + 1))?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit().context("failed to commit schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> i32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn fresh_database_gets_history_table_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        assert_eq!(version(&conn), SCHEMA_VERSION);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'workout_history'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert!(err.to_string().contains("this build knows"));
    }
}
