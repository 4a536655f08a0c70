use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; `user_version` N means the first N have run.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let applied: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if applied as usize > MIGRATIONS.len() {
        bail!(
            "database schema version {} is newer than this build supports ({})",
            applied,
            MIGRATIONS.len()
        );
    }

    let pending = &MIGRATIONS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (offset, script) in pending.iter().enumerate() {
        let version = applied as usize + offset + 1;
        tx.execute_batch(script)
            .with_context(|| format!("migration to schema version {version} failed"))?;
    }
    tx.pragma_update(None, "user_version", MIGRATIONS.len() as i64)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_migrates_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version as usize, MIGRATIONS.len());
    }

    #[test]
    fn migrated_database_is_left_alone() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        // Tables from the schema exist exactly once.
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('cabins', 'sessions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn newer_schema_than_supported_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
