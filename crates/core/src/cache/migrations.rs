//! Database schema migrations.
//!
//! A `_migrations` table records the highest applied version; each pending
//! migration runs as one SQL batch and is recorded right after it succeeds.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, name, SQL). Versions must be strictly increasing.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "entries", include_str!("../../migrations/001_entries.sql")),
    (2, "revalidation_tokens", include_str!("../../migrations/002_revalidation_tokens.sql")),
];

/// Apply every migration newer than the recorded version.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            conn.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version} ({name}): {e}")))?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
