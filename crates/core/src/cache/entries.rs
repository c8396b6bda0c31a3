//! Entry and revalidation-token operations on the SQLite store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::key::CacheKey;
use super::store::{CacheStore, StoredEntry, format_timestamp, parse_timestamp};
use crate::Error;

#[async_trait]
impl CacheStore for CacheDb {
    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, Error> {
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let result = conn.query_row(
                    "SELECT key, payload, created_at, updated_at FROM entries WHERE key_hash = ?1",
                    params![key_hash],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                );

                match result {
                    Ok((key, payload, created_at, updated_at)) => Ok(Some(StoredEntry {
                        key,
                        payload,
                        created_at: parse_timestamp(&created_at)?,
                        updated_at: parse_timestamp(&updated_at)?,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Single UPSERT: the row is replaced atomically and `created_at` survives.
    async fn put(&self, key: &CacheKey, payload: String) -> Result<(), Error> {
        let key_hash = key.hash();
        let key = key.as_str().to_string();
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key_hash, key, payload, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?4)
                    ON CONFLICT(key_hash) DO UPDATE SET
                        key = excluded.key,
                        payload = excluded.payload,
                        updated_at = excluded.updated_at",
                    params![key_hash, key, payload, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn revalidation_token(&self, locator: &str) -> Result<Option<String>, Error> {
        let locator = locator.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT token FROM revalidation_tokens WHERE locator = ?1",
                    params![locator],
                    |row| row.get(0),
                );

                match result {
                    Ok(token) => Ok(Some(token)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put_revalidation_token(&self, locator: &str, token: &str) -> Result<(), Error> {
        let locator = locator.to_string();
        let token = token.to_string();
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO revalidation_tokens (locator, token, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(locator) DO UPDATE SET
                        token = excluded.token,
                        updated_at = excluded.updated_at",
                    params![locator, token, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheDb {
    /// Number of stored entries.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries not updated within `age`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_older_than(&self, age: Duration) -> Result<u64, Error> {
        let age = chrono::Duration::from_std(age).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let cutoff = format_timestamp(&(Utc::now() - age));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE updated_at < ?1", params![cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of one provider category.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_category(&self, provider: &str, category: &str) -> Result<u64, Error> {
        // canonical keys are JSON arrays starting with the provider and category
        let prefix = serde_json::json!([provider, category]).to_string();
        let pattern = format!("{},%", prefix.trim_end_matches(']'));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE key LIKE ?1 ESCAPE '\\'", params![
                    escape_like(&pattern)
                ])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge the least recently updated entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_entries(&self, max_entries: usize) -> Result<u64, Error> {
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM entries WHERE key_hash IN (
                    SELECT key_hash FROM entries ORDER BY updated_at ASC LIMIT ?1
                )",
                    params![count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

/// Escape LIKE wildcards in everything except the trailing `%`.
fn escape_like(pattern: &str) -> String {
    let (body, wildcard) = pattern.split_at(pattern.len() - 1);
    let mut escaped = String::with_capacity(pattern.len() + 4);
    for c in body.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push_str(wildcard);
    escaped
}
