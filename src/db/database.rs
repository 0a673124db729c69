use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::models::{encode_images, SessionRow};
use crate::session::{Session, SessionRepository, SetOutcome};

/// Session repository backed by SQLite; survives restarts and lets several
/// processes share one file with version-checked writes.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteSessionStore {
    pub async fn init(database_url: &str, timeout: Duration) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool, timeout).await
    }

    pub async fn with_pool(pool: SqlitePool, timeout: Duration) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (\
                user_id TEXT PRIMARY KEY,\
                mode TEXT NOT NULL,\
                description TEXT NOT NULL DEFAULT '',\
                images_json TEXT NOT NULL DEFAULT '[]',\
                created_at_ms INTEGER NOT NULL,\
                version INTEGER NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at_ms);")
            .execute(&pool)
            .await?;

        info!("SQLite session store ready");
        Ok(SqliteSessionStore { pool, timeout })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT user_id, mode, description, images_json, created_at_ms, version \
             FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn write(&self, user_id: &str, session: &Session) -> Result<bool> {
        let images_json = encode_images(&session.images);
        let created_at_ms = session.created_at.timestamp_millis();
        let expected = i64::try_from(session.version).unwrap_or(i64::MAX);

        let result = if session.version == 0 {
            sqlx::query(
                "INSERT INTO sessions (user_id, mode, description, images_json, created_at_ms, version) \
                 VALUES (?, ?, ?, ?, ?, 1) ON CONFLICT(user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(session.mode.as_str())
            .bind(&session.description)
            .bind(images_json)
            .bind(created_at_ms)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE sessions SET mode = ?, description = ?, images_json = ?, created_at_ms = ?, \
                 version = version + 1 WHERE user_id = ? AND version = ?",
            )
            .bind(session.mode.as_str())
            .bind(&session.description)
            .bind(images_json)
            .bind(created_at_ms)
            .bind(user_id)
            .bind(expected)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionStore {
    async fn get(&self, user_id: &str) -> Session {
        match self.fetch(user_id).await {
            Ok(Some(row)) => row.into_session(),
            Ok(None) => Session::idle(Utc::now()),
            Err(err) => {
                warn!(user_id, "Failed to read session, treating as idle: {err}");
                Session::idle(Utc::now())
            }
        }
    }

    async fn set(&self, user_id: &str, session: &Session) -> SetOutcome {
        match self.write(user_id, session).await {
            Ok(true) => SetOutcome::Stored,
            Ok(false) => SetOutcome::Conflict,
            Err(err) => {
                warn!(user_id, "Failed to write session: {err}");
                SetOutcome::Unavailable
            }
        }
    }

    async fn delete(&self, user_id: &str) {
        if let Err(err) = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
        {
            warn!(user_id, "Failed to delete session: {err}");
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = (now - self.timeout).timestamp_millis();
        match sqlx::query("DELETE FROM sessions WHERE created_at_ms < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected() as usize,
            Err(err) => {
                warn!("Session sweep failed: {err}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Mode, StoredImage};

    async fn memory_store() -> SqliteSessionStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteSessionStore::with_pool(pool, Duration::minutes(30))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_images_and_description() {
        let store = memory_store().await;
        let now = Utc::now();
        let mut session = store.get("u").await.restart(Mode::AmuletCollection, now);
        session.append_description("阿贊");
        session.images.push(StoredImage {
            bytes: vec![0xff, 0xd8, 0xff],
            mime_type: "image/jpeg".to_string(),
        });
        assert_eq!(store.set("u", &session).await, SetOutcome::Stored);

        let loaded = store.get("u").await;
        assert_eq!(loaded.mode, Mode::AmuletCollection);
        assert_eq!(loaded.description, "阿贊");
        assert_eq!(loaded.images, session.images);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_conflict_instead_of_overwriting() {
        let store = memory_store().await;
        let now = Utc::now();
        let seeded = store.get("u").await.restart(Mode::AmuletCollection, now);
        store.set("u", &seeded).await;

        let mut first = store.get("u").await;
        let mut second = store.get("u").await;
        first.append_description("one");
        second.append_description("two");

        assert_eq!(store.set("u", &first).await, SetOutcome::Stored);
        assert_eq!(store.set("u", &second).await, SetOutcome::Conflict);
        assert_eq!(store.get("u").await.description, "one");
    }

    #[tokio::test]
    async fn sweep_removes_sessions_past_the_timeout() {
        let store = memory_store().await;
        let now = Utc::now();
        let stale_at = now - Duration::minutes(45);
        let stale = Session::idle(stale_at).restart(Mode::FortuneTranslation, stale_at);
        store.set("stale", &stale).await;
        let fresh = Session::idle(now).restart(Mode::FortuneTranslation, now);
        store.set("fresh", &fresh).await;

        assert_eq!(store.sweep_expired(now).await, 1);
        assert_eq!(store.get("stale").await.mode, Mode::Receipt);
        assert_eq!(store.get("fresh").await.mode, Mode::FortuneTranslation);
    }
}
