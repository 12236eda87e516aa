use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

/// Storage for review items and their review log.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn insert_item(&self, item: &ReviewItem) -> Result<()>;
    async fn get_item(&self, id: Uuid) -> Result<Option<ReviewItem>>;
    async fn list_items(&self, user_id: Option<&str>) -> Result<Vec<ReviewItem>>;
    async fn list_due_items(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<ReviewItem>>;
    /// Store a rescheduled item and its review record atomically.
    ///
    /// Returns `false`, writing nothing, when the stored item no longer
    /// matches `previous` (another review got there first).
    async fn apply_review(
        &self,
        previous: &ReviewItem,
        updated: &ReviewItem,
        record: &ReviewRecord,
    ) -> Result<bool>;
    async fn delete_item(&self, id: Uuid) -> Result<bool>;
    async fn list_reviews_for_item(&self, item_id: Uuid) -> Result<Vec<ReviewRecord>>;
    async fn list_reviews_for_user(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewRecord>>;
}

/// Fixed-width UTC timestamps so that text comparison follows time order.
///
/// Only four-digit years keep the width fixed, so anything else is refused.
fn to_db_timestamp(value: DateTime<Utc>) -> Result<String> {
    if !(0..=9999).contains(&value.year()) {
        return Err(anyhow!("timestamp {} is outside the storable range", value));
    }
    Ok(value.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn from_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "schema is up to date");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_items (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content_id TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'document',
                difficulty REAL NOT NULL DEFAULT 0.5,
                interval INTEGER NOT NULL DEFAULT 0,
                repetitions INTEGER NOT NULL DEFAULT 0,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                next_review_date TEXT NOT NULL,
                last_reviewed TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, content_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_records (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                quality INTEGER NOT NULL,
                reviewed_at TEXT NOT NULL,
                interval INTEGER NOT NULL,
                ease_factor REAL NOT NULL,
                response_time_ms INTEGER,
                FOREIGN KEY (item_id) REFERENCES review_items(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_review_items_due ON review_items (user_id, next_review_date)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_review_records_user ON review_records (user_id, reviewed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewItem> {
        Ok(ReviewItem {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            content_id: row.get("content_id"),
            content_type: row.get("content_type"),
            difficulty: row.get("difficulty"),
            interval: row.get("interval"),
            repetitions: row.get("repetitions"),
            ease_factor: row.get("ease_factor"),
            next_review_date: from_db_timestamp(&row.get::<String, _>("next_review_date"))?,
            last_reviewed: row
                .get::<Option<String>, _>("last_reviewed")
                .map(|s| from_db_timestamp(&s))
                .transpose()?,
            created_at: from_db_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }

    fn rows_to_items(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<ReviewItem>> {
        rows.iter().map(Self::row_to_item).collect()
    }

    fn rows_to_records(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<ReviewRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(ReviewRecord {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                item_id: Uuid::parse_str(&row.get::<String, _>("item_id"))?,
                user_id: row.get("user_id"),
                quality: row.get("quality"),
                reviewed_at: from_db_timestamp(&row.get::<String, _>("reviewed_at"))?,
                interval: row.get("interval"),
                ease_factor: row.get("ease_factor"),
                response_time_ms: row.get("response_time_ms"),
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl ReviewRepository for Database {
    async fn insert_item(&self, item: &ReviewItem) -> Result<()> {
        let started = Instant::now();

        sqlx::query(
            r#"
            INSERT INTO review_items (id, user_id, content_id, content_type, difficulty, interval,
                                      repetitions, ease_factor, next_review_date, last_reviewed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.user_id)
        .bind(&item.content_id)
        .bind(&item.content_type)
        .bind(item.difficulty)
        .bind(item.interval)
        .bind(item.repetitions)
        .bind(item.ease_factor)
        .bind(to_db_timestamp(item.next_review_date)?)
        .bind(item.last_reviewed.map(to_db_timestamp).transpose()?)
        .bind(to_db_timestamp(item.created_at)?)
        .execute(&self.pool)
        .await?;

        log_db_operation!(
            debug,
            "insert_item",
            item_id = item.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<ReviewItem>> {
        let row = sqlx::query("SELECT * FROM review_items WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list_items(&self, user_id: Option<&str>) -> Result<Vec<ReviewItem>> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query("SELECT * FROM review_items WHERE user_id = ?1 ORDER BY created_at DESC")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM review_items ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Self::rows_to_items(rows)
    }

    async fn list_due_items(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<ReviewItem>> {
        let started = Instant::now();
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT * FROM review_items
            WHERE next_review_date <= ?1 AND (?2 IS NULL OR user_id = ?2)
            ORDER BY next_review_date ASC
            LIMIT ?3
            "#,
        )
        .bind(to_db_timestamp(now)?)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let items = Self::rows_to_items(rows)?;
        log_db_operation!(
            debug,
            "list_due_items",
            count = items.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(items)
    }

    async fn apply_review(
        &self,
        previous: &ReviewItem,
        updated: &ReviewItem,
        record: &ReviewRecord,
    ) -> Result<bool> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET interval = ?1, repetitions = ?2, ease_factor = ?3,
                next_review_date = ?4, last_reviewed = ?5
            WHERE id = ?6 AND repetitions = ?7 AND last_reviewed IS ?8
            "#,
        )
        .bind(updated.interval)
        .bind(updated.repetitions)
        .bind(updated.ease_factor)
        .bind(to_db_timestamp(updated.next_review_date)?)
        .bind(updated.last_reviewed.map(to_db_timestamp).transpose()?)
        .bind(updated.id.to_string())
        .bind(previous.repetitions)
        .bind(previous.last_reviewed.map(to_db_timestamp).transpose()?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO review_records (id, item_id, user_id, quality, reviewed_at, interval,
                                        ease_factor, response_time_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.item_id.to_string())
        .bind(&record.user_id)
        .bind(record.quality)
        .bind(to_db_timestamp(record.reviewed_at)?)
        .bind(record.interval)
        .bind(record.ease_factor)
        .bind(record.response_time_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        log_db_operation!(
            debug,
            "apply_review",
            item_id = updated.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(true)
    }

    async fn delete_item(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM review_items WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_reviews_for_item(&self, item_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM review_records WHERE item_id = ?1 ORDER BY reviewed_at ASC, rowid ASC",
        )
        .bind(item_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn list_reviews_for_user(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReviewRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM review_records
            WHERE user_id = ?1 AND (?2 IS NULL OR reviewed_at >= ?2)
            ORDER BY reviewed_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .bind(since.map(to_db_timestamp).transpose()?)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }
}
