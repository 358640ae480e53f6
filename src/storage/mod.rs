//! Post and prediction persistence
//!
//! The processor and aggregator only see the [`PostStore`] and
//! [`PredictionStore`] traits. [`Database`] backs them with SQLite;
//! [`MemoryStore`] is the in-process double used by tests.

pub mod memory;


pub use memory::MemoryStore;

use crate::classifier::TradingSignal;
use crate::error::Result;
use crate::types::{MediaRef, Post, Prediction, RecentPrediction, Trend};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Ingestion-side view of posts
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Up to `limit` unprocessed posts, most recent first
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<Post>>;

    /// Flip the processed marker; a single-row update
    async fn mark_processed(&self, post_id: &str) -> Result<()>;
}

/// Append-only prediction log
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn append_predictions(&self, predictions: &[Prediction]) -> Result<()>;

    /// Predictions whose target date lies in `[from, to]`
    async fn predictions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Prediction>>;

    async fn append_signal(&self, signal: &TradingSignal) -> Result<()>;
}

pub(crate) fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn date_text(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// SQLite-backed store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                author_screen_name TEXT NOT NULL,
                full_text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                media TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_processed_created
            ON posts(processed, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                trend TEXT NOT NULL,
                target_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(post_id, target_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_target
            ON predictions(target_date, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                post_id TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                entry TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                confidence TEXT NOT NULL,
                timeframe TEXT,
                reasoning TEXT NOT NULL,
                indicated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a post if it is new, refreshing text and media otherwise.
    /// The processed marker of an existing post is left alone.
    /// Returns true when the post was inserted.
    pub async fn upsert_post(&self, post: &Post) -> Result<bool> {
        let mut media: Vec<MediaRef> = Vec::new();
        for m in &post.media {
            if !m.url.is_empty() && !media.contains(m) {
                media.push(m.clone());
            }
        }

        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as("SELECT processed FROM posts WHERE id = ?")
            .bind(&post.id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, author_screen_name, full_text, created_at, media, processed)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                full_text = excluded.full_text,
                media = excluded.media,
                author_screen_name = excluded.author_screen_name
            "#,
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.author_screen_name)
        .bind(&post.text)
        .bind(timestamp_text(&post.created_at))
        .bind(serde_json::to_string(&media)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(existing.is_none())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, author_id, author_screen_name, full_text, created_at, media, processed
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.try_into().ok()))
    }

    /// Predictions targeting `day` joined with their posts, newest post first
    pub async fn recent_predictions(
        &self,
        day: NaiveDate,
        limit: i64,
    ) -> Result<Vec<RecentPrediction>> {
        let rows = sqlx::query_as::<_, RecentRow>(
            r#"
            SELECT p.id, p.post_id, p.author_id, p.trend, p.target_date, p.created_at,
                   t.author_screen_name, t.full_text, t.created_at AS post_created_at,
                   t.media, t.processed
            FROM predictions p
            JOIN posts t ON t.id = p.post_id
            WHERE p.target_date = ?
            ORDER BY t.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(date_text(&day))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    pub async fn signal_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signals")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PostStore for Database {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, author_id, author_screen_name, full_text, created_at, media, processed
            FROM posts
            WHERE processed = 0
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id = r.id.clone();
                match Post::try_from(r) {
                    Ok(post) => Some(post),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable post {}: {}", id, e);
                        None
                    }
                }
            })
            .collect())
    }

    async fn mark_processed(&self, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET processed = 1 WHERE id = ? AND processed = 0")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for Database {
    async fn append_predictions(&self, predictions: &[Prediction]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for prediction in predictions {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO predictions (id, post_id, author_id, trend, target_date, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&prediction.id)
            .bind(&prediction.post_id)
            .bind(&prediction.author_id)
            .bind(prediction.trend.as_str())
            .bind(date_text(&prediction.target_date))
            .bind(timestamp_text(&prediction.created_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn predictions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Prediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT id, post_id, author_id, trend, target_date, created_at
            FROM predictions
            WHERE target_date >= ? AND target_date <= ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(date_text(&from))
        .bind(date_text(&to))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    async fn append_signal(&self, signal: &TradingSignal) -> Result<()> {
        let timeframe = signal
            .timeframe
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO signals
            (post_id, direction, entry, take_profit, stop_loss, confidence, timeframe, reasoning, indicated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.post_id)
        .bind(signal.direction.as_str())
        .bind(signal.entry.to_string())
        .bind(signal.take_profit.to_string())
        .bind(signal.stop_loss.to_string())
        .bind(signal.confidence.to_string())
        .bind(timeframe)
        .bind(&signal.reasoning)
        .bind(timestamp_text(&signal.indicated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: String,
    author_id: String,
    author_screen_name: String,
    full_text: String,
    created_at: String,
    media: String,
    processed: i64,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> std::result::Result<Self, Self::Error> {
        Ok(Post {
            id: row.id,
            author_id: row.author_id,
            author_screen_name: row.author_screen_name,
            text: row.full_text,
            created_at: row.created_at.parse()?,
            media: serde_json::from_str(&row.media)?,
            processed: row.processed != 0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: String,
    post_id: String,
    author_id: String,
    trend: String,
    target_date: String,
    created_at: String,
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = anyhow::Error;

    fn try_from(row: PredictionRow) -> std::result::Result<Self, Self::Error> {
        Ok(Prediction {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            trend: row.trend.parse::<Trend>().map_err(anyhow::Error::msg)?,
            target_date: row.target_date.parse()?,
            created_at: row.created_at.parse()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecentRow {
    id: String,
    post_id: String,
    author_id: String,
    trend: String,
    target_date: String,
    created_at: String,
    author_screen_name: String,
    full_text: String,
    post_created_at: String,
    media: String,
    processed: i64,
}

impl TryFrom<RecentRow> for RecentPrediction {
    type Error = anyhow::Error;

    fn try_from(row: RecentRow) -> std::result::Result<Self, Self::Error> {
        let post = Post::try_from(PostRow {
            id: row.post_id.clone(),
            author_id: row.author_id.clone(),
            author_screen_name: row.author_screen_name,
            full_text: row.full_text,
            created_at: row.post_created_at,
            media: row.media,
            processed: row.processed,
        })?;
        let prediction = Prediction::try_from(PredictionRow {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            trend: row.trend,
            target_date: row.target_date,
            created_at: row.created_at,
        })?;

        Ok(RecentPrediction { prediction, post })
    }
}
