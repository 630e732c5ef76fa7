use crate::db::models::{InsertOutcome, NewQuote, Quote, QuoteCounts};
use crate::db::schema::SQLITE_INIT;
use crate::error::{BotError, Result};
use crate::service::repository::QuoteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::debug;

pub type SqlitePool = Pool<Sqlite>;

const QUOTE_COLUMNS: &str = "id, text, author, source, last_used_at, used_in_cycle, added_at";

#[derive(Clone)]
pub struct QuoteStorage {
    pool: SqlitePool,
}

impl QuoteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let mut pool_opts = SqlitePoolOptions::new();
        // Every connection to `:memory:` is a separate database.
        if database_url.contains(":memory:") {
            pool_opts = pool_opts
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(connect_opts).await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<()> {
        // sqlx::query runs a single statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Quotes most recently posted, newest first.
    pub async fn recently_used(&self, limit: u32) -> Result<Vec<Quote>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes
             WHERE last_used_at IS NOT NULL
             ORDER BY last_used_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    fn row_to_model(row: SqliteRow) -> Result<Quote> {
        let id: i64 = row.try_get("id")?;
        let text: String = row.try_get("text")?;
        let author: String = row.try_get("author")?;
        let source: Option<String> = row.try_get("source")?;
        let last_used_str: Option<String> = row.try_get("last_used_at")?;
        let used_i: i64 = row.try_get("used_in_cycle")?;
        let added_str: String = row.try_get("added_at")?;

        let last_used_at = last_used_str.as_deref().map(parse_timestamp).transpose()?;
        let added_at = parse_timestamp(&added_str)?;

        Ok(Quote {
            id,
            text,
            author,
            source,
            last_used_at,
            used_in_cycle: used_i != 0,
            added_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(parsed.with_timezone(&Utc))
}

#[async_trait]
impl QuoteRepository for QuoteStorage {
    async fn counts(&self) -> Result<QuoteCounts> {
        let (total, used): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(used_in_cycle), 0) FROM quotes",
        )
        .fetch_one(&self.pool)
        .await?;
        let total = total.max(0) as u64;
        let used = used.max(0) as u64;
        Ok(QuoteCounts {
            total,
            used,
            unused: total.saturating_sub(used),
        })
    }

    async fn eligible_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM quotes WHERE used_in_cycle = 0 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<Quote> {
        let row = sqlx::query(&format!(
            "UPDATE quotes SET used_in_cycle = 1, last_used_at = ?
             WHERE id = ? RETURNING {QUOTE_COLUMNS}"
        ))
        .bind(at.to_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BotError::QuoteNotFound(id))?;
        Self::row_to_model(row)
    }

    async fn reset_cycle(&self) -> Result<u64> {
        let res = sqlx::query("UPDATE quotes SET used_in_cycle = 0 WHERE used_in_cycle = 1")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Insert unless `(text, author)` exists; uses `ON CONFLICT DO NOTHING`.
    async fn insert(&self, quote: NewQuote) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            INSERT INTO quotes (text, author, source, used_in_cycle, added_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(text, author) DO NOTHING
            "#,
        )
        .bind(&quote.text)
        .bind(&quote.author)
        .bind(&quote.source)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let outcome = if res.rows_affected() == 1 {
            InsertOutcome::Inserted(res.last_insert_rowid())
        } else {
            let (id,): (i64,) = sqlx::query_as("SELECT id FROM quotes WHERE text = ? AND author = ?")
                .bind(&quote.text)
                .bind(&quote.author)
                .fetch_one(&mut *tx)
                .await?;
            debug!(id, author = %quote.author, "quote already stored");
            InsertOutcome::Duplicate(id)
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn get(&self, id: i64) -> Result<Option<Quote>> {
        let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_model).transpose()
    }
}
