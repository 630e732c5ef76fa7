use crate::db::{InsertOutcome, NewQuote, Quote, QuoteCounts};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Storage seam for the quote rotation.
///
/// Implementations own the partition invariant: every row is either used in the
/// current cycle or eligible, and only `mark_used`/`reset_cycle` move rows between
/// the two sets.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn counts(&self) -> Result<QuoteCounts>;

    /// Ids of quotes not yet used in the current cycle.
    async fn eligible_ids(&self) -> Result<Vec<i64>>;

    /// Flag the quote as used and stamp `last_used_at`. Returns the updated row.
    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<Quote>;

    /// Start a new cycle. Returns how many rows were flipped back to eligible.
    async fn reset_cycle(&self) -> Result<u64>;

    async fn insert(&self, quote: NewQuote) -> Result<InsertOutcome>;

    async fn get(&self, id: i64) -> Result<Option<Quote>>;
}

#[async_trait]
impl<T: QuoteRepository + ?Sized> QuoteRepository for Arc<T> {
    async fn counts(&self) -> Result<QuoteCounts> {
        (**self).counts().await
    }

    async fn eligible_ids(&self) -> Result<Vec<i64>> {
        (**self).eligible_ids().await
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<Quote> {
        (**self).mark_used(id, at).await
    }

    async fn reset_cycle(&self) -> Result<u64> {
        (**self).reset_cycle().await
    }

    async fn insert(&self, quote: NewQuote) -> Result<InsertOutcome> {
        (**self).insert(quote).await
    }

    async fn get(&self, id: i64) -> Result<Option<Quote>> {
        (**self).get(id).await
    }
}
