use crate::db::{InsertOutcome, NewQuote, Quote, QuoteCounts};
use crate::error::{BotError, Result};
use crate::service::repository::QuoteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local `QuoteRepository`; nothing survives a restart.
#[derive(Default)]
pub struct MemoryQuoteStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    quotes: BTreeMap<i64, Quote>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `(text, author)` pairs; blank pairs are dropped.
    pub fn with_quotes<'a>(items: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for (text, author) in items {
                if let Some(quote) = NewQuote::new(text, author, None::<&str>) {
                    state.insert(quote);
                }
            }
        }
        store
    }

    /// Copy of every stored quote, ordered by id.
    pub fn snapshot(&self) -> Vec<Quote> {
        self.lock().quotes.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // state stays consistent even if a holder panicked: every mutation is a single step
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn insert(&mut self, quote: NewQuote) -> InsertOutcome {
        if let Some(existing) = self
            .quotes
            .values()
            .find(|q| q.text == quote.text && q.author == quote.author)
        {
            return InsertOutcome::Duplicate(existing.id);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.quotes.insert(
            id,
            Quote {
                id,
                text: quote.text,
                author: quote.author,
                source: quote.source,
                last_used_at: None,
                used_in_cycle: false,
                added_at: Utc::now(),
            },
        );
        InsertOutcome::Inserted(id)
    }
}

#[async_trait]
impl QuoteRepository for MemoryQuoteStore {
    async fn counts(&self) -> Result<QuoteCounts> {
        let state = self.lock();
        let total = state.quotes.len() as u64;
        let used = state.quotes.values().filter(|q| q.used_in_cycle).count() as u64;
        Ok(QuoteCounts {
            total,
            used,
            unused: total - used,
        })
    }

    async fn eligible_ids(&self) -> Result<Vec<i64>> {
        Ok(self
            .lock()
            .quotes
            .values()
            .filter(|q| !q.used_in_cycle)
            .map(|q| q.id)
            .collect())
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<Quote> {
        let mut state = self.lock();
        let quote = state.quotes.get_mut(&id).ok_or(BotError::QuoteNotFound(id))?;
        quote.used_in_cycle = true;
        quote.last_used_at = Some(at);
        Ok(quote.clone())
    }

    async fn reset_cycle(&self) -> Result<u64> {
        let mut state = self.lock();
        let mut flipped = 0;
        for quote in state.quotes.values_mut().filter(|q| q.used_in_cycle) {
            quote.used_in_cycle = false;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn insert(&self, quote: NewQuote) -> Result<InsertOutcome> {
        Ok(self.lock().insert(quote))
    }

    async fn get(&self, id: i64) -> Result<Option<Quote>> {
        Ok(self.lock().quotes.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_store_rejects_duplicates() {
        let store = MemoryQuoteStore::with_quotes([("a", "x"), ("a", "x"), ("", "x"), ("b", "y")]);
        assert_eq!(store.counts().await.unwrap().total, 2);

        let again = store
            .insert(NewQuote::new("b", "y", None::<&str>).unwrap())
            .await
            .unwrap();
        assert!(matches!(again, InsertOutcome::Duplicate(_)));
    }

    #[tokio::test]
    async fn flags_partition_the_store() {
        let store = MemoryQuoteStore::with_quotes([("a", "x"), ("b", "x"), ("c", "x")]);
        let first = store.eligible_ids().await.unwrap()[0];
        store.mark_used(first, Utc::now()).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.used + counts.unused, counts.total);
        assert_eq!(counts.used, 1);
        assert!(!store.eligible_ids().await.unwrap().contains(&first));

        assert_eq!(store.reset_cycle().await.unwrap(), 1);
        assert_eq!(store.eligible_ids().await.unwrap().len(), 3);
    }
}
