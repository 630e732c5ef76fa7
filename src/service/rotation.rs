//! Quote rotation: sampling without replacement over a pool that refills once
//! every quote has been used.

use crate::db::Quote;
use crate::error::{BotError, Result};
use crate::service::repository::QuoteRepository;
use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

/// Snapshot of one rotation cycle: how many quotes exist and which are still eligible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPool {
    total: u64,
    eligible: Vec<i64>,
}

impl RotationPool {
    pub fn new(total: u64, eligible: Vec<i64>) -> Self {
        Self { total, eligible }
    }

    pub async fn load<R: QuoteRepository + ?Sized>(repo: &R) -> Result<Self> {
        let counts = repo.counts().await?;
        let eligible = repo.eligible_ids().await?;
        Ok(Self::new(counts.total, eligible))
    }

    /// The store holds no quotes at all.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Every quote has been used in this cycle.
    pub fn is_exhausted(&self) -> bool {
        self.eligible.is_empty()
    }

    pub fn eligible(&self) -> &[i64] {
        &self.eligible
    }

    /// Uniform pick among eligible ids.
    pub fn draw<G: Rng + ?Sized>(&self, rng: &mut G) -> Option<i64> {
        self.eligible.choose(rng).copied()
    }
}

/// Result of one selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub quote: Quote,
    /// The previous cycle was exhausted and every flag was cleared before this pick.
    pub cycle_reset: bool,
}

pub struct QuoteSelector<R> {
    repo: R,
}

impl<R: QuoteRepository> QuoteSelector<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Pick an eligible quote uniformly at random and mark it used.
    ///
    /// When the cycle is exhausted every flag is reset first. Fails with
    /// [`BotError::EmptyStore`] when the store has no quotes.
    pub async fn select_next_quote(&self) -> Result<Selection> {
        let mut pool = RotationPool::load(&self.repo).await?;
        if pool.is_empty() {
            return Err(BotError::EmptyStore);
        }

        let mut cycle_reset = false;
        if pool.is_exhausted() {
            let flipped = self.repo.reset_cycle().await?;
            info!(flipped, "rotation cycle complete; starting a new one");
            cycle_reset = true;
            pool = RotationPool::load(&self.repo).await?;
        }

        let id = pool
            .draw(&mut rand::thread_rng())
            .ok_or(BotError::EmptyStore)?;
        debug!(id, eligible = pool.eligible().len(), "drew quote");

        let quote = self.repo.mark_used(id, Utc::now()).await?;
        Ok(Selection { quote, cycle_reset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::MemoryQuoteStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::{HashMap, HashSet};

    fn store_of(n: usize) -> MemoryQuoteStore {
        let texts: Vec<String> = (0..n).map(|i| format!("quote {i}")).collect();
        MemoryQuoteStore::with_quotes(texts.iter().map(|t| (t.as_str(), "Epictetus")))
    }

    #[tokio::test]
    async fn empty_store_fails() {
        let selector = QuoteSelector::new(MemoryQuoteStore::new());
        let err = selector.select_next_quote().await.unwrap_err();
        assert!(matches!(err, BotError::EmptyStore));
    }

    #[tokio::test]
    async fn full_cycle_selects_every_quote_exactly_once() {
        let selector = QuoteSelector::new(store_of(7));
        let mut seen = HashSet::new();
        for _ in 0..7 {
            let selection = selector.select_next_quote().await.unwrap();
            assert!(!selection.cycle_reset);
            assert!(selection.quote.used_in_cycle);
            assert!(selection.quote.last_used_at.is_some());
            assert!(seen.insert(selection.quote.id), "quote repeated within a cycle");
        }
        assert_eq!(seen.len(), 7);
        assert!(selector.repository().eligible_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_cycle_resets_and_continues() {
        let selector = QuoteSelector::new(store_of(3));
        let mut first_cycle = HashSet::new();
        for _ in 0..3 {
            first_cycle.insert(selector.select_next_quote().await.unwrap().quote.id);
        }
        assert_eq!(first_cycle.len(), 3);

        let fourth = selector.select_next_quote().await.unwrap();
        assert!(fourth.cycle_reset);
        assert!(first_cycle.contains(&fourth.quote.id));

        let counts = selector.repository().counts().await.unwrap();
        assert_eq!((counts.used, counts.unused), (1, 2));

        // the new cycle finishes the remaining two without repeating the fourth pick
        let mut second_cycle = HashSet::from([fourth.quote.id]);
        for _ in 0..2 {
            let s = selector.select_next_quote().await.unwrap();
            assert!(!s.cycle_reset);
            assert!(second_cycle.insert(s.quote.id));
        }
    }

    #[test]
    fn draw_is_spread_over_every_eligible_id() {
        let pool = RotationPool::new(5, vec![2, 3, 5]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut hits: HashMap<i64, u32> = HashMap::new();
        for _ in 0..3000 {
            *hits.entry(pool.draw(&mut rng).unwrap()).or_default() += 1;
        }
        assert_eq!(hits.len(), 3);
        for count in hits.values() {
            assert!((800..1200).contains(count), "skewed draw: {hits:?}");
        }
    }

    #[test]
    fn exhausted_pool_draws_nothing() {
        let pool = RotationPool::new(2, Vec::new());
        assert!(pool.is_exhausted());
        assert!(!pool.is_empty());
        assert_eq!(pool.draw(&mut StdRng::seed_from_u64(1)), None);
    }
}
