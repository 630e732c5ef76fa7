use crate::error::Result;
use crate::pipeline::{Pipeline, RunReport};
use crate::service::repository::QuoteRepository;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span};

/// First occurrence of `post_time` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, post_time: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(post_time).and_utc();
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Runs the pipeline once per day at a fixed UTC time.
pub struct Scheduler<R> {
    pipeline: Pipeline<R>,
    post_time: NaiveTime,
    runs: u64,
}

impl<R: QuoteRepository> Scheduler<R> {
    pub fn new(pipeline: Pipeline<R>, post_time: NaiveTime) -> Self {
        Self {
            pipeline,
            post_time,
            runs: 0,
        }
    }

    /// Execute one run inside its own span. Failures are logged, never propagated.
    pub async fn tick(&mut self) -> Option<RunReport> {
        self.runs += 1;
        let pipeline = &self.pipeline;
        async move {
            let outcome: Result<RunReport> = pipeline.run_once().await;
            match outcome {
                Ok(report) => {
                    info!(
                        quote_id = report.quote_id,
                        message_id = report.message_id,
                        cycle_reset = report.cycle_reset,
                        "run finished"
                    );
                    Some(report)
                }
                Err(e) => {
                    error!(error = %e, "run failed");
                    None
                }
            }
        }
        .instrument(info_span!("run", run = self.runs))
        .await
    }

    /// Loop until `shutdown` resolves. With `run_now` the first run happens immediately.
    ///
    /// The next trigger is computed after each run finishes, so a slow run never
    /// causes a double post.
    pub async fn run_until<F>(&mut self, run_now: bool, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if run_now {
            info!("running immediately before entering the schedule");
            self.tick().await;
        }

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.post_time);
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next.to_rfc3339(), delay_secs = delay.as_secs(), "next post scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    info!(runs = self.runs, "shutdown requested; scheduler stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 28, h, m, s).unwrap()
    }

    #[test]
    fn later_today_when_time_is_ahead() {
        let post = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(next_run_after(at(7, 59, 59), post), at(8, 0, 0));
    }

    #[test]
    fn tomorrow_when_time_has_passed_or_is_now() {
        let post = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap();
        assert_eq!(next_run_after(at(8, 0, 0), post), tomorrow);
        assert_eq!(next_run_after(at(23, 30, 0), post), tomorrow);
    }

    #[test]
    fn rolls_over_month_end() {
        let post = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, post),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn stops_on_shutdown_after_immediate_run() {
        use crate::error::BotError;
        use crate::pipeline::{
            ImageRenderer, Insight, InsightGenerator, Post, PublishReceipt, Publisher, RenderedImage,
        };
        use crate::service::memory::MemoryQuoteStore;
        use async_trait::async_trait;
        use std::sync::Arc;

        struct Refuse;

        #[async_trait]
        impl InsightGenerator for Refuse {
            async fn generate(&self, _: &str) -> Result<Insight> {
                Err(BotError::Generation("offline".into()))
            }
        }

        #[async_trait]
        impl ImageRenderer for Refuse {
            async fn render(&self, _: &str) -> Result<RenderedImage> {
                Err(BotError::Render("offline".into()))
            }
        }

        #[async_trait]
        impl Publisher for Refuse {
            async fn publish(&self, _: &Post<'_>) -> Result<PublishReceipt> {
                Err(BotError::Publish("offline".into()))
            }
        }

        let store = Arc::new(MemoryQuoteStore::with_quotes([("Hold fast.", "Seneca")]));
        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(Refuse),
            Arc::new(Refuse),
            Arc::new(Refuse),
        );
        let mut scheduler = Scheduler::new(pipeline, NaiveTime::from_hms_opt(8, 0, 0).unwrap());

        scheduler.run_until(true, async {}).await;

        assert_eq!(scheduler.runs, 1);
        assert!(store.snapshot()[0].used_in_cycle);
    }
}
