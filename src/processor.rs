//! Batch processor
//!
//! One sweep selects up to `batch_size` unprocessed posts, newest first, and
//! drives each through the relevance filter and the classifier in turn.
//! A post is marked processed only once its outcome is final: irrelevant,
//! classified, or judged not a usable signal. Classification failures and
//! locally rejected predictions leave it for a later sweep. Sweeps never
//! overlap; a trigger that fires while one is running is skipped.

use crate::classifier::{
    Classification, ClassificationRequest, Classifier, DayCall, SignalVerdict, TradingSignal,
};
use crate::error::{IndicatorError, Result};
use crate::notify::Notifier;
use crate::price::PriceFeed;
use crate::relevance::RelevanceFilter;
use crate::storage::{PostStore, PredictionStore};
use crate::types::{Post, Prediction};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepState {
    Idle,
    Selecting,
    Processing,
    Done,
}

/// Counters for one completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub selected: usize,
    pub irrelevant: usize,
    pub classified: usize,
    pub not_signal: usize,
    pub failed: usize,
    pub predictions_written: usize,
    pub signals_accepted: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep was still running
    Skipped,
    Completed(SweepReport),
}

/// Final result for one post
#[derive(Debug, Clone, PartialEq, Eq)]
enum PostOutcome {
    Irrelevant,
    NotASignal,
    Classified { predictions: usize, signal: bool },
}

pub struct BatchProcessor {
    posts: Arc<dyn PostStore>,
    predictions: Arc<dyn PredictionStore>,
    classifier: Arc<dyn Classifier>,
    price_feed: Option<Arc<dyn PriceFeed>>,
    filter: RelevanceFilter,
    notifier: Notifier,
    batch_size: usize,
    /// Last known reference price, refreshed at the start of each sweep
    reference_price: Mutex<Option<Decimal>>,
    state: Mutex<SweepState>,
    running: AtomicBool,
}

/// Clears the running flag however the sweep ends
struct RunningGuard<'a> {
    processor: &'a BatchProcessor,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.processor.state.lock() = SweepState::Idle;
        self.processor.running.store(false, Ordering::SeqCst);
    }
}

impl BatchProcessor {
    pub fn new(
        posts: Arc<dyn PostStore>,
        predictions: Arc<dyn PredictionStore>,
        classifier: Arc<dyn Classifier>,
        filter: RelevanceFilter,
        batch_size: usize,
    ) -> Self {
        Self {
            posts,
            predictions,
            classifier,
            price_feed: None,
            filter,
            notifier: Notifier::disabled(),
            batch_size: batch_size.max(1),
            reference_price: Mutex::new(None),
            state: Mutex::new(SweepState::Idle),
            running: AtomicBool::new(false),
        }
    }

    /// Refresh the prompt's reference price from `feed` once per sweep,
    /// starting from `fallback` until the first successful fetch.
    pub fn with_price_feed(mut self, feed: Arc<dyn PriceFeed>, fallback: Decimal) -> Self {
        self.price_feed = Some(feed);
        self.reference_price = Mutex::new(Some(fallback));
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn state(&self) -> SweepState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn reference_price(&self) -> Option<Decimal> {
        *self.reference_price.lock()
    }

    fn set_state(&self, state: SweepState) {
        *self.state.lock() = state;
    }

    /// Run one sweep unless another is in progress.
    ///
    /// Only a store failure ends the sweep early and is returned; every
    /// per-post classification problem is logged and counted instead.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[Processor] Sweep already in progress, skipping trigger");
            return Ok(SweepOutcome::Skipped);
        }
        let _guard = RunningGuard { processor: self };

        let started = Instant::now();
        let mut report = SweepReport::default();

        self.set_state(SweepState::Selecting);
        let reference_price = self.refresh_reference_price().await;
        let batch = self.posts.fetch_unprocessed(self.batch_size).await?;
        report.selected = batch.len();

        if batch.is_empty() {
            debug!("[Processor] No unprocessed posts");
            self.set_state(SweepState::Done);
            return Ok(SweepOutcome::Completed(report));
        }

        info!("[Processor] Processing {} posts", batch.len());
        self.set_state(SweepState::Processing);

        for post in &batch {
            match self.process_post(post, reference_price).await {
                Ok(PostOutcome::Irrelevant) => report.irrelevant += 1,
                Ok(PostOutcome::NotASignal) => report.not_signal += 1,
                Ok(PostOutcome::Classified { predictions, signal }) => {
                    report.classified += 1;
                    report.predictions_written += predictions;
                    if signal {
                        report.signals_accepted += 1;
                    }
                }
                Err(e) if e.aborts_sweep() => {
                    error!("[Processor] Aborting sweep at post {}: {}", post.id, e);
                    self.set_state(SweepState::Done);
                    return Err(e);
                }
                Err(e) => {
                    warn!("[Processor] Post {} left for a later sweep: {}", post.id, e);
                    report.failed += 1;
                }
            }
        }

        self.set_state(SweepState::Done);
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            "[Processor] Sweep done in {}ms ({}ms/post): selected={}, irrelevant={}, classified={}, not_signal={}, failed={}, predictions={}, signals={}",
            report.duration_ms,
            report.duration_ms / report.selected as u64,
            report.selected,
            report.irrelevant,
            report.classified,
            report.not_signal,
            report.failed,
            report.predictions_written,
            report.signals_accepted
        );

        Ok(SweepOutcome::Completed(report))
    }

    async fn refresh_reference_price(&self) -> Option<Decimal> {
        let Some(feed) = &self.price_feed else {
            return self.reference_price();
        };

        match feed.current_price().await {
            Ok(price) => {
                debug!("[Processor] Reference price {}", price);
                *self.reference_price.lock() = Some(price);
                Some(price)
            }
            Err(e) => {
                let last = self.reference_price();
                warn!("[Processor] Price refresh failed, keeping {:?}: {}", last, e);
                last
            }
        }
    }

    async fn process_post(
        &self,
        post: &Post,
        reference_price: Option<Decimal>,
    ) -> Result<PostOutcome> {
        if !self.filter.is_relevant(post) {
            debug!("[Processor] Post {} filtered as irrelevant", post.id);
            self.posts.mark_processed(&post.id).await?;
            return Ok(PostOutcome::Irrelevant);
        }

        let request = ClassificationRequest::for_post(post, reference_price);
        let classification = self.classifier.classify(&request).await?;

        let outcome = match classification {
            Classification::Trend(trend) => {
                if !trend.relevant {
                    self.posts.mark_processed(&post.id).await?;
                    return Ok(PostOutcome::Irrelevant);
                }

                let now = Utc::now();
                let mut predictions = Vec::new();
                for day in &trend.days {
                    match &day.call {
                        DayCall::Call(t) => {
                            predictions.push(Prediction::for_post(post, day.date, *t, now)?)
                        }
                        DayCall::NoCall => {}
                        DayCall::Unrecognized(label) => {
                            return Err(IndicatorError::InvalidPrediction {
                                post_id: post.id.clone(),
                                target_date: day.date,
                                reason: format!("unknown trend value '{}'", label),
                            });
                        }
                    }
                }

                self.predictions.append_predictions(&predictions).await?;
                PostOutcome::Classified {
                    predictions: predictions.len(),
                    signal: false,
                }
            }
            Classification::Signal(SignalVerdict::NotASignal { reason }) => {
                debug!("[Processor] Post {} is not a signal: {}", post.id, reason);
                PostOutcome::NotASignal
            }
            Classification::Signal(SignalVerdict::Accepted(signal)) => {
                let trend = signal.direction.trend();
                let predictions = signal
                    .target_dates(&request.target_dates)
                    .into_iter()
                    .map(|date| Prediction::for_post(post, date, trend, signal.indicated_at))
                    .collect::<Result<Vec<_>>>()?;

                self.predictions.append_signal(&signal).await?;
                self.predictions.append_predictions(&predictions).await?;

                info!(
                    "[Processor] Signal accepted: post={}, direction={}, confidence={}",
                    post.id,
                    signal.direction.as_str(),
                    signal.confidence
                );
                self.notify_signal(post, signal);

                PostOutcome::Classified {
                    predictions: predictions.len(),
                    signal: true,
                }
            }
        };

        self.posts.mark_processed(&post.id).await?;
        Ok(outcome)
    }

    /// Fire-and-forget push; delivery never affects processing state
    fn notify_signal(&self, post: &Post, signal: TradingSignal) {
        if !self.notifier.is_enabled() {
            return;
        }
        let notifier = self.notifier.clone();
        let post = post.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.signal_accepted(&post, &signal).await {
                warn!("[Processor] Signal notification failed: {}", e);
            }
        });
    }

    /// Timer loop: one sweep per tick until `shutdown` flips to true.
    ///
    /// Each sweep runs on its own task so a slow sweep never delays the
    /// timer; the running guard turns overlapping ticks into skips.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        // A zero period would panic inside tokio's interval
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[Processor] Started, interval={}s", period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let processor = Arc::clone(&self);
                    tokio::spawn(async move {
                        processor.run_once().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[Processor] Stopped");
    }

    /// One guarded sweep with every error caught and logged
    pub async fn run_once(&self) {
        match self.sweep().await {
            Ok(SweepOutcome::Skipped) => {
                info!("[Processor] Previous sweep still running, trigger skipped");
            }
            Ok(SweepOutcome::Completed(_)) => {}
            Err(e) => {
                error!("[Processor] Sweep failed: {}", e);
                if let Err(notify_err) = self.notifier.error("sweep", &e.to_string()).await {
                    warn!("[Processor] Failed to send sweep alert: {}", notify_err);
                }
            }
        }
    }
}
