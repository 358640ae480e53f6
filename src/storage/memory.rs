//! In-process store backing both traits
//!
//! Used by tests and dry runs. `set_unavailable(true)` makes every call fail
//! with [`IndicatorError::StoreUnavailable`].

use super::{PostStore, PredictionStore};
use crate::classifier::TradingSignal;
use crate::error::{IndicatorError, Result};
use crate::types::{Post, Prediction};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<Post>>,
    predictions: Mutex<Vec<Prediction>>,
    signals: Mutex<Vec<TradingSignal>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let store = Self::new();
        store.posts.lock().extend(posts);
        store
    }

    pub fn insert_post(&self, post: Post) {
        let mut posts = self.posts.lock();
        if !posts.iter().any(|p| p.id == post.id) {
            posts.push(post);
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.posts.lock().iter().find(|p| p.id == post_id).cloned()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.lock().clone()
    }

    pub fn signals(&self) -> Vec<TradingSignal> {
        self.signals.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndicatorError::StoreUnavailable(
                "memory store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<Post>> {
        self.check()?;
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .iter()
            .filter(|p| !p.processed)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(limit);
        Ok(posts)
    }

    async fn mark_processed(&self, post_id: &str) -> Result<()> {
        self.check()?;
        if let Some(post) = self.posts.lock().iter_mut().find(|p| p.id == post_id) {
            post.processed = true;
        }
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn append_predictions(&self, predictions: &[Prediction]) -> Result<()> {
        self.check()?;
        let mut stored = self.predictions.lock();
        for prediction in predictions {
            let duplicate = stored.iter().any(|p| {
                p.post_id == prediction.post_id && p.target_date == prediction.target_date
            });
            if !duplicate {
                stored.push(prediction.clone());
            }
        }
        Ok(())
    }

    async fn predictions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Prediction>> {
        self.check()?;
        Ok(self
            .predictions
            .lock()
            .iter()
            .filter(|p| p.target_date >= from && p.target_date <= to)
            .cloned()
            .collect())
    }

    async fn append_signal(&self, signal: &TradingSignal) -> Result<()> {
        self.check()?;
        let mut signals = self.signals.lock();
        if !signals.iter().any(|s| s.post_id == signal.post_id) {
            signals.push(signal.clone());
        }
        Ok(())
    }
}
