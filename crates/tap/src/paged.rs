//! Paged polling source
//!
//! Pulls rows in key order, `batch_size` at a time, resuming after the last
//! key seen. The position is pulled once from the checkpoint store
//! (best-effort) and pushed after every page.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contracts::{checkpoint_value, CheckpointStore, ContractError, RowSource};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_REST_TIME: Duration = Duration::from_secs(10);

/// Backend returning rows ordered by key
#[async_trait]
pub trait PageFetcher: Send {
    /// Up to `limit` rows whose key is strictly greater than `after`
    /// (every row when `after` is `None`), in ascending key order
    async fn fetch(&mut self, after: Option<&str>, limit: usize) -> Result<Vec<Value>, ContractError>;
}

/// [`RowSource`] polling a [`PageFetcher`]
pub struct PagedSource<F> {
    fetcher: F,
    key: String,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    retry: RetryPolicy,
    batch_size: usize,
    rest_time: Duration,
    idle_polls: Option<u32>,

    position: Option<String>,
    pulled: bool,
    batch: VecDeque<Value>,
    caught_up: bool,
    empty_polls: u32,
}

impl<F: PageFetcher> PagedSource<F> {
    pub fn new(fetcher: F, key: impl Into<String>) -> Self {
        Self {
            fetcher,
            key: key.into(),
            checkpoint: None,
            retry: RetryPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            rest_time: DEFAULT_REST_TIME,
            idle_polls: None,
            position: None,
            pulled: false,
            batch: VecDeque::new(),
            caught_up: false,
            empty_polls: 0,
        }
    }

    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pause before polling again once a short page came back
    pub fn with_rest_time(mut self, rest_time: Duration) -> Self {
        self.rest_time = rest_time;
        self
    }

    /// End the stream after `polls` consecutive empty pages
    pub fn with_idle_polls(mut self, polls: u32) -> Self {
        self.idle_polls = Some(polls);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Last key retrieved (or resumed from)
    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    async fn resume(&mut self) {
        if self.pulled {
            return;
        }
        self.pulled = true;
        let Some(store) = &self.checkpoint else {
            return;
        };
        match store.pull().await {
            Ok(position) => {
                info!(key = %self.key, position = %position, "Resuming from checkpoint");
                self.position = Some(position);
            }
            Err(e) => debug!(error = %e, "No checkpoint, starting from the beginning"),
        }
    }

    async fn fetch_page(&mut self) -> Result<(), ContractError> {
        let mut attempt = 0;
        let page = loop {
            attempt += 1;
            let fetched = self
                .fetcher
                .fetch(self.position.as_deref(), self.batch_size)
                .await;
            match fetched {
                Ok(page) => break page,
                Err(e) => match self.retry.on_failure(attempt, &e) {
                    Some(delay) => {
                        warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Page fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.store_position().await?;
                        return Err(self.retry.give_up(attempt, e));
                    }
                },
            }
        };

        if let Some(position) = page.last().and_then(|row| row.get(&self.key)) {
            self.position = Some(checkpoint_value(position));
        }
        debug!(rows = page.len(), position = ?self.position, "Fetched page");

        self.caught_up = page.len() < self.batch_size;
        self.empty_polls = if page.is_empty() { self.empty_polls + 1 } else { 0 };
        self.batch.extend(page);
        self.store_position().await
    }

    /// Push the current position, if any, without borrowing the fetcher
    async fn store_position(&mut self) -> Result<(), ContractError> {
        let (Some(store), Some(position)) = (self.checkpoint.clone(), self.position.clone()) else {
            return Ok(());
        };
        store.push(&position).await
    }
}

#[async_trait]
impl<F: PageFetcher> RowSource for PagedSource<F> {
    async fn emit(&mut self) -> Result<Option<Value>, ContractError> {
        self.resume().await;
        loop {
            if let Some(row) = self.batch.pop_front() {
                return Ok(Some(row));
            }
            if self.idle_polls.is_some_and(|limit| self.empty_polls >= limit) {
                return Ok(None);
            }
            if self.caught_up {
                tokio::time::sleep(self.rest_time).await;
            }
            self.fetch_page().await?;
        }
    }
}
