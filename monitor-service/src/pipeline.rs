//! Scrape pipeline plumbing: a polling source feeds balance readings
//! through pure validation into the store sink.

use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

/// A payload plus the instant it was scraped, for end-to-end latency
/// accounting at the sink.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub scraped_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            scraped_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("scrape error: {0}")]
    Scrape(String),
    #[error("validation error: {0}")]
    Validate(String),
    #[error("store error: {0}")]
    Store(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

/// Pure per-record check or rewrite. Validation here never does I/O, so the
/// hook is synchronous.
pub trait Transform<T>: Send + Sync {
    fn apply(&self, input: Envelope<T>) -> Result<Envelope<T>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T>>>,
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        for transform in self.transforms {
            stream = Box::pin(stream.map(move |item| item.and_then(|env| transform.apply(env))));
        }

        self.sink.run(stream).await
    }
}
