use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use meter_client::{Reading, ReadingStore};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Writes validated readings into the reading store in small batches, with
/// bounded retries and linear backoff on write failure.
pub struct StoreSink {
    store: Arc<dyn ReadingStore>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl StoreSink {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<Reading>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let readings: Vec<Reading> = batch.iter().map(|env| env.payload.clone()).collect();

        let mut attempt: u32 = 0;
        loop {
            match self.store.insert_batch(&readings).await {
                Ok(()) => {
                    metrics::counter!("balance_readings_stored_total")
                        .increment(batch.len() as u64);

                    // Approximate scrape-to-store latency from the earliest
                    // envelope in the batch.
                    if let Some(min_scraped) = batch.iter().map(|e| e.scraped_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_scraped) {
                            metrics::histogram!("scrape_to_store_latency_seconds")
                                .record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "store sink flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "store sink flush failed, giving up");
                    metrics::counter!("store_sink_errors_total").increment(1);
                    return Err(PipelineError::Store(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<Reading> for StoreSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Reading>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut buffer: Vec<Envelope<Reading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping rejected reading");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::transform::ReadingValidation;
    use async_trait::async_trait;
    use meter_client::MemoryReadingStore;
    use std::pin::Pin;
    use time::macros::datetime;

    // Fixed-batch source used to drive the sink without the network.
    struct VecSource {
        items: Vec<Result<Envelope<Reading>, PipelineError>>,
    }

    #[async_trait]
    impl crate::pipeline::Source<Reading> for VecSource {
        async fn stream(
            &self,
        ) -> Pin<Box<dyn futures::Stream<Item = Result<Envelope<Reading>, PipelineError>> + Send>>
        {
            let items: Vec<_> = self
                .items
                .iter()
                .map(|item| match item {
                    Ok(env) => Ok(env.clone()),
                    Err(e) => Err(PipelineError::Scrape(e.to_string())),
                })
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    fn envelope(balance: f64) -> Envelope<Reading> {
        Envelope::now(Reading {
            ts: datetime!(2024-03-05 08:00:00),
            meter_id: "M1".to_string(),
            balance,
        })
    }

    #[tokio::test]
    async fn pipeline_stores_valid_readings_and_drops_invalid_ones() {
        let store = Arc::new(MemoryReadingStore::new());
        let source = VecSource {
            items: vec![Ok(envelope(100.0)), Ok(envelope(-3.0)), Ok(envelope(95.0))],
        };
        let sink = StoreSink::new(store.clone(), 2, 0, Duration::from_millis(1));
        let pipeline: Pipeline<_, Reading, _> = Pipeline {
            source,
            transforms: vec![Arc::new(ReadingValidation)],
            sink,
        };

        pipeline.run().await.expect("pipeline must drain");

        let stored = store
            .query_range(
                Some("M1"),
                datetime!(2024-03-05 00:00:00),
                datetime!(2024-03-06 00:00:00),
            )
            .await
            .unwrap();
        // The -3.0 reading is rejected by validation; both others land.
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].balance, 100.0);
        assert_eq!(stored[1].balance, 95.0);
    }
}
