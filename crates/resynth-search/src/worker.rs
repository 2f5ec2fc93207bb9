//! Search Stage Worker main loop (§4.4).
//!
//! Claim, search, extract per-URL with a politeness delay, persist, advance,
//! publish, commit — in that order, with the offset committed last so a
//! crash before it simply causes harmless re-delivery (§4.4 ordering
//! rule).

use std::time::Duration;

use resynth_core::config::{BusConfig, SearchConfig};
use resynth_core::{BusConsumer, BusProducer, Ledger, NewSearchResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::SearchEngine;
use crate::extract::ContentExtractor;

#[derive(Debug, Deserialize)]
struct SearchTask {
    request_id: Uuid,
    topic: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeTask {
    request_id: Uuid,
    topic: String,
}

pub struct SearchWorker {
    ledger: Ledger,
    engine: Box<dyn SearchEngine>,
    extractor: Box<dyn ContentExtractor>,
    config: SearchConfig,
    analyze_topic: String,
}

impl SearchWorker {
    pub fn new(
        ledger: Ledger,
        engine: Box<dyn SearchEngine>,
        extractor: Box<dyn ContentExtractor>,
        config: SearchConfig,
        analyze_topic: String,
    ) -> Self {
        Self { ledger, engine, extractor, config, analyze_topic }
    }

    pub async fn run(&self, bus_config: &BusConfig) -> anyhow::Result<()> {
        let producer = BusProducer::connect(bus_config).await?;
        let mut consumer = BusConsumer::connect(bus_config, &bus_config.search_topic).await?;

        tracing::info!(topic = %bus_config.search_topic, "search worker listening");

        while let Some((task, message)) = consumer.next_message::<SearchTask>().await? {
            if let Err(e) = self.process(&task, &producer).await {
                tracing::error!(request_id = %task.request_id, error = %e, "search task failed");
            }
            consumer.commit(&message)?;
        }

        tracing::info!("search worker shutting down");
        Ok(())
    }

    async fn process(&self, task: &SearchTask, producer: &BusProducer) -> anyhow::Result<()> {
        let Some(handle) = self.ledger.claim_for_search(task.request_id).await? else {
            tracing::debug!(request_id = %task.request_id, "claim lost, dropping");
            return Ok(());
        };

        match self.gather_results(task.request_id, &task.topic).await {
            Ok(results) if !results.is_empty() => {
                self.ledger.advance_after_search(handle, results).await?;

                producer
                    .publish(
                        &self.analyze_topic,
                        &AnalyzeTask { request_id: task.request_id, topic: task.topic.clone() },
                    )
                    .await?;
            }
            Ok(_) => {
                self.ledger
                    .fail_request(handle, "No search results found")
                    .await?;
            }
            Err(e) => {
                self.ledger.fail_request(handle, &e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// §4.4 steps 3-4: search, then extract each candidate with a
    /// politeness delay between fetches. Per-URL fetch/extract failures
    /// degrade that result to empty content rather than failing the
    /// whole request.
    async fn gather_results(&self, request_id: Uuid, topic: &str) -> anyhow::Result<Vec<NewSearchResult>> {
        let web_results = self.engine.search(topic, self.config.max_results).await?;

        let mut extracted = Vec::with_capacity(web_results.len());
        for result in &web_results {
            let content = match self.extractor.extract(&result.url).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(url = %result.url, error = %e, "extraction failed, using empty content");
                    String::new()
                }
            };
            extracted.push((result.url.clone(), result.title.clone(), content));
            tokio::time::sleep(Duration::from_millis(self.config.politeness_delay_ms)).await;
        }

        let viable: Vec<_> = extracted
            .iter()
            .filter(|(_, _, content)| content.len() >= self.config.min_content_chars)
            .collect();

        // If every candidate falls below the content threshold, retain
        // the first few regardless so there is something to summarize
        // (§4.4 step 4).
        let chosen: Vec<&(String, String, String)> = if viable.is_empty() {
            extracted.iter().take(3).collect()
        } else {
            viable
        };

        Ok(chosen
            .into_iter()
            .map(|(url, title, content)| NewSearchResult {
                request_id,
                url: url.clone(),
                title: title.clone(),
                content: content.clone(),
            })
            .collect())
    }
}
