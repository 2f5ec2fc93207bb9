//! Analysis Stage Worker main loop (§4.5).
//!
//! Claim, load persisted results, fold, summarize, persist, advance,
//! commit. A `phase` field other than `analyze` (or absent) fails the
//! request with an explicit `UnsupportedPhase` error rather than being
//! guessed at.

use std::time::Instant;

use resynth_core::config::{AnalysisConfig, BusConfig};
use resynth_core::folding::{
    ensure_reduced_context_fits, fold_context, outer_prompt, reduce_map_outputs, FoldPlan, FormattedItem,
};
use resynth_core::{BusConsumer, BusProducer, Ledger, NewAnalysisResult};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::summarizer::Summarizer;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("unsupported phase \"{0}\" — only \"analyze\" is implemented")]
    UnsupportedPhase(String),
}

#[derive(Debug, Deserialize)]
struct AnalyzeTask {
    request_id: Uuid,
    topic: String,
    phase: Option<String>,
}

pub struct AnalysisWorker {
    ledger: Ledger,
    summarizer: Box<dyn Summarizer>,
    config: AnalysisConfig,
}

impl AnalysisWorker {
    pub fn new(ledger: Ledger, summarizer: Box<dyn Summarizer>, config: AnalysisConfig) -> Self {
        Self { ledger, summarizer, config }
    }

    pub async fn run(&self, bus_config: &BusConfig) -> anyhow::Result<()> {
        let mut consumer = BusConsumer::connect(bus_config, &bus_config.analyze_topic).await?;

        tracing::info!(topic = %bus_config.analyze_topic, "analysis worker listening");

        while let Some((task, message)) = consumer.next_message::<AnalyzeTask>().await? {
            if let Err(e) = self.process(&task).await {
                tracing::error!(request_id = %task.request_id, error = %e, "analyze task failed");
            }
            consumer.commit(&message)?;
        }

        tracing::info!("analysis worker shutting down");
        Ok(())
    }

    async fn process(&self, task: &AnalyzeTask) -> anyhow::Result<()> {
        let Some(handle) = self.ledger.claim_for_analysis(task.request_id).await? else {
            tracing::debug!(request_id = %task.request_id, "claim lost, dropping");
            return Ok(());
        };

        if let Err(e) = validate_phase(task.phase.as_deref()) {
            self.ledger.fail_request(handle, &e.to_string()).await?;
            return Ok(());
        }

        let results = self.ledger.list_search_results(task.request_id).await?;
        if results.is_empty() {
            self.ledger.fail_request(handle, "No search results found").await?;
            return Ok(());
        }

        let items: Vec<FormattedItem> = results
            .iter()
            .enumerate()
            .map(|(i, r)| FormattedItem::new(i, &r.title, &r.url, &r.content, self.config.content_char_cap))
            .collect();

        match self.summarize(&task.topic, &items).await {
            Ok((summary, elapsed_ms)) => {
                self.ledger
                    .complete_with_summary(
                        handle,
                        NewAnalysisResult {
                            request_id: task.request_id,
                            summary,
                            tokens_used: None,
                            inference_time_ms: Some(elapsed_ms as i32),
                        },
                    )
                    .await?;
            }
            Err(e) => {
                self.ledger.fail_request(handle, &e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// §4.6: folds the results into a bounded context, then runs the
    /// outer summarization prompt, measuring wall time for
    /// `inference_time_ms`. On the fold path the Reduce output is
    /// re-checked against the ceiling before it's dispatched — nothing
    /// guarantees concatenated Map summaries fit on their own.
    async fn summarize(&self, topic: &str, items: &[FormattedItem]) -> anyhow::Result<(String, u128)> {
        let started = Instant::now();

        let plan = fold_context(&self.config, topic, items)?;
        let context = match plan {
            FoldPlan::Direct { context } => context,
            FoldPlan::Fold { chunk_prompts } => {
                let chunk_summaries = self.summarizer.generate_batch(&chunk_prompts).await?;
                let reduced = reduce_map_outputs(&chunk_summaries);
                ensure_reduced_context_fits(&self.config, &reduced)?;
                reduced
            }
        };

        let final_prompt = outer_prompt(topic, &context);
        let summary = self.summarizer.generate(&final_prompt).await?;

        Ok((summary, started.elapsed().as_millis()))
    }
}

/// Only `analyze` (or an absent phase, which defaults to it) is
/// implemented. `generate_queries` is reserved for a future
/// query-planning stage (§6); this worker rejects it explicitly rather
/// than guessing, per §9.
fn validate_phase(phase: Option<&str>) -> Result<(), AnalysisError> {
    match phase {
        None | Some("analyze") => Ok(()),
        Some(other) => Err(AnalysisError::UnsupportedPhase(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_phase_defaults_to_analyze() {
        assert!(validate_phase(None).is_ok());
    }

    #[test]
    fn explicit_analyze_phase_is_accepted() {
        assert!(validate_phase(Some("analyze")).is_ok());
    }

    #[test]
    fn generate_queries_phase_is_rejected_not_silently_downgraded() {
        let err = validate_phase(Some("generate_queries")).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedPhase(phase) if phase == "generate_queries"));
    }
}
