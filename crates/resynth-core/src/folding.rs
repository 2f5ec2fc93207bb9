//! Context Folding: the Map-Reduce algorithm of §4.6.
//!
//! Pure and synchronous — no network, no database — so it is unit
//! testable in isolation, unlike everything else in this crate. This
//! module only decides *what* to submit to the summarizer, not how.
//!
//! Token counting here is an explicit stand-in tokenizer (`tiktoken-rs`,
//! cl100k encoding) rather than the model's own tokenizer, since this
//! design has no embedded model process to ask. The algorithm's
//! correctness depends only on counting consistently within one run, not
//! on which tokenizer is plugged in (see SPEC_FULL.md OQ-4).

use tiktoken_rs::CoreBPE;

use crate::config::AnalysisConfig;
use crate::error::FoldingError;

const ITEM_SEPARATOR: &str = "\n---\n";
const TRUNCATION_MARKER: &str = "...(truncated)";

/// One search result, already labeled with its position for the prompt.
pub struct FormattedItem {
    pub text: String,
}

impl FormattedItem {
    /// `[result N] title / url / content`, content capped at
    /// `content_char_cap` characters to bound pathological pages.
    pub fn new(index: usize, title: &str, url: &str, content: &str, content_char_cap: usize) -> Self {
        let content = truncate_chars(content, content_char_cap);
        Self {
            text: format!("[result {}] {} / {} / {}", index + 1, title, url, content),
        }
    }
}

/// What the Analysis Stage Worker must submit to the summarizer.
pub enum FoldPlan {
    /// `T <= CTX_MAX`: the concatenation is fed straight into the outer
    /// prompt, identical to "no folding" (§8 idempotence law).
    Direct { context: String },
    /// `T > CTX_MAX`: one prompt per chunk, to be submitted to the
    /// summarizer's batch interface in a single call (§4.6 step 3b) —
    /// this module never manages its own concurrency for that dispatch.
    Fold { chunk_prompts: Vec<String> },
}

fn bpe() -> Result<CoreBPE, FoldingError> {
    tiktoken_rs::cl100k_base().map_err(|e| FoldingError::Tokenizer(e.to_string()))
}

fn count_tokens(bpe: &CoreBPE, text: &str) -> usize {
    bpe.encode_with_special_tokens(text).len()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let truncated: String = s.chars().take(keep).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

/// Proportionally shrinks an item's text to fit within `max_tokens`,
/// leaving a visible truncation marker (§4.6 step 3a, §8 boundary case).
fn truncate_to_token_budget(bpe: &CoreBPE, text: &str, max_tokens: usize) -> String {
    let current_tokens = count_tokens(bpe, text);
    if current_tokens <= max_tokens {
        return text.to_string();
    }
    let ratio = max_tokens as f64 / current_tokens as f64;
    let target_chars = ((text.chars().count() as f64) * ratio) as usize;
    truncate_chars(text, target_chars.max(TRUNCATION_MARKER.len() + 1))
}

/// Partitions items into chunks of at most `map_chunk_tokens`, preserving
/// input order. An item that alone exceeds the chunk budget is truncated
/// to fit and becomes its own chunk.
fn partition_into_chunks(bpe: &CoreBPE, items: &[FormattedItem], map_chunk_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for item in items {
        let item_tokens = count_tokens(bpe, &item.text);

        if item_tokens > map_chunk_tokens {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            let truncated = truncate_to_token_budget(bpe, &item.text, map_chunk_tokens);
            chunks.push(truncated);
            continue;
        }

        if current_tokens + item_tokens > map_chunk_tokens && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        if !current.is_empty() {
            current.push_str(ITEM_SEPARATOR);
        }
        current.push_str(&item.text);
        current_tokens += item_tokens;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn map_prompt(topic: &str, chunk_index: usize, chunk_count: usize, chunk_text: &str) -> String {
    format!(
        "Summarize the following search results (chunk {}/{}) as they relate to the topic \"{topic}\". \
         Be concise and preserve specific facts, names, and figures.\n\n{chunk_text}",
        chunk_index + 1,
        chunk_count,
    )
}

/// §4.6 step 3c: concatenates Map outputs with a labeled separator.
pub fn reduce_map_outputs(summaries: &[String]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Summary Part {}:\n{}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// §4.6 step 4: the outer summarization prompt over the (possibly
/// folded) context.
pub fn outer_prompt(topic: &str, context: &str) -> String {
    format!(
        "You are producing a research summary for the topic \"{topic}\". \
         Using only the information below, write a thorough, well-organized summary.\n\n{context}"
    )
}

/// Decides the direct-vs-fold path for an ordered list of search results
/// and, for the fold path, produces the Map prompts ready for batch
/// submission. Errors only if there are no items at all — §8's "zero
/// search results -> failed" case is handled by the caller before this
/// is ever invoked, since that's a Ledger-level decision, not a folding
/// one.
pub fn fold_context(config: &AnalysisConfig, topic: &str, items: &[FormattedItem]) -> Result<FoldPlan, FoldingError> {
    if items.is_empty() {
        return Err(FoldingError::Empty);
    }

    let bpe = bpe()?;
    let concatenation = items
        .iter()
        .map(|i| i.text.as_str())
        .collect::<Vec<_>>()
        .join(ITEM_SEPARATOR);

    let total_tokens = count_tokens(&bpe, &concatenation);
    let ctx_max = config.ctx_max();

    if total_tokens <= ctx_max {
        return Ok(FoldPlan::Direct { context: concatenation });
    }

    let chunks = partition_into_chunks(&bpe, items, config.map_chunk_tokens);
    let chunk_count = chunks.len();
    let chunk_prompts = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| map_prompt(topic, i, chunk_count, &chunk))
        .collect();

    Ok(FoldPlan::Fold { chunk_prompts })
}

/// §4.6's guarantee that no prompt is ever submitted that could exceed
/// the ceiling covers the Reduce output too: nothing upstream bounds how
/// large the concatenated Map summaries can get, so the caller must
/// re-tokenize the reduced context against `ctx_max` before wrapping it
/// in the outer prompt, and fail rather than dispatch if it doesn't fit.
pub fn ensure_reduced_context_fits(config: &AnalysisConfig, reduced: &str) -> Result<(), FoldingError> {
    let bpe = bpe()?;
    let tokens = count_tokens(&bpe, reduced);
    let ctx_max = config.ctx_max();
    if tokens > ctx_max {
        return Err(FoldingError::ReduceOverflow { tokens, ctx_max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_ctx_max(ctx_max_tokens: usize) -> AnalysisConfig {
        AnalysisConfig {
            endpoint: "http://localhost:11434".into(),
            model: "test-model".into(),
            max_model_len: ctx_max_tokens + 100,
            reserved_tokens: 100,
            map_chunk_tokens: 50,
            content_char_cap: 10_000,
            map_output_token_cap: 1024,
            temperature: 0.7,
        }
    }

    #[test]
    fn fits_within_ctx_max_takes_the_direct_path() {
        let config = config_with_ctx_max(10_000);
        let items = vec![FormattedItem::new(0, "Title", "http://example.com", "short body", 10_000)];
        let plan = fold_context(&config, "topic", &items).unwrap();
        assert!(matches!(plan, FoldPlan::Direct { .. }));
    }

    #[test]
    fn exceeding_ctx_max_takes_the_fold_path() {
        let config = config_with_ctx_max(5);
        let big_content = "word ".repeat(2000);
        let items = vec![FormattedItem::new(0, "Title", "http://example.com", &big_content, 10_000)];
        let plan = fold_context(&config, "topic", &items).unwrap();
        assert!(matches!(plan, FoldPlan::Fold { .. }));
    }

    #[test]
    fn oversized_single_item_is_truncated_with_a_visible_marker() {
        let bpe = bpe().unwrap();
        let huge = "token ".repeat(5000);
        let truncated = truncate_to_token_budget(&bpe, &huge, 10);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert!(count_tokens(&bpe, &truncated) <= 10 + 5);
    }

    #[test]
    fn empty_items_is_an_error_not_a_silent_empty_context() {
        let config = config_with_ctx_max(10_000);
        let err = fold_context(&config, "topic", &[]).unwrap_err();
        assert!(matches!(err, FoldingError::Empty));
    }

    #[test]
    fn reduce_labels_each_part_in_order() {
        let summaries = vec!["first".to_string(), "second".to_string()];
        let reduced = reduce_map_outputs(&summaries);
        assert!(reduced.contains("Summary Part 1:\nfirst"));
        assert!(reduced.contains("Summary Part 2:\nsecond"));
    }

    #[test]
    fn content_cap_truncates_formatted_item_body() {
        let item = FormattedItem::new(0, "T", "u", &"x".repeat(100), 20);
        assert!(item.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn reduced_context_within_ctx_max_is_accepted() {
        let config = config_with_ctx_max(10_000);
        assert!(ensure_reduced_context_fits(&config, "a short reduced context").is_ok());
    }

    #[test]
    fn reduced_context_exceeding_ctx_max_is_rejected_not_dispatched() {
        let config = config_with_ctx_max(5);
        let oversized = "word ".repeat(2000);
        let err = ensure_reduced_context_fits(&config, &oversized).unwrap_err();
        assert!(matches!(err, FoldingError::ReduceOverflow { ctx_max: 5, .. }));
    }
}
