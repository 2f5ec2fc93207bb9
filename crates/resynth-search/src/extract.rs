//! Content extraction collaborator (§6: external collaborator).
//!
//! Walks the parsed `body` with `scraper`, skipping any node whose
//! ancestry includes a `script`, `style`, or `noscript` element, and
//! collapses runs of whitespace in the remaining text nodes.

use scraper::{Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Fetches `url` and returns its visible plain-text body. Per-URL
    /// errors are the caller's concern to degrade to empty content
    /// (§4.4 failure policy); this trait surfaces them so the caller can
    /// log before discarding.
    async fn extract(&self, url: &str) -> Result<String, ExtractError>;
}

pub struct ReqwestExtractor {
    client: reqwest::Client,
}

impl ReqwestExtractor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; resynth-search/0.1)")
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("building the extractor HTTP client with static, valid settings cannot fail"),
        }
    }

    fn plain_text(html: &str) -> String {
        let document = Html::parse_document(html);

        // `scraper` has no node-removal API, so script/style/noscript
        // subtrees are skipped by ancestry check below instead.
        let body_selector = Selector::parse("body").unwrap();
        let skip_selector = Selector::parse("script, style, noscript").ok();

        let skip_nodes: std::collections::HashSet<_> = skip_selector
            .as_ref()
            .map(|sel| document.select(sel).map(|e| e.id()).collect())
            .unwrap_or_default();

        let mut text = String::new();
        for root in document.select(&body_selector).take(1) {
            for node in root.descendants() {
                if let Some(element_text) = node.value().as_text() {
                    let ancestor_skipped = node
                        .ancestors()
                        .any(|ancestor| skip_nodes.contains(&ancestor.id()));
                    if !ancestor_skipped {
                        text.push_str(element_text);
                        text.push(' ');
                    }
                }
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait::async_trait]
impl ContentExtractor for ReqwestExtractor {
    async fn extract(&self, url: &str) -> Result<String, ExtractError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Status(response.status()));
        }
        let html = response.text().await?;
        Ok(Self::plain_text(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_strips_scripts_and_collapses_whitespace() {
        let html = r#"
            <html><body>
                <script>var x = 1;</script>
                <p>Hello    world.</p>
                <style>.a { color: red }</style>
                <p>Second   paragraph.</p>
            </body></html>
        "#;
        let text = ReqwestExtractor::plain_text(html);
        assert!(text.contains("Hello world."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }
}
