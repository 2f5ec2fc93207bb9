//! Search engine collaborator (§6: external collaborator, contract only).
//!
//! DuckDuckGo's HTML search endpoint (`html.duckduckgo.com`), parsed
//! with a `scraper` selector over the result anchors and its
//! `uddg`-encoded redirect links unwrapped back to the real URL. Plain
//! free-text topic queries, no domain restriction.

use scraper::{Html, Selector};
use thiserror::Error;

const DDG_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search engine returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct WebResult {
    pub url: String,
    pub title: String,
}

#[async_trait::async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, topic: &str, max_results: usize) -> Result<Vec<WebResult>, SearchError>;
}

pub struct DuckDuckGoSearchEngine {
    client: reqwest::Client,
}

impl DuckDuckGoSearchEngine {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; resynth-search/0.1)")
                .build()
                .expect("building the search HTTP client with static, valid settings cannot fail"),
        }
    }

    fn parse_results(html: &str) -> Vec<WebResult> {
        let document = Html::parse_document(html);
        let result_selector = match Selector::parse("a.result__a") {
            Ok(selector) => selector,
            Err(_) => return Vec::new(),
        };

        let mut results = Vec::new();
        for element in document.select(&result_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = extract_url(href) else {
                continue;
            };
            let title = element.text().collect::<String>().trim().to_string();
            results.push(WebResult { url, title });
        }
        results
    }
}

impl Default for DuckDuckGoSearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SearchEngine for DuckDuckGoSearchEngine {
    async fn search(&self, topic: &str, max_results: usize) -> Result<Vec<WebResult>, SearchError> {
        let response = self
            .client
            .post(DDG_SEARCH_URL)
            .form(&[("q", topic), ("kl", "us-en")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status()));
        }

        let html = response.text().await?;
        let mut results = Self::parse_results(&html);
        results.truncate(max_results);
        Ok(results)
    }
}

/// Unwraps DuckDuckGo's `//duckduckgo.com/l/?uddg=<encoded>` redirect
/// format, or passes through a direct/protocol-relative URL unchanged.
fn extract_url(href: &str) -> Option<String> {
    if href.starts_with("//duckduckgo.com/l/") {
        let uddg_start = href.find("uddg=")?;
        let encoded = &href[uddg_start + 5..];
        let end = encoded.find('&').unwrap_or(encoded.len());
        urlencoding::decode(&encoded[..end]).ok().map(|s| s.into_owned())
    } else if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if href.starts_with("//") {
        Some(format!("https:{href}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_direct_url() {
        assert_eq!(extract_url("https://example.com/doc"), Some("https://example.com/doc".to_string()));
    }

    #[test]
    fn extract_protocol_relative_url() {
        assert_eq!(extract_url("//example.com/doc"), Some("https://example.com/doc".to_string()));
    }

    #[test]
    fn extract_redirect_url() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        assert_eq!(extract_url(href), Some("https://example.com/page".to_string()));
    }

    #[test]
    fn extract_unrecognized_href_is_none() {
        assert_eq!(extract_url("/relative/path"), None);
    }

    #[test]
    fn parse_results_extracts_anchor_text_as_title() {
        let html = r#"<html><body><a class="result__a" href="https://example.com/a">Example Title</a></body></html>"#;
        let results = DuckDuckGoSearchEngine::parse_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
        assert_eq!(results[0].title, "Example Title");
    }
}
