//! Web search tool using DuckDuckGo

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::tools::args::{self, QueryArgs};
use crate::tools::{
    ActionKind, ArgsError, ParameterProperty, ParameterSchema, PermissionRequest, SecurityLevel,
    Tool, ToolContext, ToolResult,
};

const MAX_RESULTS: usize = 5;

static RESULT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result").expect("valid selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__a").expect("valid selector"));
static SNIPPET_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").expect("valid selector"));

/// Tool for searching the web
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn kind(&self) -> ActionKind {
        ActionKind::WebSearch
    }

    fn description(&self) -> &str {
        "Searches the web and returns the top results with titles, URLs and snippets."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Moderate
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required("query", ParameterProperty::string("The search query"))
    }

    fn validate(&self, args: &Value) -> Result<(), ArgsError> {
        args::parse::<QueryArgs>(self.kind(), args).map(|_| ())
    }

    async fn permission(&self, args: &Value, _ctx: &ToolContext) -> Option<PermissionRequest> {
        let args = args::parse::<QueryArgs>(self.kind(), args).ok()?;
        Some(PermissionRequest::new("web search", args.query, false))
    }

    #[instrument(skip(self, args, ctx), fields(query = tracing::field::Empty))]
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: QueryArgs = args::parse(self.kind(), args)?;
        let query = args.query.as_str();

        tracing::Span::current().record("query", query.chars().take(50).collect::<String>().as_str());

        let search_url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );

        debug!(timeout_secs = ctx.http_timeout_secs, "Sending search request to DuckDuckGo");
        let response = match self
            .client
            .get(&search_url)
            .timeout(Duration::from_secs(ctx.http_timeout_secs))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Search request failed");
                return Ok(ToolResult::error(format!("Web search failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Search returned error status");
            return Ok(ToolResult::error(format!(
                "Web search failed with status: {}",
                response.status()
            )));
        }

        let html = match response.text().await {
            Ok(h) => h,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read response: {}", e))),
        };

        let results = parse_duckduckgo_results(&html, MAX_RESULTS);
        if results.is_empty() {
            return Ok(ToolResult::success(format!("No results found for: {}", query)).with_matches(0));
        }

        let mut output = String::new();
        for (i, result) in results.iter().enumerate() {
            output.push_str(&format!(
                "{}. {}\n   {}\n   {}\n",
                i + 1,
                result.title,
                result.url,
                result.snippet
            ));
        }

        Ok(ToolResult::success(output.trim_end()).with_matches(results.len()))
    }
}

#[derive(Debug)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

/// DuckDuckGo wraps result links in a redirect; recover the target URL
fn unwrap_redirect(href: &str) -> String {
    href.split("uddg=")
        .nth(1)
        .and_then(|s| urlencoding::decode(s.split('&').next().unwrap_or(s)).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| href.to_string())
}

fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for result_el in document.select(&RESULT_SELECTOR) {
        if results.len() >= limit {
            break;
        }
        let anchor = result_el.select(&TITLE_SELECTOR).next();

        let title = anchor
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        let url = anchor
            .and_then(|el| el.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();

        let snippet = result_el
            .select(&SNIPPET_SELECTOR)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult { title, url, snippet });
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_results() {
        let html = "<html><body></body></html>";
        assert!(parse_duckduckgo_results(html, 5).is_empty());
    }

    #[test]
    fn test_parse_results_and_limit() {
        let item = |n: usize| {
            format!(
                r#"<div class="result"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2F{n}&rut=x">Title {n}</a><a class="result__snippet">Snippet {n}</a></div>"#
            )
        };
        let html = format!(
            "<html><body>{}</body></html>",
            (0..7).map(item).collect::<String>()
        );

        let results = parse_duckduckgo_results(&html, MAX_RESULTS);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].title, "Title 0");
        assert_eq!(results[0].url, "https://example.com/0");
        assert_eq!(results[4].snippet, "Snippet 4");
    }

    #[test]
    fn test_plain_href_kept() {
        assert_eq!(unwrap_redirect("https://rust-lang.org"), "https://rust-lang.org");
    }
}
