//! Keyword search through the DuckDuckGo instant answer API

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{KeywordSearch, SearchHit};

const ENDPOINT: &str = "https://api.duckduckgo.com/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

/// Keyword search with no API key
///
/// Runs a blocking HTTP request; callers on the async runtime must move it
/// onto a blocking thread.
pub struct DuckDuckGoSearch {
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn fetch(&self, query: &str) -> Result<InstantAnswer, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("zee-daemon/", env!("CARGO_PKG_VERSION")))
            .build()?;
        client
            .get(ENDPOINT)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()?
            .error_for_status()?
            .json()
    }
}

impl KeywordSearch for DuckDuckGoSearch {
    fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        match self.fetch(query) {
            Ok(answer) => {
                let hits = collect_hits(answer, max_results);
                debug!(query, hits = hits.len(), "keyword search complete");
                hits
            }
            Err(e) => {
                warn!(query, error = %e, "keyword search failed");
                Vec::new()
            }
        }
    }
}

fn collect_hits(answer: InstantAnswer, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    if !answer.abstract_text.trim().is_empty() {
        hits.push(SearchHit {
            title: answer.heading.trim().to_string(),
            snippet: answer.abstract_text.trim().to_string(),
        });
    }

    let mut pending: Vec<RelatedTopic> = answer.related_topics.into_iter().rev().collect();
    while let Some(topic) = pending.pop() {
        if hits.len() >= max_results {
            break;
        }
        match topic {
            RelatedTopic::Entry { text } => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let (title, snippet) = text.split_once(" - ").unwrap_or((text, ""));
                hits.push(SearchHit {
                    title: title.trim().to_string(),
                    snippet: snippet.trim().to_string(),
                });
            }
            RelatedTopic::Group { topics } => pending.extend(topics.into_iter().rev()),
        }
    }

    hits.truncate(max_results);
    hits
}
