//! Research answers with ordered provider fallback
//!
//! Sources are tried in configured priority order. Each attempt gets its own
//! sub-deadline carved out of the remaining budget, so the chain as a whole
//! never runs past the caller's deadline. When keyword search is configured
//! behind a model, it runs first and its top hits ground the model prompt.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::state::Message;

use super::{KeywordSearch, LanguageModel, ProviderHealth, ProviderId, SearchHit};

/// Returned when no provider produced an answer
pub const APOLOGY: &str = "Sorry, I couldn't find an answer to that right now.";

const SYSTEM_PROMPT_SUFFIX: &str =
    "Answer in two or three short sentences of plain text suitable for reading aloud.";

const SNIPPET_CHARS: usize = 200;

/// Search hits handed to a model as context
const GROUNDING_HITS: usize = 3;

/// One answer source in the chain
pub enum AnswerSource {
    Llm {
        id: ProviderId,
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
    },
    Search {
        search: Arc<dyn KeywordSearch>,
        max_results: usize,
        timeout: Duration,
    },
}

impl AnswerSource {
    pub fn id(&self) -> ProviderId {
        match self {
            AnswerSource::Llm { id, .. } => *id,
            AnswerSource::Search { .. } => ProviderId::KeywordSearch,
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            AnswerSource::Llm { timeout, .. } | AnswerSource::Search { timeout, .. } => *timeout,
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        query: &str,
        budget: Duration,
    ) -> Result<String, ProviderError> {
        match self {
            AnswerSource::Llm { model, .. } => model.complete(prompt, budget).await,
            AnswerSource::Search {
                search,
                max_results,
                ..
            } => {
                let hits = run_search(search, query, *max_results).await?;
                summarize_hits(&hits).ok_or(ProviderError::EmptyResponse)
            }
        }
    }
}

/// Keyword search is synchronous; keep it off the runtime threads
async fn run_search(
    search: &Arc<dyn KeywordSearch>,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchHit>, ProviderError> {
    let search = Arc::clone(search);
    let query = query.to_string();
    tokio::task::spawn_blocking(move || search.search(&query, max_results))
        .await
        .map_err(|e| ProviderError::Unreachable(e.to_string()))
}

/// A research question with its conversational context
#[derive(Debug, Clone, Copy)]
pub struct AnswerRequest<'a> {
    pub query: &'a str,
    pub deadline: Instant,
    /// Recent messages, oldest first
    pub history: &'a [Message],
}

impl<'a> AnswerRequest<'a> {
    pub fn new(query: &'a str, deadline: Instant) -> Self {
        Self {
            query,
            deadline,
            history: &[],
        }
    }

    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }
}

/// Answer produced for a research query
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResponse {
    pub text: String,
    pub source: ProviderId,
    /// A fallback provider (or the apology) produced this answer
    pub degraded: bool,
}

/// Ordered list of answer sources
pub struct AnswerChain {
    sources: Vec<AnswerSource>,
    attempt_share: f64,
    search_context: bool,
}

impl AnswerChain {
    pub fn new(sources: Vec<AnswerSource>, attempt_share: f64) -> Self {
        Self {
            sources,
            attempt_share: attempt_share.clamp(f64::EPSILON, 1.0),
            search_context: true,
        }
    }

    /// Whether keyword search runs ahead of the models to ground them
    pub fn with_search_context(mut self, enabled: bool) -> Self {
        self.search_context = enabled;
        self
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.sources.iter().map(AnswerSource::id).collect()
    }

    /// Answer `request.query`, returning no later than `request.deadline`
    pub async fn answer(
        &self,
        request: AnswerRequest<'_>,
        health: &mut ProviderHealth,
    ) -> AnswerResponse {
        let deadline = request.deadline;
        let grounding = self.ground(&request, health).await;
        let prompt = research_prompt(
            request.query,
            grounding.as_deref().unwrap_or_default(),
            request.history,
        );

        for (index, source) in self.sources.iter().enumerate() {
            let id = source.id();
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                warn!(%id, "answer deadline exhausted");
                break;
            }
            if !health.is_available(id, now) {
                debug!(%id, "skipping circuit-broken provider");
                continue;
            }

            // Search already ran for grounding; reuse what it returned
            if let (AnswerSource::Search { .. }, Some(hits)) = (source, &grounding) {
                match summarize_hits(hits) {
                    Some(text) => return answered(text, id, index),
                    None => {
                        debug!(%id, "search found nothing earlier");
                        continue;
                    }
                }
            }

            let last = !self.sources[index + 1..]
                .iter()
                .any(|s| health.is_available(s.id(), now));
            let share = if last {
                remaining
            } else {
                remaining.mul_f64(self.attempt_share)
            };
            let budget = share.min(source.timeout());

            debug!(%id, budget_ms = budget.as_millis() as u64, "asking provider");

            let result = tokio::time::timeout(budget, source.attempt(&prompt, request.query, budget))
                .await
                .unwrap_or(Err(ProviderError::Timeout))
                .and_then(|text| {
                    let text = text.trim();
                    if text.is_empty() {
                        Err(ProviderError::EmptyResponse)
                    } else {
                        Ok(text.to_string())
                    }
                });

            match result {
                Ok(text) => {
                    health.record_success(id);
                    return answered(text, id, index);
                }
                Err(ProviderError::RateLimited) => {
                    warn!(%id, "provider rate limited");
                    health.trip(id, Instant::now());
                }
                Err(e) => {
                    warn!(%id, error = %e, "provider failed");
                    health.record_failure(id, Instant::now());
                }
            }
        }

        warn!(query = request.query, "all answer providers failed");
        AnswerResponse {
            text: APOLOGY.to_string(),
            source: ProviderId::Canned,
            degraded: true,
        }
    }

    /// Run keyword search ahead of the models
    ///
    /// `None` means search did not complete and may be tried again as a
    /// source; `Some` holds whatever it returned, possibly nothing.
    async fn ground(
        &self,
        request: &AnswerRequest<'_>,
        health: &mut ProviderHealth,
    ) -> Option<Vec<SearchHit>> {
        if !self.search_context {
            return None;
        }
        let position = self
            .sources
            .iter()
            .position(|s| matches!(s, AnswerSource::Search { .. }))?;
        let AnswerSource::Search {
            search,
            max_results,
            timeout,
        } = &self.sources[position]
        else {
            return None;
        };
        // Nothing to ground when search is the first thing consulted
        if !self.sources[..position]
            .iter()
            .any(|s| matches!(s, AnswerSource::Llm { .. }))
        {
            return None;
        }

        let id = ProviderId::KeywordSearch;
        let now = Instant::now();
        if !health.is_available(id, now) {
            return None;
        }
        let budget = request
            .deadline
            .saturating_duration_since(now)
            .mul_f64(self.attempt_share)
            .min(*timeout);
        if budget.is_zero() {
            return None;
        }

        debug!(budget_ms = budget.as_millis() as u64, "grounding search");
        match tokio::time::timeout(budget, run_search(search, request.query, *max_results)).await {
            Ok(Ok(hits)) if hits.is_empty() => {
                health.record_failure(id, Instant::now());
                Some(hits)
            }
            Ok(Ok(hits)) => {
                health.record_success(id);
                debug!(hits = hits.len(), "grounding hits ready");
                Some(hits)
            }
            Ok(Err(e)) => {
                warn!(%id, error = %e, "grounding search failed");
                health.record_failure(id, Instant::now());
                None
            }
            Err(_) => {
                warn!(%id, "grounding search timed out");
                health.record_failure(id, Instant::now());
                None
            }
        }
    }
}

fn answered(text: String, source: ProviderId, index: usize) -> AnswerResponse {
    let degraded = index > 0;
    info!(%source, degraded, "research answer ready");
    AnswerResponse {
        text,
        source,
        degraded,
    }
}

fn research_prompt(query: &str, hits: &[SearchHit], history: &[Message]) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for message in history {
            prompt.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        prompt.push('\n');
    }

    let context: Vec<&SearchHit> = hits
        .iter()
        .filter(|h| !h.title.trim().is_empty() || !h.snippet.trim().is_empty())
        .take(GROUNDING_HITS)
        .collect();
    if !context.is_empty() {
        prompt.push_str("Based on the following search results:\n\n");
        for (n, hit) in context.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. {}\n{}\n\n",
                n + 1,
                hit.title.trim(),
                truncate_chars(hit.snippet.trim(), SNIPPET_CHARS)
            ));
        }
    }

    prompt.push_str(&format!(
        "Explain {query} in simple terms. {SYSTEM_PROMPT_SUFFIX}"
    ));
    prompt
}

/// Deterministic spoken summary of keyword search hits
pub fn summarize_hits(hits: &[SearchHit]) -> Option<String> {
    let mut useful = hits
        .iter()
        .filter(|h| !h.title.trim().is_empty() || !h.snippet.trim().is_empty());
    let first = useful.next()?;

    let mut summary = String::from("Here's what I found:");
    let title = first.title.trim().trim_end_matches('.');
    if !title.is_empty() {
        summary.push(' ');
        summary.push_str(title);
        summary.push('.');
    }
    let snippet = truncate_chars(first.snippet.trim(), SNIPPET_CHARS);
    if !snippet.is_empty() {
        summary.push(' ');
        summary.push_str(&snippet);
    }

    let related: Vec<&str> = useful
        .map(|h| h.title.trim())
        .filter(|t| !t.is_empty())
        .take(2)
        .collect();
    if !related.is_empty() {
        summary.push_str(" Related: ");
        summary.push_str(&related.join("; "));
        summary.push('.');
    }

    Some(summary)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::testing::{FixedSearch, ScriptedModel};

    fn health(threshold: u32) -> ProviderHealth {
        ProviderHealth::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown_ms: 60_000,
        })
    }

    fn llm(id: ProviderId, model: Arc<ScriptedModel>, timeout_ms: u64) -> AnswerSource {
        AnswerSource::Llm {
            id,
            model,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn search(hits: Vec<SearchHit>) -> (AnswerSource, Arc<FixedSearch>) {
        let search = FixedSearch::new(hits);
        (
            AnswerSource::Search {
                search: search.clone(),
                max_results: 5,
                timeout: Duration::from_secs(1),
            },
            search,
        )
    }

    fn hit(title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_answer_not_degraded() {
        let remote = ScriptedModel::new(vec![Ok("Qubits hold superpositions.")]);
        let local = ScriptedModel::new(vec![Ok("unused")]);
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, remote.clone(), 1_000),
                llm(ProviderId::LocalLlm, local.clone(), 1_000),
            ],
            0.6,
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        let response = chain
            .answer(AnswerRequest::new("quantum computing", deadline), &mut health(3))
            .await;
        assert_eq!(response.text, "Qubits hold superpositions.");
        assert_eq!(response.source, ProviderId::RemoteLlm);
        assert!(!response.degraded);
        assert_eq!(local.calls(), 0);
        assert!(remote.last_prompt().unwrap().contains("quantum computing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_falls_back_to_local() {
        let remote = ScriptedModel::hanging();
        let local = ScriptedModel::new(vec![Ok("A local explanation.")]);
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, remote.clone(), 2_000),
                llm(ProviderId::LocalLlm, local.clone(), 2_000),
            ],
            0.6,
        );
        let mut h = health(3);

        let started = Instant::now();
        let response = chain
            .answer(
                AnswerRequest::new("quantum computing", started + Duration::from_secs(10)),
                &mut h,
            )
            .await;

        assert_eq!(response.text, "A local explanation.");
        assert_eq!(response.source, ProviderId::LocalLlm);
        assert!(response.degraded);
        // Remote attempt capped by its own timeout
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(h.consecutive_failures(ProviderId::RemoteLlm), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_m_failures_then_success() {
        for m in 0..3usize {
            let mut sources = Vec::new();
            for _ in 0..m {
                sources.push(llm(
                    ProviderId::RemoteLlm,
                    ScriptedModel::new(vec![Err(ProviderError::Unreachable("down".into()))]),
                    1_000,
                ));
            }
            let (search_source, _) = search(vec![hit("Quantum computing", "Uses qubits.")]);
            sources.push(search_source);

            let chain = AnswerChain::new(sources, 0.5);
            let deadline = Instant::now() + Duration::from_secs(10);
            let response = chain
                .answer(AnswerRequest::new("quantum", deadline), &mut health(10))
                .await;

            assert_eq!(response.source, ProviderId::KeywordSearch);
            assert_eq!(response.degraded, m > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_is_a_failure() {
        let remote = ScriptedModel::new(vec![Ok("   ")]);
        let local = ScriptedModel::new(vec![Ok("Real answer")]);
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, remote, 1_000),
                llm(ProviderId::LocalLlm, local, 1_000),
            ],
            0.6,
        );
        let mut h = health(3);
        let response = chain
            .answer(
                AnswerRequest::new("rust", Instant::now() + Duration::from_secs(5)),
                &mut h,
            )
            .await;
        assert_eq!(response.source, ProviderId::LocalLlm);
        assert_eq!(h.consecutive_failures(ProviderId::RemoteLlm), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failing_respects_deadline() {
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, ScriptedModel::hanging(), 30_000),
                llm(ProviderId::LocalLlm, ScriptedModel::hanging(), 30_000),
            ],
            0.6,
        );

        let started = Instant::now();
        let deadline = started + Duration::from_secs(4);
        let response = chain
            .answer(AnswerRequest::new("anything", deadline), &mut health(3))
            .await;

        assert_eq!(response.text, APOLOGY);
        assert_eq!(response.source, ProviderId::Canned);
        assert!(response.degraded);
        assert!(Instant::now() <= deadline + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_skips_without_calling() {
        let remote = ScriptedModel::new(vec![Err(ProviderError::Timeout)]);
        let local = ScriptedModel::new(vec![Ok("fallback")]);
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, remote.clone(), 1_000),
                llm(ProviderId::LocalLlm, local.clone(), 1_000),
            ],
            0.6,
        );
        let mut h = health(2);

        for _ in 0..5 {
            let deadline = Instant::now() + Duration::from_secs(5);
            let response = chain.answer(AnswerRequest::new("q", deadline), &mut h).await;
            assert!(response.degraded);
        }
        assert_eq!(remote.calls(), 2);
        assert_eq!(local.calls(), 5);

        // Cooldown over: one trial call goes through again
        tokio::time::advance(Duration::from_secs(61)).await;
        let deadline = Instant::now() + Duration::from_secs(5);
        chain.answer(AnswerRequest::new("q", deadline), &mut h).await;
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_trips_immediately() {
        let remote = ScriptedModel::new(vec![Err(ProviderError::RateLimited)]);
        let local = ScriptedModel::new(vec![Ok("fallback")]);
        let chain = AnswerChain::new(
            vec![
                llm(ProviderId::RemoteLlm, remote.clone(), 1_000),
                llm(ProviderId::LocalLlm, local, 1_000),
            ],
            0.6,
        );
        let mut h = health(3);

        chain
            .answer(
                AnswerRequest::new("q", Instant::now() + Duration::from_secs(5)),
                &mut h,
            )
            .await;
        chain
            .answer(
                AnswerRequest::new("q", Instant::now() + Duration::from_secs(5)),
                &mut h,
            )
            .await;
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_with_no_hits_gives_apology() {
        let (source, search) = search(Vec::new());
        let chain = AnswerChain::new(vec![source], 0.6);
        let response = chain
            .answer(
                AnswerRequest::new("obscure", Instant::now() + Duration::from_secs(2)),
                &mut health(3),
            )
            .await;
        assert_eq!(response.text, APOLOGY);
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_hits_ground_the_prompt() {
        let remote = ScriptedModel::new(vec![Ok("Black holes trap light.")]);
        let (search_source, search) = search(vec![
            hit("Black hole", "A region where gravity traps light."),
            hit("Event horizon", "The boundary of a black hole."),
            hit("Hawking radiation", "Thermal radiation from black holes."),
            hit("Sagittarius A*", "The black hole at the galactic centre."),
        ]);
        let chain = AnswerChain::new(
            vec![llm(ProviderId::RemoteLlm, remote.clone(), 1_000), search_source],
            0.6,
        );
        let mut h = health(3);

        let deadline = Instant::now() + Duration::from_secs(5);
        let response = chain
            .answer(AnswerRequest::new("black holes", deadline), &mut h)
            .await;

        assert_eq!(response.source, ProviderId::RemoteLlm);
        assert!(!response.degraded);
        assert_eq!(search.calls(), 1);
        let prompt = remote.last_prompt().unwrap();
        assert!(prompt.contains("Based on the following search results"));
        assert!(prompt.contains("1. Black hole"));
        assert!(prompt.contains("2. Event horizon"));
        assert!(prompt.contains("3. Hawking radiation"));
        assert!(!prompt.contains("Sagittarius"));
        assert!(prompt.ends_with(&research_prompt("black holes", &[], &[])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_fallback_reuses_grounding_hits() {
        let remote = ScriptedModel::new(vec![Err(ProviderError::Unreachable("down".into()))]);
        let hits = vec![hit("Black hole", "Gravity traps light.")];
        let (search_source, search) = search(hits.clone());
        let chain = AnswerChain::new(
            vec![llm(ProviderId::RemoteLlm, remote.clone(), 1_000), search_source],
            0.6,
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        let response = chain
            .answer(AnswerRequest::new("black holes", deadline), &mut health(3))
            .await;

        assert_eq!(response.source, ProviderId::KeywordSearch);
        assert_eq!(response.text, summarize_hits(&hits).unwrap());
        assert!(response.degraded);
        assert_eq!(search.calls(), 1);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_grounding_still_asks_models() {
        let remote = ScriptedModel::new(vec![Ok("An answer anyway.")]);
        let (search_source, search) = search(Vec::new());
        let chain = AnswerChain::new(
            vec![llm(ProviderId::RemoteLlm, remote.clone(), 1_000), search_source],
            0.6,
        );
        let mut h = health(3);

        let deadline = Instant::now() + Duration::from_secs(5);
        let response = chain
            .answer(AnswerRequest::new("obscure", deadline), &mut h)
            .await;

        assert_eq!(response.text, "An answer anyway.");
        assert!(!remote.last_prompt().unwrap().contains("search results"));
        assert_eq!(h.consecutive_failures(ProviderId::KeywordSearch), 1);
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_context_can_be_disabled() {
        let remote = ScriptedModel::new(vec![Ok("Ungrounded answer.")]);
        let (search_source, search) = search(vec![hit("Black hole", "Gravity traps light.")]);
        let chain = AnswerChain::new(
            vec![llm(ProviderId::RemoteLlm, remote.clone(), 1_000), search_source],
            0.6,
        )
        .with_search_context(false);

        let deadline = Instant::now() + Duration::from_secs(5);
        chain
            .answer(AnswerRequest::new("black holes", deadline), &mut health(3))
            .await;

        assert_eq!(search.calls(), 0);
        assert!(!remote.last_prompt().unwrap().contains("Black hole"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_included_in_prompt() {
        use crate::state::Conversation;

        let remote = ScriptedModel::new(vec![Ok("It has 95 known moons.")]);
        let chain = AnswerChain::new(vec![llm(ProviderId::RemoteLlm, remote.clone(), 1_000)], 0.6);
        let mut conversation = Conversation::new(10);
        conversation.record("jupiter", "Jupiter is a gas giant.");
        let history = conversation.recent(5);

        let deadline = Instant::now() + Duration::from_secs(5);
        let request = AnswerRequest::new("its moons", deadline).with_history(&history);
        chain.answer(request, &mut health(3)).await;

        let prompt = remote.last_prompt().unwrap();
        assert!(prompt.starts_with(
            "Recent conversation:\nUser: jupiter\nAssistant: Jupiter is a gas giant.\n"
        ));
        assert!(prompt.contains("Explain its moons"));
    }

    #[test]
    fn test_summarize_hits() {
        let hits = vec![
            hit("", ""),
            hit("Quantum computing.", "Computation using qubits."),
            hit("Qubit", "unit"),
            hit("Shor's algorithm", "factoring"),
            hit("Grover's algorithm", "search"),
        ];
        assert_eq!(
            summarize_hits(&hits).unwrap(),
            "Here's what I found: Quantum computing. Computation using qubits. \
             Related: Qubit; Shor's algorithm."
        );
        assert!(summarize_hits(&[]).is_none());
    }

    #[test]
    fn test_snippet_truncated_on_char_boundary() {
        let long = "é".repeat(300);
        let summary = summarize_hits(&[hit("Accents", &long)]).unwrap();
        assert!(summary.ends_with("..."));
        assert_eq!(summary.matches('é').count(), 200);
    }
}
