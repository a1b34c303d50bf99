//! Evidence assessment, the second pipeline stage.
//!
//! One attempt = query the knowledge base, have the judgment layer
//! summarize the hits, and decide sufficiency. The decision is driven
//! entirely by the index's cosine scores and staleness flags: the judge
//! contributes snippets and alternative search terms, and is structurally
//! unable to perturb scores, so the verdict is reproducible even though
//! snippet wording varies between runs.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::ResearchConfig;
use crate::index::ScoredHit;
use crate::kb::KnowledgeBase;
use crate::llm::{extract_json, LlmClient};
use crate::models::{Match, ResearchOutcome, Ticket};

/// Snippet length cap, in characters.
const MAX_SNIPPET_CHARS: usize = 480;

/// How many leading query terms to record in the outcome.
const SEARCH_TERMS_RECORDED: usize = 6;

const SYSTEM_PROMPT: &str = "You are a knowledge-base research agent for a SaaS customer support team.

You are given a support ticket and candidate matches retrieved from a vector knowledge base.
Your job is to summarise each match into a useful content_snippet for the support drafter.

IMPORTANT: Some past ticket resolutions are marked stale=true. Include them in your output
but preserve the stale flag so the drafter knows to avoid them.

Reply with ONLY a JSON object - no prose, no markdown fences:
{
  \"matches\": [
    {
      \"source_id\": \"<copy exactly from the match header>\",
      \"content_snippet\": \"<50-80 word excerpt most relevant to the ticket>\"
    }
  ],
  \"suggested_search_terms\": [\"<term1>\", \"<term2>\"]
}

Populate suggested_search_terms with 2-3 alternative search terms that might find
better knowledge-base matches for this ticket. Always include them - they drive the
retry query when this attempt comes up short.";

/// Sufficiency and retry constants, injected at construction.
#[derive(Debug, Clone)]
pub struct ResearchPolicy {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub min_strong_matches: usize,
    pub max_retries: u32,
}

impl Default for ResearchPolicy {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.5,
            min_strong_matches: 2,
            max_retries: 2,
        }
    }
}

impl From<&ResearchConfig> for ResearchPolicy {
    fn from(cfg: &ResearchConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            similarity_threshold: cfg.similarity_threshold,
            min_strong_matches: cfg.min_strong_matches,
            max_retries: cfg.max_retries,
        }
    }
}

impl ResearchPolicy {
    /// Count matches that are non-stale and score at or above the
    /// threshold.
    pub fn strong_count(&self, matches: &[Match]) -> usize {
        matches
            .iter()
            .filter(|m| !m.stale && m.similarity_score >= self.similarity_threshold)
            .count()
    }

    /// The sufficiency verdict: enough strong, non-stale evidence to
    /// draft from.
    pub fn sufficient(&self, matches: &[Match]) -> bool {
        self.strong_count(matches) >= self.min_strong_matches
    }
}

/// What the judgment layer contributes to an attempt: snippets keyed by
/// source id, and alternative query terms for a retry.
#[derive(Debug, Clone, Default)]
pub struct JudgeReport {
    pub snippets: Vec<SnippetEntry>,
    pub suggested_search_terms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SnippetEntry {
    pub source_id: String,
    pub content_snippet: String,
}

/// The judgment layer: summarizes hits for the drafter.
///
/// A malformed or missing payload must surface as an error, never as an
/// empty report.
#[async_trait]
pub trait SnippetJudge: Send + Sync {
    async fn summarize(&self, ticket: &Ticket, hits: &[ScoredHit]) -> Result<JudgeReport>;
}

#[derive(Debug, Deserialize)]
struct RawJudgeReport {
    #[serde(default)]
    matches: Vec<RawJudgeMatch>,
    #[serde(default)]
    suggested_search_terms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawJudgeMatch {
    source_id: String,
    #[serde(default)]
    content_snippet: String,
}

/// Judgment layer backed by an OpenAI model.
pub struct LlmJudge {
    llm: LlmClient,
    model: String,
}

impl LlmJudge {
    pub fn new(llm: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SnippetJudge for LlmJudge {
    async fn summarize(&self, ticket: &Ticket, hits: &[ScoredHit]) -> Result<JudgeReport> {
        let matches_text = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[Match {} | source_id={} | score={:.3} | type={} | category={} | stale={}]\n{}",
                    i + 1,
                    hit.record.source_id,
                    hit.score,
                    hit.record.meta.source_type.as_str(),
                    hit.record.meta.category.as_deref().unwrap_or("?"),
                    hit.record.meta.stale,
                    hit.record.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_message = format!(
            "SUPPORT TICKET\nSubject: {}\nBody: {}\n\nRETRIEVED KB MATCHES:\n{}",
            ticket.subject, ticket.body, matches_text
        );

        let text = self
            .llm
            .chat_openai(&self.model, SYSTEM_PROMPT, &user_message, 0.0)
            .await?;

        let raw: RawJudgeReport = serde_json::from_value(extract_json(&text)?)?;

        Ok(JudgeReport {
            snippets: raw
                .matches
                .into_iter()
                .map(|m| SnippetEntry {
                    source_id: m.source_id,
                    content_snippet: m.content_snippet,
                })
                .collect(),
            suggested_search_terms: raw.suggested_search_terms,
        })
    }
}

/// Runs one research attempt and renders the verdict.
pub struct EvidenceAssessor<'a> {
    kb: &'a KnowledgeBase,
    judge: &'a dyn SnippetJudge,
    policy: ResearchPolicy,
}

impl<'a> EvidenceAssessor<'a> {
    pub fn new(kb: &'a KnowledgeBase, judge: &'a dyn SnippetJudge, policy: ResearchPolicy) -> Self {
        Self { kb, judge, policy }
    }

    pub fn policy(&self) -> &ResearchPolicy {
        &self.policy
    }

    /// Run one attempt: retrieve, judge, and score.
    ///
    /// `search_query` overrides the raw ticket text on retries. Judge
    /// entries for ids the index did not return are discarded; hits the
    /// judge skipped fall back to an excerpt of the stored text. The
    /// judge is consulted even with zero hits, so suggested search terms
    /// are always available to the retry loop.
    pub async fn assess(
        &self,
        ticket: &Ticket,
        search_query: Option<&str>,
    ) -> Result<ResearchOutcome> {
        let base_query = ticket.query_text();
        let query = search_query.unwrap_or(&base_query);
        let search_terms_used: Vec<String> = query
            .split_whitespace()
            .take(SEARCH_TERMS_RECORDED)
            .map(String::from)
            .collect();

        let hits = self.kb.query(query, self.policy.top_k).await?;
        let report = self.judge.summarize(ticket, &hits).await?;

        let mut snippets: HashMap<String, String> = report
            .snippets
            .into_iter()
            .map(|s| (s.source_id, s.content_snippet))
            .collect();

        let matches: Vec<Match> = hits
            .iter()
            .map(|hit| {
                let snippet = snippets
                    .remove(&hit.record.source_id)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| hit.record.text.clone());
                Match {
                    source_id: hit.record.source_id.clone(),
                    content_snippet: excerpt(&snippet),
                    similarity_score: hit.score,
                    source_type: hit.record.meta.source_type,
                    stale: hit.record.meta.stale,
                }
            })
            .collect();

        let has_enough_info = self.policy.sufficient(&matches);
        let stale_ids = matches
            .iter()
            .filter(|m| m.stale)
            .map(|m| m.source_id.clone())
            .collect();

        Ok(ResearchOutcome {
            matches,
            has_enough_info,
            suggested_search_terms: report.suggested_search_terms,
            stale_ids,
            search_terms_used,
        })
    }
}

/// Truncate to the snippet cap on a char boundary.
fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_SNIPPET_CHARS).collect()
}
