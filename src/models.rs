//! Core data types used throughout the ticket pipeline.
//!
//! These types represent the tickets, triage verdicts, research evidence,
//! and drafts that flow through the three pipeline stages. Collaborator
//! payloads (triage, research, draft) deserialize with default-filled
//! optional fields so a sparse LLM response never panics downstream.

use serde::{Deserialize, Serialize};

/// An incoming support ticket, as read from the ticket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub body: String,
}

impl Ticket {
    /// The raw retrieval query for this ticket: subject and body joined.
    pub fn query_text(&self) -> String {
        format!("{} {}", self.subject, self.body).trim().to_string()
    }
}

/// Ticket category assigned by triage.
///
/// `Spam` is the terminal verdict: the pipeline stops after triage.
/// Unknown category strings from the classifier fall back to `General`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Billing,
    Technical,
    Account,
    FeatureRequest,
    Spam,
    #[default]
    General,
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "billing" => Category::Billing,
            "technical" => Category::Technical,
            "account" => Category::Account,
            "feature_request" => Category::FeatureRequest,
            "spam" => Category::Spam,
            _ => Category::General,
        })
    }
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Billing => "billing",
            Category::Technical => "technical",
            Category::Account => "account",
            Category::FeatureRequest => "feature_request",
            Category::Spam => "spam",
            Category::General => "general",
        }
    }
}

/// Ticket priority assigned by triage.
///
/// Unknown priority strings from the classifier fall back to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Medium,
        })
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Short uppercase badge for console reports.
    pub fn badge(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

/// Classification verdict for one ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageVerdict {
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub reasoning: String,
}

impl TriageVerdict {
    /// True when the ticket is not a genuine support request.
    pub fn is_spam(&self) -> bool {
        self.category == Category::Spam
    }
}

/// Where a knowledge-base record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Faq,
    PastTicket,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Faq => "faq",
            SourceType::PastTicket => "past_ticket",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faq" => Ok(SourceType::Faq),
            "past_ticket" => Ok(SourceType::PastTicket),
            other => Err(anyhow::anyhow!("Unknown source type: {}", other)),
        }
    }
}

/// Metadata attached to a knowledge-base record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    pub source_type: SourceType,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// True when the record's resolution is known to be outdated and must
    /// not be used to answer a ticket directly.
    #[serde(default)]
    pub stale: bool,
}

/// A unit of retrievable knowledge before embedding.
#[derive(Debug, Clone)]
pub struct KbItem {
    pub source_id: String,
    pub text: String,
    pub meta: RecordMeta,
}

/// One piece of scored evidence produced by the research stage.
///
/// `similarity_score`, `stale`, and `source_type` are copied from the
/// similarity index hit, never from the judgment layer, so sufficiency
/// decisions stay deterministic and auditable.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub source_id: String,
    pub content_snippet: String,
    pub similarity_score: f32,
    pub source_type: SourceType,
    pub stale: bool,
}

/// The research stage's verdict for one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// Evidence in the index's relevance order (non-increasing score).
    pub matches: Vec<Match>,
    /// True iff enough non-stale, high-scoring matches were found.
    pub has_enough_info: bool,
    /// Alternative query phrasings for a retry; always populated.
    pub suggested_search_terms: Vec<String>,
    /// Source ids of matches flagged stale.
    pub stale_ids: Vec<String>,
    /// The leading terms of the query that produced this outcome.
    pub search_terms_used: Vec<String>,
}

/// The drafted customer reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub sources_used: Vec<String>,
    #[serde(default)]
    pub stale_warning: bool,
}

/// Aggregate output of the pipeline for one ticket.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub ticket: Ticket,
    pub triage: TriageVerdict,
    /// Absent when triage short-circuited the pipeline.
    pub research: Option<ResearchOutcome>,
    /// Absent when triage short-circuited the pipeline.
    pub draft: Option<Draft>,
    pub skipped: bool,
    /// Research attempts executed beyond the first.
    pub retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parses_known_values() {
        let c: Category = serde_json::from_str("\"billing\"").unwrap();
        assert_eq!(c, Category::Billing);
        let c: Category = serde_json::from_str("\"feature_request\"").unwrap();
        assert_eq!(c, Category::FeatureRequest);
    }

    #[test]
    fn test_category_unknown_falls_back_to_general() {
        let c: Category = serde_json::from_str("\"sales_inquiry\"").unwrap();
        assert_eq!(c, Category::General);
    }

    #[test]
    fn test_verdict_defaults_fill_missing_fields() {
        let v: TriageVerdict = serde_json::from_str("{\"category\": \"spam\"}").unwrap();
        assert!(v.is_spam());
        assert_eq!(v.priority, Priority::Medium);
        assert!(v.reasoning.is_empty());
    }

    #[test]
    fn test_source_type_round_trip() {
        let s: SourceType = "past_ticket".parse().unwrap();
        assert_eq!(s, SourceType::PastTicket);
        assert_eq!(s.as_str(), "past_ticket");
        assert!("chat_log".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_ticket_query_text_joins_subject_and_body() {
        let t = Ticket {
            id: "T1".into(),
            subject: "Login broken".into(),
            body: "Cannot sign in".into(),
        };
        assert_eq!(t.query_text(), "Login broken Cannot sign in");
    }
}
