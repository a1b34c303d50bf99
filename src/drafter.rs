//! Reply drafting, the third pipeline stage.
//!
//! [`ReplyDrafter`] writes the customer-facing reply from the research
//! evidence, surfacing stale flags in the context so outdated
//! resolutions are acknowledged rather than repeated.

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::{extract_json, LlmClient};
use crate::models::{Draft, ResearchOutcome, Ticket, TriageVerdict};

const SYSTEM_PROMPT: &str = "You are a friendly, professional customer-support agent for a SaaS platform.

Write a helpful reply to the support ticket using ONLY the provided knowledge-base context.
Do not invent facts not present in the context.

STALE CONTEXT WARNING: If any context item is marked stale=true, do NOT use it to answer the
ticket. Stale resolutions describe old processes that no longer exist. Instead, acknowledge you
need to look into it and ask the customer to confirm details, or escalate.

Tone guidelines:
- Empathetic and concise
- Step-by-step instructions where applicable
- For high/urgent priority tickets: acknowledge urgency in the opening line
- If context is insufficient: say so honestly and offer next steps (escalate, ask clarifying Q)

Reply with ONLY a JSON object - no prose, no markdown fences:
{
  \"response_text\": \"<full reply - use \\\\n for line breaks>\",
  \"sources_used\": [\"<source_id of each KB item that informed the reply>\"],
  \"stale_warning\": <true|false>
}";

#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(
        &self,
        ticket: &Ticket,
        triage: &TriageVerdict,
        research: &ResearchOutcome,
    ) -> Result<Draft>;
}

/// Drafter backed by an OpenAI model.
pub struct ReplyDrafter {
    llm: LlmClient,
    model: String,
}

impl ReplyDrafter {
    pub fn new(llm: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Drafter for ReplyDrafter {
    async fn draft(
        &self,
        ticket: &Ticket,
        triage: &TriageVerdict,
        research: &ResearchOutcome,
    ) -> Result<Draft> {
        let context_text = if research.matches.is_empty() {
            "No relevant context found in the knowledge base.".to_string()
        } else {
            research
                .matches
                .iter()
                .map(|m| {
                    format!(
                        "[{} | source_id={} | relevance_score={:.3} | stale={}]\n{}",
                        m.source_type.as_str().to_uppercase(),
                        m.source_id,
                        m.similarity_score,
                        m.stale,
                        m.content_snippet
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let user_message = format!(
            "TICKET METADATA\nCategory: {}\nPriority: {}\n\nTICKET\nSubject: {}\nBody: {}\n\nKNOWLEDGE BASE CONTEXT\n{}",
            triage.category.as_str(),
            triage.priority.as_str(),
            ticket.subject,
            ticket.body,
            context_text
        );

        let text = self
            .llm
            .chat_openai(&self.model, SYSTEM_PROMPT, &user_message, 0.3)
            .await?;

        let payload = extract_json(&text)?;
        let draft: Draft = serde_json::from_value(payload)?;
        Ok(draft)
    }
}
