//! Ticket classification, the first pipeline stage.
//!
//! The [`Classifier`] trait is the seam between the pipeline and the
//! model backend; [`TriageClassifier`] is the production implementation
//! over the Anthropic Messages API.

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::{extract_json, LlmClient};
use crate::models::{Ticket, TriageVerdict};

const SYSTEM_PROMPT: &str = "You are a customer-support triage agent for a SaaS platform.

Classify the incoming support ticket and set a priority level.

Priority rules:
- urgent: production down, data loss, locked out with imminent deadline
- high:   major feature broken, billing error > $500, significant user impact
- medium: feature degraded but workaround exists, billing questions, general account issues
- low:    how-to questions, feature requests, minor cosmetic issues, vague or unclear requests

Category options: billing, technical, account, feature_request, spam, general

Use category=spam for: advertisements, phishing attempts, job offers, gibberish,
executable attachments, or anything not a real support request.

Use priority=low when the ticket is vague, asks a question only tangentially related to
the product, or has no immediate impact on the customer's ability to use the product.

Reply with ONLY a JSON object - no prose, no markdown fences:
{
  \"category\": \"<category>\",
  \"priority\": \"<low|medium|high|urgent>\",
  \"reasoning\": \"<one sentence explaining the classification>\"
}";

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, ticket: &Ticket) -> Result<TriageVerdict>;
}

/// Classifier backed by an Anthropic model.
pub struct TriageClassifier {
    llm: LlmClient,
    model: String,
}

impl TriageClassifier {
    pub fn new(llm: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Classifier for TriageClassifier {
    async fn classify(&self, ticket: &Ticket) -> Result<TriageVerdict> {
        let user_message = format!("Subject: {}\n\n{}", ticket.subject, ticket.body);

        let text = self
            .llm
            .chat_anthropic(&self.model, SYSTEM_PROMPT, &user_message)
            .await?;

        let payload = extract_json(&text)?;
        let verdict: TriageVerdict = serde_json::from_value(payload)?;
        Ok(verdict)
    }
}
