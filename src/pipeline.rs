//! The ticket pipeline orchestrator.
//!
//! Sequences the three stages for one ticket: triage, retry-controlled
//! research, and drafting. The only branch is the spam short-circuit
//! after triage. Collaborator failures propagate unmodified, and all
//! state is local to one invocation, so a batch caller can report a
//! failed ticket and keep going.

use anyhow::Result;

use crate::drafter::Drafter;
use crate::models::{PipelineResult, Ticket};
use crate::research::EvidenceAssessor;
use crate::retry::research_with_retry;
use crate::triage::Classifier;

pub struct TicketPipeline<'a> {
    pub classifier: &'a dyn Classifier,
    pub assessor: &'a EvidenceAssessor<'a>,
    pub drafter: &'a dyn Drafter,
    pub verbose: bool,
}

impl<'a> TicketPipeline<'a> {
    /// Process one ticket end to end.
    pub async fn run(&self, ticket: &Ticket) -> Result<PipelineResult> {
        self.log("  [1/3] Triage...");

        let triage = self.classifier.classify(ticket).await?;
        self.log(&format!(
            "       category={} | priority={} | spam={}",
            triage.category.as_str(),
            triage.priority.as_str(),
            triage.is_spam()
        ));
        if !triage.reasoning.is_empty() {
            self.log(&format!("       reasoning: {}", triage.reasoning));
        }

        if triage.is_spam() {
            self.log("  spam detected - skipping research and drafting");
            return Ok(PipelineResult {
                ticket: ticket.clone(),
                triage,
                research: None,
                draft: None,
                skipped: true,
                retries: 0,
            });
        }

        self.log("  [2/3] Research...");
        let run = research_with_retry(self.assessor, ticket, self.verbose).await?;

        self.log("  [3/3] Drafting reply...");
        let draft = self.drafter.draft(ticket, &triage, &run.outcome).await?;
        self.log(&format!(
            "       sources_used={:?}{}",
            draft.sources_used,
            if draft.stale_warning {
                " | stale sources used"
            } else {
                ""
            }
        ));

        Ok(PipelineResult {
            ticket: ticket.clone(),
            triage,
            research: Some(run.outcome),
            draft: Some(draft),
            skipped: false,
            retries: run.retries,
        })
    }

    fn log(&self, msg: &str) {
        if self.verbose {
            println!("{}", msg);
        }
    }
}
