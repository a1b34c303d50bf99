//! The research retry loop.
//!
//! Bounded control flow between the first assessment and a final
//! outcome: insufficiency triggers up to `max_retries` further attempts
//! with refined queries, sufficiency stops the loop immediately, and
//! exhaustion hands the last outcome onward so drafting always has
//! something to work with. Assessor errors abort the loop; insufficiency
//! is never an error.

use anyhow::Result;

use crate::models::{ResearchOutcome, Ticket};
use crate::research::EvidenceAssessor;

/// A finished research loop: the final outcome and the retries consumed.
#[derive(Debug)]
pub struct ResearchRun {
    pub outcome: ResearchOutcome,
    /// Attempts executed beyond the first (0 when the first sufficed).
    pub retries: u32,
}

/// Drive the assessor until sufficiency or retry exhaustion.
///
/// The first attempt runs with no query override (raw ticket text).
/// Each retry joins the previous outcome's suggested search terms into
/// a single query; when no terms were suggested the raw ticket text is
/// used again.
pub async fn research_with_retry(
    assessor: &EvidenceAssessor<'_>,
    ticket: &Ticket,
    verbose: bool,
) -> Result<ResearchRun> {
    let max_retries = assessor.policy().max_retries;

    let mut outcome = assessor.assess(ticket, None).await?;
    let mut retries = 0u32;
    log_attempt(verbose, retries, &outcome);

    while !outcome.has_enough_info && retries < max_retries {
        retries += 1;

        let terms = &outcome.suggested_search_terms;
        let refined = if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        };
        if verbose {
            println!(
                "       retry {}/{} | query: {:?}",
                retries,
                max_retries,
                refined.as_deref().unwrap_or("<ticket text>")
            );
        }

        outcome = assessor.assess(ticket, refined.as_deref()).await?;
        log_attempt(verbose, retries, &outcome);
    }

    if verbose && !outcome.has_enough_info {
        println!("       max retries reached - drafting with available context");
    }

    Ok(ResearchRun { outcome, retries })
}

fn log_attempt(verbose: bool, attempt: u32, outcome: &ResearchOutcome) {
    if !verbose {
        return;
    }
    let stale = if outcome.stale_ids.is_empty() {
        String::new()
    } else {
        format!(" | stale: {:?}", outcome.stale_ids)
    };
    println!(
        "       attempt {}: {} match(es) | enough={}{}",
        attempt + 1,
        outcome.matches.len(),
        outcome.has_enough_info,
        stale
    );
}
