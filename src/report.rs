//! Console-formatted reporting for processed tickets.
//!
//! One block per ticket plus a batch summary, in the same plain aligned
//! style as the rest of the CLI output.

use crate::models::PipelineResult;

const RULE: &str =
    "============================================================";

/// Print the formatted report for one processed ticket.
pub fn print_result(result: &PipelineResult) {
    println!("\n{}", RULE);
    println!("  {} | {}", result.ticket.id, result.ticket.subject);
    println!("{}", RULE);

    println!(
        "  TRIAGE    {} | {} | {}",
        result.triage.priority.badge(),
        result.triage.category.as_str(),
        result.triage.reasoning
    );

    if result.skipped {
        println!("  RESULT    spam - no reply drafted\n");
        return;
    }

    if let Some(research) = &result.research {
        let stale = if research.stale_ids.is_empty() {
            String::new()
        } else {
            format!(" | stale: {:?}", research.stale_ids)
        };
        let retries = if result.retries > 0 {
            format!(" | {} retry(s)", result.retries)
        } else {
            String::new()
        };
        println!(
            "  RESEARCH  {} match(es) | terms: {:?}{}{}",
            research.matches.len(),
            research.search_terms_used,
            stale,
            retries
        );
    }

    if let Some(draft) = &result.draft {
        let stale_warn = if draft.stale_warning {
            " | STALE SOURCES - review before sending"
        } else {
            ""
        };
        println!("  DRAFT     sources={:?}{}", draft.sources_used, stale_warn);
        println!();
        for line in draft.response_text.split('\n') {
            println!("  {}", line);
        }
    }
    println!();
}

/// Print aggregate counts for a processed batch.
pub fn print_summary(results: &[PipelineResult]) {
    let total = results.len();
    let spam = results.iter().filter(|r| r.skipped).count();
    let retried = results.iter().filter(|r| r.retries > 0).count();
    let stale_warnings = results
        .iter()
        .filter(|r| r.draft.as_ref().is_some_and(|d| d.stale_warning))
        .count();

    println!("\n{}", RULE);
    println!("  SUMMARY: {} tickets processed", total);
    println!("{}", RULE);
    println!("  spam / skipped         : {}", spam);
    println!("  research retries used  : {}", retried);
    println!("  stale source warnings  : {}", stale_warnings);
    println!();
}
