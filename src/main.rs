//! # Ticket Triage CLI (`triage`)
//!
//! The `triage` binary runs the support-ticket pipeline: build the
//! knowledge base, then process tickets through triage, research, and
//! drafting.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage build` | Embed FAQs and past tickets into the SQLite knowledge base |
//! | `triage build --force` | Wipe and rebuild the knowledge base |
//! | `triage run` | Process every ticket in the configured feed |
//! | `triage run --id TEST007` | Process a single ticket by id |
//! | `triage run --limit 3` | Process the first N tickets |
//! | `triage run --rebuild` | Force a knowledge-base rebuild before running |
//!
//! Requires `OPENAI_API_KEY` (embeddings, research, drafting) and
//! `ANTHROPIC_API_KEY` (triage) in the environment.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ticket_triage::config;
use ticket_triage::drafter::ReplyDrafter;
use ticket_triage::ingest;
use ticket_triage::llm::LlmClient;
use ticket_triage::models::Ticket;
use ticket_triage::pipeline::TicketPipeline;
use ticket_triage::report;
use ticket_triage::research::{EvidenceAssessor, LlmJudge, ResearchPolicy};
use ticket_triage::triage::TriageClassifier;

/// Ticket Triage — a retrieval-backed support-ticket pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Ticket Triage — classify, research, and draft replies to support tickets",
    version,
    long_about = "Ticket Triage runs support tickets through a three-stage pipeline: \
    an LLM triage step classifies each ticket, a retrieval step queries an embedded \
    knowledge base of FAQs and past tickets with a bounded retry loop, and a drafting \
    step writes the reply from the retrieved evidence."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge base.
    ///
    /// Loads FAQ markdown files and the past-tickets feed, embeds them,
    /// and persists the records to SQLite. A non-empty store is reused
    /// unless `--force` is passed.
    Build {
        /// Wipe and rebuild even if the store already has records.
        #[arg(long)]
        force: bool,
    },

    /// Run tickets through the pipeline.
    ///
    /// Reads the configured ticket feed and processes each ticket through
    /// triage, research, and drafting, printing a formatted report per
    /// ticket and a batch summary.
    Run {
        /// Process a single ticket by id (e.g. TEST007).
        #[arg(long)]
        id: Option<String>,

        /// Only process the first N tickets.
        #[arg(long)]
        limit: Option<usize>,

        /// Force a knowledge-base rebuild before running.
        #[arg(long)]
        rebuild: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { force } => {
            let kb = ingest::build(&cfg, force).await?;
            println!("Knowledge base ready: {} record(s).", kb.len());
        }
        Commands::Run { id, limit, rebuild } => {
            run_tickets(&cfg, id, limit, rebuild).await?;
        }
    }

    Ok(())
}

async fn run_tickets(
    cfg: &config::Config,
    id: Option<String>,
    limit: Option<usize>,
    rebuild: bool,
) -> Result<()> {
    println!("Loading knowledge base...");
    let kb = ingest::build(cfg, rebuild).await?;

    let content = std::fs::read_to_string(&cfg.data.tickets)
        .with_context(|| format!("Failed to read tickets: {}", cfg.data.tickets.display()))?;
    let all_tickets: Vec<Ticket> =
        serde_json::from_str(&content).with_context(|| "Failed to parse tickets JSON")?;

    let tickets: Vec<Ticket> = if let Some(id) = &id {
        let matched: Vec<Ticket> = all_tickets.into_iter().filter(|t| &t.id == id).collect();
        if matched.is_empty() {
            bail!("No ticket found with id={}", id);
        }
        matched
    } else if let Some(limit) = limit {
        all_tickets.into_iter().take(limit).collect()
    } else {
        all_tickets
    };

    println!("Running {} ticket(s) through the pipeline...", tickets.len());

    let llm = LlmClient::new(&cfg.llm)?;
    let classifier = TriageClassifier::new(llm.clone(), &cfg.llm.triage_model);
    let judge = LlmJudge::new(llm.clone(), &cfg.llm.research_model);
    let drafter = ReplyDrafter::new(llm, &cfg.llm.draft_model);
    let assessor = EvidenceAssessor::new(&kb, &judge, ResearchPolicy::from(&cfg.research));

    let pipeline = TicketPipeline {
        classifier: &classifier,
        assessor: &assessor,
        drafter: &drafter,
        verbose: true,
    };

    let mut results = Vec::with_capacity(tickets.len());
    let mut failed = 0usize;

    for ticket in &tickets {
        println!("\n----- Ticket {} | {} -----", ticket.id, ticket.subject);
        match pipeline.run(ticket).await {
            Ok(result) => {
                report::print_result(&result);
                results.push(result);
            }
            Err(e) => {
                eprintln!("  Ticket {} failed: {:#}", ticket.id, e);
                failed += 1;
            }
        }
    }

    if results.len() > 1 {
        report::print_summary(&results);
    }

    if failed > 0 {
        bail!("{} ticket(s) failed", failed);
    }
    Ok(())
}
