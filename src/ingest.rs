//! Knowledge-base ingestion: FAQ files and resolved past tickets.
//!
//! Coordinates the build flow: load → hash → embed (reusing cached
//! vectors where text is unchanged) → atomically replace the store →
//! hydrate a [`KnowledgeBase`]. Runs once at startup, or on demand with
//! `--force` / `--rebuild`.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::index::{IndexedRecord, SimilarityIndex};
use crate::kb::KnowledgeBase;
use crate::migrate;
use crate::models::{KbItem, RecordMeta, SourceType};
use crate::store::{content_hash, RecordStore};

/// A resolved past ticket as stored in the past-tickets feed.
#[derive(Debug, serde::Deserialize)]
struct PastTicket {
    id: i64,
    category: String,
    question: String,
    resolution: String,
}

/// Markers in a resolution that flag it as outdated.
const STALE_MARKERS: [&str; 2] = ["STALE", "NO LONGER VALID"];

fn is_stale(resolution: &str) -> bool {
    let upper = resolution.to_uppercase();
    STALE_MARKERS.iter().any(|m| upper.contains(m))
}

/// Load every `*.md` file under `dir` as a FAQ record, sorted by path.
pub fn load_faqs(dir: &Path) -> Result<Vec<KbItem>> {
    let mut paths: Vec<_> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        eprintln!("Warning: no .md files found in {}", dir.display());
    }

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read FAQ file: {}", path.display()))?
            .trim()
            .to_string();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        items.push(KbItem {
            source_id: format!("faq-{}", stem),
            text,
            meta: RecordMeta {
                source_type: SourceType::Faq,
                category: None,
                title: Some(stem.replace('_', " ")),
                stale: false,
            },
        });
    }
    Ok(items)
}

/// Load the past-tickets JSON feed.
///
/// Each ticket becomes a `ticket-{id}` record whose text pairs the
/// customer question with its resolution; resolutions carrying a stale
/// marker are indexed but flagged.
pub fn load_past_tickets(path: &Path) -> Result<Vec<KbItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read past tickets: {}", path.display()))?;
    let tickets: Vec<PastTicket> =
        serde_json::from_str(&content).with_context(|| "Failed to parse past tickets JSON")?;

    Ok(tickets
        .into_iter()
        .map(|t| KbItem {
            source_id: format!("ticket-{}", t.id),
            text: format!(
                "Customer question: {}\nResolution: {}",
                t.question, t.resolution
            ),
            meta: RecordMeta {
                source_type: SourceType::PastTicket,
                category: Some(t.category),
                title: None,
                stale: is_stale(&t.resolution),
            },
        })
        .collect())
}

/// Build (or reuse) the knowledge base with the configured OpenAI backend.
pub async fn build(config: &Config, force: bool) -> Result<KnowledgeBase> {
    let embedder = Box::new(OpenAiEmbedder::new(&config.embedding)?);
    build_with_embedder(config, force, embedder).await
}

/// Build (or reuse) the knowledge base with an explicit embedding backend.
///
/// A non-empty store is reused as-is unless `force` is set. A rebuild
/// embeds only records whose text hash is absent from the store's
/// embedding cache, then replaces the store in one transaction.
pub async fn build_with_embedder(
    config: &Config,
    force: bool,
    embedder: Box<dyn Embedder>,
) -> Result<KnowledgeBase> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = RecordStore::new(pool);

    let existing = store.count().await?;
    if existing > 0 && !force {
        println!(
            "Knowledge base already has {} records. Pass --force to rebuild.",
            existing
        );
        let index = store.load().await?;
        return Ok(KnowledgeBase::from_index(index, embedder));
    }

    if force && existing > 0 {
        println!("force rebuild: replacing {} records", existing);
    } else {
        println!("Building knowledge base from scratch...");
    }

    let mut items = load_faqs(&config.data.faqs_dir)?;
    println!("  {} FAQ file(s) in {}", items.len(), config.data.faqs_dir.display());

    let tickets = load_past_tickets(&config.data.past_tickets)?;
    let stale = tickets.iter().filter(|t| t.meta.stale).count();
    println!(
        "  {} past ticket(s) in {}",
        tickets.len(),
        config.data.past_tickets.display()
    );
    if stale > 0 {
        println!("  {} ticket(s) flagged stale - indexed but marked", stale);
    }
    items.extend(tickets);

    // Reuse stored vectors for unchanged text
    let cache = if existing > 0 {
        store.embedding_cache(embedder.model_name()).await?
    } else {
        Default::default()
    };

    let mut records: Vec<IndexedRecord> = Vec::with_capacity(items.len());
    let mut pending: Vec<KbItem> = Vec::new();

    for item in items {
        match cache.get(&content_hash(&item.text)) {
            Some(vector) => records.push(IndexedRecord {
                source_id: item.source_id,
                text: item.text,
                embedding: vector.clone(),
                meta: item.meta,
            }),
            None => pending.push(item),
        }
    }

    let reused = records.len();
    for batch in pending.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|i| i.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        anyhow::ensure!(
            vectors.len() == batch.len(),
            "Embedding backend returned {} vectors for {} texts",
            vectors.len(),
            batch.len()
        );
        for (item, embedding) in batch.iter().zip(vectors) {
            records.push(IndexedRecord {
                source_id: item.source_id.clone(),
                text: item.text.clone(),
                embedding,
                meta: item.meta.clone(),
            });
        }
    }

    store
        .replace_all(&records, embedder.model_name(), embedder.dims())
        .await?;

    println!(
        "  {} record(s) written ({} embedded, {} reused)",
        records.len(),
        records.len() - reused,
        reused
    );

    let mut index = SimilarityIndex::new();
    index.upsert(records);
    Ok(KnowledgeBase::from_index(index, embedder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_stale_markers_are_case_insensitive() {
        assert!(is_stale("This flow is stale and was replaced."));
        assert!(is_stale("Old billing portal - no longer valid."));
        assert!(!is_stale("Resolved by resetting the password."));
    }

    #[test]
    fn test_load_faqs_sorted_with_ids_from_stems() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("billing_cycle.md"), "# Billing\nMonthly.").unwrap();
        fs::write(tmp.path().join("api_limits.md"), "# Limits\n100 rps.").unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a faq").unwrap();

        let items = load_faqs(tmp.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, "faq-api_limits");
        assert_eq!(items[1].source_id, "faq-billing_cycle");
        assert_eq!(items[0].meta.title.as_deref(), Some("api limits"));
        assert_eq!(items[0].meta.source_type, SourceType::Faq);
    }

    #[test]
    fn test_load_past_tickets_shapes_and_staleness() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("past_tickets.json");
        fs::write(
            &path,
            r#"[
                {"id": 287, "category": "billing", "question": "Refund?", "resolution": "Use the refunds page."},
                {"id": 301, "category": "account", "question": "Old SSO?", "resolution": "STALE - SSO v1 was retired."}
            ]"#,
        )
        .unwrap();

        let items = load_past_tickets(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, "ticket-287");
        assert!(items[0].text.starts_with("Customer question: Refund?"));
        assert!(!items[0].meta.stale);
        assert!(items[1].meta.stale);
        assert_eq!(items[1].meta.category.as_deref(), Some("account"));
    }
}
