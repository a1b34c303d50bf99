use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory of FAQ markdown files (one record per `*.md` file).
    pub faqs_dir: PathBuf,
    /// JSON array of resolved past tickets.
    pub past_tickets: PathBuf,
    /// JSON array of incoming tickets to run through the pipeline.
    pub tickets: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

/// Retry-loop and sufficiency constants for the research stage.
///
/// Kept in configuration rather than as globals so tests can vary them
/// per case.
#[derive(Debug, Deserialize, Clone)]
pub struct ResearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine score for a match to count as strong.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Strong non-stale matches needed to skip the retry loop.
    #[serde(default = "default_min_strong_matches")]
    pub min_strong_matches: usize,
    /// Research retries allowed beyond the first attempt.
    #[serde(default = "default_research_retries")]
    pub max_retries: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            min_strong_matches: default_min_strong_matches(),
            max_retries: default_research_retries(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_similarity_threshold() -> f32 {
    0.5
}
fn default_min_strong_matches() -> usize {
    2
}
fn default_research_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Anthropic model used for triage classification.
    #[serde(default = "default_triage_model")]
    pub triage_model: String,
    /// OpenAI model used for research match judging.
    #[serde(default = "default_research_model")]
    pub research_model: String,
    /// OpenAI model used for reply drafting.
    #[serde(default = "default_draft_model")]
    pub draft_model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            triage_model: default_triage_model(),
            research_model: default_research_model(),
            draft_model: default_draft_model(),
            max_tokens: default_llm_max_tokens(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_triage_model() -> String {
    "claude-opus-4-5".to_string()
}
fn default_research_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_draft_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_max_tokens() -> u32 {
    1024
}
fn default_llm_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.research.top_k == 0 {
        anyhow::bail!("research.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.research.similarity_threshold) {
        anyhow::bail!("research.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.research.min_strong_matches == 0 {
        anyhow::bail!("research.min_strong_matches must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/kb.sqlite"

[data]
faqs_dir = "./data/faqs"
past_tickets = "./data/past_tickets.json"
tickets = "./data/tickets.json"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.research.top_k, 3);
        assert!((cfg.research.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.research.min_strong_matches, 2);
        assert_eq!(cfg.research.max_retries, 2);
        assert_eq!(cfg.llm.research_model, "gpt-4o-mini");
    }

    #[test]
    fn test_research_overrides_apply() {
        let toml_str = format!(
            "{}\n[research]\ntop_k = 5\nsimilarity_threshold = 0.7\nmax_retries = 1\n",
            MINIMAL
        );
        let cfg: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg.research.top_k, 5);
        assert!((cfg.research.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.research.max_retries, 1);
        // untouched sections keep defaults
        assert_eq!(cfg.research.min_strong_matches, 2);
    }
}
