//! Kernel configuration.
//!
//! All settings can be configured via environment variables:
//! - `SUMMARY_MODEL`: Model used for branch summaries (default: `gpt-4o-mini`)
//! - `MERGE_CONCURRENCY`: Branch histories fetched at once by the merger
//! - `HISTORY_CONCURRENCY`: Attached-context resolutions run at once per history
//! - `AGGREGATOR_PROMPT`: Default aggregator instructions for PARALLELIZATION nodes
//!
//! Both concurrency limits default to half of `DB_MAX_CONNECTIONS` (itself
//! defaulting to 10), never less than 1.

/// Built-in aggregator instructions.
pub const DEFAULT_AGGREGATOR_PROMPT: &str = "You have been provided with a set of responses from various models to the latest user query. \
Your task is to synthesize these responses into a single, high-quality response. \
Critically evaluate the information provided, recognizing that some of it may be biased or incorrect. \
Do not simply replicate the given answers; offer a refined, accurate and comprehensive reply. \
Responses from models:";

/// Built-in summarization instructions for merger branches.
pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the following conversation branch. \
Keep every fact, decision and open question a later model would need to continue the conversation. \
Answer with the summary only.";

/// Default summary model.
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";

/// Runtime settings for history construction and merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Model used to summarize merger branches.
    pub summary_model: String,
    /// Instructions sent with every branch summary request.
    pub summary_prompt: String,
    /// Concurrent branch-history fetches per merge.
    pub merge_concurrency: usize,
    /// Concurrent attached-context resolutions per history.
    pub history_concurrency: usize,
    /// Aggregator instructions used when a node has none.
    pub aggregator_prompt: String,
}

fn half_pool(max_connections: usize) -> usize {
    (max_connections / 2).max(1)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
            merge_concurrency: half_pool(10),
            history_concurrency: half_pool(10),
            aggregator_prompt: DEFAULT_AGGREGATOR_PROMPT.to_string(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let pool_default = half_pool(env_usize("DB_MAX_CONNECTIONS").unwrap_or(10));
        Self {
            summary_model: std::env::var("SUMMARY_MODEL")
                .unwrap_or_else(|_| DEFAULT_SUMMARY_MODEL.to_string()),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
            merge_concurrency: env_usize("MERGE_CONCURRENCY").unwrap_or(pool_default).max(1),
            history_concurrency: env_usize("HISTORY_CONCURRENCY").unwrap_or(pool_default).max(1),
            aggregator_prompt: std::env::var("AGGREGATOR_PROMPT")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AGGREGATOR_PROMPT.to_string()),
        }
    }

    /// Override the summary model.
    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = model.into();
        self
    }

    /// Override both concurrency limits.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.merge_concurrency = limit.max(1);
        self.history_concurrency = limit.max(1);
        self
    }
}
