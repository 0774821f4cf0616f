use std::sync::Arc;

use crate::config::Config;
use crate::db::{ResponseCache, Store};
use crate::error::AppResult;
use crate::services::{
    CollaborativeEngine, LexiconScorer, ModelRegistry, RemoteScorer, RetrainingPipeline,
    SentimentBatcher, SentimentScorer, SimilarityEngine, WordCloudBuilder,
};

/// Seconds a cached `/content` or `/collabo` response stays in Redis
pub const RESPONSE_CACHE_TTL: u64 = 600;

/// Shared application state
///
/// Every field is a cheap handle; cloning the state per request shares the
/// underlying registry, pool and worker channels.
#[derive(Clone)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub store: Store,
    pub retraining: RetrainingPipeline,
    pub batcher: SentimentBatcher,
    pub similarity: SimilarityEngine,
    pub collaborative: CollaborativeEngine,
    pub word_clouds: WordCloudBuilder,
    pub cache: Option<Arc<dyn ResponseCache>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        registry: ModelRegistry,
        store: Store,
        retraining: RetrainingPipeline,
        scorer: Arc<dyn SentimentScorer>,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> AppResult<Self> {
        Ok(Self {
            registry,
            store,
            retraining,
            batcher: SentimentBatcher::new(scorer, config.sentiment_batch_size)?,
            similarity: SimilarityEngine::new(config.similar_top_n, config.similarity_combine),
            collaborative: CollaborativeEngine::new(config.recency_weight, config.collabo_limit),
            word_clouds: WordCloudBuilder::default(),
            cache,
        })
    }
}

/// Picks the remote model when configured, the built-in lexicon otherwise
pub fn select_scorer(config: &Config) -> Arc<dyn SentimentScorer> {
    match &config.sentiment_scorer_url {
        Some(url) => {
            tracing::info!(url = %url, "Using remote sentiment scorer");
            Arc::new(RemoteScorer::new(url.clone()))
        }
        None => {
            tracing::info!("Using built-in lexicon sentiment scorer");
            Arc::new(LexiconScorer::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_follows_config() {
        let mut config = Config::default();
        assert_eq!(select_scorer(&config).name(), "lexicon");

        config.sentiment_scorer_url = Some("http://localhost:9000/score".to_string());
        assert_eq!(select_scorer(&config).name(), "remote");
    }
}
