use serde::Deserialize;

use crate::services::embedding::CombineStrategy;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// SQLite database connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Redis connection URL; response caching is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of review texts handed to the scorer in one call
    #[serde(default = "default_sentiment_batch_size")]
    pub sentiment_batch_size: usize,

    /// Remote sentiment model endpoint; the built-in lexicon scorer is used when unset
    #[serde(default)]
    pub sentiment_scorer_url: Option<String>,

    /// Dimension of the title/actor word vectors
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Seed for the embedding index vectors
    #[serde(default = "default_embedding_seed")]
    pub embedding_seed: u64,

    /// Neighbours kept per query token
    #[serde(default = "default_similar_top_n")]
    pub similar_top_n: usize,

    /// How neighbour scores from several query tokens are merged
    #[serde(default)]
    pub similarity_combine: CombineStrategy,

    /// Latent factor dimension for the collaborative model
    #[serde(default = "default_factor_dim")]
    pub factor_dim: usize,

    /// SGD passes over the rating matrix per retrain
    #[serde(default = "default_factor_epochs")]
    pub factor_epochs: usize,

    /// Share of the collaborative score taken by recency (0.0..=1.0)
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,

    /// Share of a review's training target taken by its sentiment score (0.0..=1.0)
    #[serde(default = "default_sentiment_weight")]
    pub sentiment_weight: f32,

    /// Age in days at which a movie's recency weight halves
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f32,

    /// Maximum number of collaborative recommendations returned
    #[serde(default = "default_collabo_limit")]
    pub collabo_limit: usize,
}

fn default_database_url() -> String {
    "sqlite://recommend.db?mode=rwc".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_sentiment_batch_size() -> usize {
    8192
}

fn default_embedding_dim() -> usize {
    100
}

fn default_embedding_seed() -> u64 {
    42
}

fn default_similar_top_n() -> usize {
    10
}

fn default_factor_dim() -> usize {
    16
}

fn default_factor_epochs() -> usize {
    30
}

fn default_recency_weight() -> f32 {
    0.2
}

fn default_sentiment_weight() -> f32 {
    0.3
}

fn default_recency_half_life_days() -> f32 {
    30.0
}

fn default_collabo_limit() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            redis_url: None,
            host: default_host(),
            port: default_port(),
            sentiment_batch_size: default_sentiment_batch_size(),
            sentiment_scorer_url: None,
            embedding_dim: default_embedding_dim(),
            embedding_seed: default_embedding_seed(),
            similar_top_n: default_similar_top_n(),
            similarity_combine: CombineStrategy::default(),
            factor_dim: default_factor_dim(),
            factor_epochs: default_factor_epochs(),
            recency_weight: default_recency_weight(),
            sentiment_weight: default_sentiment_weight(),
            recency_half_life_days: default_recency_half_life_days(),
            collabo_limit: default_collabo_limit(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the services cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sentiment_batch_size == 0 {
            anyhow::bail!("SENTIMENT_BATCH_SIZE must be at least 1");
        }
        if self.embedding_dim == 0 || self.factor_dim == 0 {
            anyhow::bail!("EMBEDDING_DIM and FACTOR_DIM must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.recency_weight) {
            anyhow::bail!("RECENCY_WEIGHT must be within 0.0..=1.0");
        }
        if !(0.0..=1.0).contains(&self.sentiment_weight) {
            anyhow::bail!("SENTIMENT_WEIGHT must be within 0.0..=1.0");
        }
        if self.recency_half_life_days <= 0.0 {
            anyhow::bail!("RECENCY_HALF_LIFE_DAYS must be positive");
        }
        Ok(())
    }
}
