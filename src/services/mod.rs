pub mod embedding;
pub mod factors;
pub mod registry;
pub mod retraining;
pub mod sentiment;
pub mod wordcloud;

pub use embedding::{CombineStrategy, EmbeddingModel, EmbeddingTrainer, SimilarityEngine};
pub use factors::{CollaborativeEngine, FactorStore, FactorTrainer};
pub use registry::{ModelGeneration, ModelRegistry};
pub use retraining::{
    bootstrap, CorpusSource, ModelBuilder, RetrainingHandle, RetrainingPipeline, TriggerOutcome,
};
pub use sentiment::{LexiconScorer, RemoteScorer, SentimentBatcher, SentimentScorer};
pub use wordcloud::WordCloudBuilder;
