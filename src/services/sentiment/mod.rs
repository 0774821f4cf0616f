/// Sentiment scoring for review text
///
/// Scorers are pluggable: the in-process lexicon scorer is the default, and a
/// remote model server can be used instead. The batcher in front of them only
/// bounds how much text goes into one scoring call; results never depend on the
/// batch size.
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{SentimentResult, SentimentReviewEvent},
};

pub mod lexicon;
pub mod remote;

pub use lexicon::LexiconScorer;
pub use remote::RemoteScorer;

/// Scores a batch of texts, one score per text in input order
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, texts: Vec<String>) -> AppResult<Vec<f32>>;

    /// Scorer name for logging
    fn name(&self) -> &'static str;
}

/// Splits review lists into bounded batches for a scorer
#[derive(Clone)]
pub struct SentimentBatcher {
    scorer: Arc<dyn SentimentScorer>,
    batch_size: usize,
}

impl SentimentBatcher {
    pub fn new(scorer: Arc<dyn SentimentScorer>, batch_size: usize) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::InvalidInput("Batch size must be at least 1".to_string()));
        }
        Ok(Self { scorer, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Scores every text, concatenating batch outputs in input order
    pub async fn score_texts(&self, texts: &[String]) -> AppResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            let batch_scores = self.scorer.score(batch.to_vec()).await?;
            if batch_scores.len() != batch.len() {
                return Err(AppError::Scoring(format!(
                    "{} returned {} scores for a batch of {}",
                    self.scorer.name(),
                    batch_scores.len(),
                    batch.len()
                )));
            }
            tracing::debug!(batch = index, size = batch.len(), "Sentiment batch scored");
            scores.extend(batch_scores);
        }

        Ok(scores)
    }

    /// Scores review events, keeping each score attached to its review
    pub async fn score_reviews(
        &self,
        reviews: &[SentimentReviewEvent],
    ) -> AppResult<Vec<SentimentResult>> {
        let texts: Vec<String> = reviews.iter().map(|r| r.review_text.clone()).collect();

        tracing::info!(
            reviews = reviews.len(),
            batch_size = self.batch_size,
            batches = reviews.len().div_ceil(self.batch_size),
            scorer = self.scorer.name(),
            "Scoring reviews"
        );

        let scores = self.score_texts(&texts).await?;

        Ok(reviews
            .iter()
            .zip(scores)
            .map(|(review, score)| SentimentResult::from_event(review, score))
            .collect())
    }
}
