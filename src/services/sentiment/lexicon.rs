use std::collections::HashSet;

use crate::error::AppResult;

use super::SentimentScorer;

const POSITIVE: &[&str] = &[
    "amazing", "awesome", "beautiful", "best", "brilliant", "enjoy", "enjoyed", "excellent",
    "fantastic", "fun", "funny", "good", "great", "love", "loved", "masterpiece", "moving",
    "perfect", "recommend", "touching", "wonderful", "최고", "재밌다", "재미있다", "감동",
    "좋다", "좋았다", "명작", "추천",
];

const NEGATIVE: &[&str] = &[
    "awful", "bad", "boring", "disappointing", "dull", "hate", "hated", "horrible", "mess",
    "poor", "terrible", "waste", "weak", "worse", "worst", "최악", "별로", "지루", "지루하다",
    "실망", "아깝다",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "isn't", "wasn't", "don't", "didn't", "안"];

/// Word-list scorer returning the probability that a review is positive
///
/// Counts positive and negative words, flipping the polarity of a word that
/// directly follows a negation, and maps the balance into `0.0..=1.0` with
/// 0.5 for text carrying no signal.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    negations: HashSet<&'static str>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE.iter().copied().collect(),
            negative: NEGATIVE.iter().copied().collect(),
            negations: NEGATIONS.iter().copied().collect(),
        }
    }

    pub fn score_text(&self, text: &str) -> f32 {
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty());

        let (mut pos, mut neg) = (0u32, 0u32);
        let mut negated = false;

        for word in words {
            if self.negations.contains(word) {
                negated = true;
                continue;
            }
            let polarity = if self.positive.contains(word) {
                1
            } else if self.negative.contains(word) {
                -1
            } else {
                0
            };
            match (polarity, negated) {
                (1, false) | (-1, true) => pos += 1,
                (-1, false) | (1, true) => neg += 1,
                _ => {}
            }
            negated = false;
        }

        0.5 + 0.5 * (pos as f32 - neg as f32) / (pos + neg + 1) as f32
    }
}

#[async_trait::async_trait]
impl SentimentScorer for LexiconScorer {
    async fn score(&self, texts: Vec<String>) -> AppResult<Vec<f32>> {
        let scorer = self.clone();
        let scores: Vec<f32> = tokio::task::spawn_blocking(move || {
            texts.iter().map(|t| scorer.score_text(t)).collect()
        })
        .await?;
        Ok(scores)
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_review_scores_high() {
        let scorer = LexiconScorer::new();
        assert!(scorer.score_text("An amazing, beautiful masterpiece!") > 0.7);
    }

    #[test]
    fn test_negative_review_scores_low() {
        let scorer = LexiconScorer::new();
        assert!(scorer.score_text("Boring and a total waste of time") < 0.3);
    }

    #[test]
    fn test_neutral_text_is_half() {
        let scorer = LexiconScorer::new();
        assert_eq!(scorer.score_text("I watched it on Tuesday"), 0.5);
        assert_eq!(scorer.score_text(""), 0.5);
    }

    #[test]
    fn test_negation_flips_polarity() {
        let scorer = LexiconScorer::new();
        assert!(scorer.score_text("not good") < 0.5);
        assert!(scorer.score_text("not bad") > 0.5);
    }

    #[test]
    fn test_korean_words_are_scored() {
        let scorer = LexiconScorer::new();
        assert!(scorer.score_text("정말 최고 감동") > 0.5);
        assert!(scorer.score_text("너무 지루 최악") < 0.5);
    }

    #[tokio::test]
    async fn test_async_score_keeps_order() {
        let scorer = LexiconScorer::new();
        let scores = scorer
            .score(vec!["great".to_string(), "awful".to_string(), "fine".to_string()])
            .await
            .unwrap();
        assert!(scores[0] > 0.5);
        assert!(scores[1] < 0.5);
        assert_eq!(scores[2], 0.5);
    }
}
