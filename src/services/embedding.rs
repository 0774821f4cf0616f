//! Content model: word vectors over title and actor tokens.
//!
//! Vectors are built with random indexing: every token gets a sparse
//! pseudo-random index vector, and a token's context vector is the sum of the
//! index vectors of everything it co-occurs with (the cast of a movie, and the
//! neighbouring titles in each user's review history). Vectors are stored unit
//! length so cosine similarity is a dot product.

use serde::Deserialize;
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{MovieResponse, Token, TrainingCorpus},
};

/// Non-zero entries per index vector
const INDEX_NONZEROS: usize = 8;
/// Weight of a token's own index vector in its context vector
const SELF_WEIGHT: f32 = 2.0;
/// Titles on either side of a title in a user's history that count as context
const HISTORY_WINDOW: usize = 2;

/// How neighbour scores from several query tokens are merged per candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineStrategy {
    /// Best single contribution; titles matched by many weak queries are not over-rewarded
    #[default]
    Max,
    /// Sum of contributions
    Sum,
}

impl CombineStrategy {
    fn combine(self, current: f32, contribution: f32) -> f32 {
        match self {
            CombineStrategy::Max => current.max(contribution),
            CombineStrategy::Sum => current + contribution,
        }
    }
}

/// Immutable word-vector space
#[derive(Debug, Clone)]
pub struct EmbeddingModel {
    dim: usize,
    vocab: Vec<Token>,
    vectors: Vec<Vec<f32>>,
    index: HashMap<Token, usize>,
    titles: Vec<usize>,
}

impl EmbeddingModel {
    /// Builds a model from explicit vectors; vectors are normalised on the way in
    pub fn from_vectors(dim: usize, entries: Vec<(Token, Vec<f32>)>) -> AppResult<Self> {
        let mut vocab = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        let mut titles = Vec::new();

        for (token, mut vector) in entries {
            if vector.len() != dim {
                return Err(AppError::Training(format!(
                    "Vector for '{}' has dimension {}, expected {}",
                    token,
                    vector.len(),
                    dim
                )));
            }
            if index.contains_key(&token) {
                continue;
            }
            normalize(&mut vector);
            let position = vocab.len();
            if token.is_title() {
                titles.push(position);
            }
            index.insert(token.clone(), position);
            vocab.push(token);
            vectors.push(vector);
        }

        Ok(Self {
            dim,
            vocab,
            vectors,
            index,
            titles,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.index.contains_key(token)
    }

    pub fn vector(&self, token: &Token) -> Option<&[f32]> {
        self.index.get(token).map(|&i| self.vectors[i].as_slice())
    }

    /// Title tokens nearest to `token`, best first; `None` if the token is unknown
    ///
    /// The query itself is included when it is a title (self-similarity 1.0).
    pub fn nearest_titles(&self, token: &Token, top_n: usize) -> Option<Vec<(&Token, f32)>> {
        let query = self.vector(token)?;

        let mut scored: Vec<(&Token, f32)> = self
            .titles
            .iter()
            .map(|&i| (&self.vocab[i], dot(query, &self.vectors[i])))
            .collect();

        scored.sort_by(|a, b| compare_ranked(a.0, a.1, b.0, b.1));
        scored.truncate(top_n);
        Some(scored)
    }
}

/// Deterministic random-indexing trainer
#[derive(Debug, Clone)]
pub struct EmbeddingTrainer {
    dim: usize,
    seed: u64,
}

impl EmbeddingTrainer {
    pub fn new(dim: usize, seed: u64) -> Self {
        Self { dim, seed }
    }

    /// Trains a full model from the corpus
    pub fn train(&self, corpus: &TrainingCorpus) -> AppResult<EmbeddingModel> {
        if self.dim == 0 {
            return Err(AppError::Training("Embedding dimension must be positive".to_string()));
        }

        let mut contexts: Vec<Vec<Token>> = Vec::new();
        let mut titles_by_movie = HashMap::new();

        for movie in &corpus.movies {
            let title = movie.title_token();
            titles_by_movie.insert(movie.movie_seq, title.clone());

            let mut sentence = Vec::with_capacity(movie.actors.len() + 1);
            sentence.push(title);
            sentence.extend(movie.actors.iter().map(|a| Token::actor(a.as_str())));
            contexts.push(sentence);
        }

        // Per-user histories in review order
        let mut histories: HashMap<i64, Vec<(chrono::DateTime<chrono::Utc>, i64)>> =
            HashMap::new();
        for rating in &corpus.ratings {
            histories
                .entry(rating.user_seq)
                .or_default()
                .push((rating.created_at, rating.movie_seq));
        }

        let mut users: Vec<_> = histories.into_iter().collect();
        users.sort_by_key(|(user, _)| *user);

        let mut accum: HashMap<Token, Vec<f32>> = HashMap::new();

        for sentence in &contexts {
            for (i, token) in sentence.iter().enumerate() {
                let vector = accum
                    .entry(token.clone())
                    .or_insert_with(|| self.index_vector(token));
                for (j, other) in sentence.iter().enumerate() {
                    if i != j {
                        add_index(vector, self.index_entries(other));
                    }
                }
            }
        }

        for (_, mut history) in users {
            history.sort();
            let sentence: Vec<&Token> = history
                .iter()
                .filter_map(|(_, movie)| titles_by_movie.get(movie))
                .collect();
            for (i, token) in sentence.iter().enumerate() {
                let lo = i.saturating_sub(HISTORY_WINDOW);
                let hi = (i + HISTORY_WINDOW + 1).min(sentence.len());
                let entries: Vec<_> = (lo..hi)
                    .filter(|&j| j != i && sentence[j] != *token)
                    .map(|j| self.index_entries(sentence[j]))
                    .collect();
                if let Some(vector) = accum.get_mut(*token) {
                    for e in entries {
                        add_index(vector, e);
                    }
                }
            }
        }

        let mut entries: Vec<(Token, Vec<f32>)> = accum.into_iter().collect();
        entries.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));

        tracing::debug!(
            vocabulary = entries.len(),
            dim = self.dim,
            "Embedding vectors accumulated"
        );

        EmbeddingModel::from_vectors(self.dim, entries)
    }

    fn index_vector(&self, token: &Token) -> Vec<f32> {
        let mut vector = vec![0.0; self.dim];
        let entries = self
            .index_entries(token)
            .into_iter()
            .map(|(position, value)| (position, value * SELF_WEIGHT))
            .collect();
        add_index(&mut vector, entries);
        vector
    }

    /// Sparse ternary index vector for a token
    fn index_entries(&self, token: &Token) -> Vec<(usize, f32)> {
        let mut state = fnv1a(token.to_string().as_bytes()) ^ self.seed;
        (0..INDEX_NONZEROS.min(self.dim))
            .map(|_| {
                let r = splitmix64(&mut state);
                let position = (r % self.dim as u64) as usize;
                let sign = if (r >> 63) == 0 { 1.0 } else { -1.0 };
                (position, sign)
            })
            .collect()
    }
}

/// Ranks titles similar to a list of query tokens against one model
#[derive(Debug, Clone, Copy)]
pub struct SimilarityEngine {
    top_n: usize,
    combine: CombineStrategy,
}

impl SimilarityEngine {
    pub fn new(top_n: usize, combine: CombineStrategy) -> Self {
        Self { top_n, combine }
    }

    /// Merges the neighbours of every known query token into one ranking
    ///
    /// Unknown tokens contribute nothing; an all-unknown query yields an empty list.
    pub fn rank(&self, model: &EmbeddingModel, queries: &[Token]) -> Vec<MovieResponse> {
        let mut combined: HashMap<&Token, f32> = HashMap::new();
        let mut skipped = 0usize;

        for query in queries {
            let Some(neighbours) = model.nearest_titles(query, self.top_n) else {
                skipped += 1;
                continue;
            };
            for (candidate, score) in neighbours {
                combined
                    .entry(candidate)
                    .and_modify(|s| *s = self.combine.combine(*s, score))
                    .or_insert(score);
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, total = queries.len(), "Unknown query tokens skipped");
        }

        let mut ranked: Vec<(&Token, f32)> = combined.into_iter().collect();
        ranked.sort_by(|a, b| compare_ranked(a.0, a.1, b.0, b.1));

        ranked
            .into_iter()
            .filter_map(|(token, _)| token.as_title())
            .map(|(title, year)| MovieResponse::new(title, year))
            .collect()
    }
}

/// Descending score, then title ascending, then year ascending
fn compare_ranked(a: &Token, a_score: f32, b: &Token, b_score: f32) -> std::cmp::Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a.as_title().cmp(&b.as_title()))
}

fn add_index(vector: &mut [f32], entries: Vec<(usize, f32)>) {
    for (position, value) in entries {
        vector[position] += value;
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(vector: &mut [f32]) {
    let norm = dot(vector, vector).sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

pub(crate) fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieRecord, RatingRecord};
    use chrono::{Duration, TimeZone, Utc};

    fn movie(seq: i64, title: &str, year: i32, actors: &[&str]) -> MovieRecord {
        MovieRecord {
            movie_seq: seq,
            title: title.to_string(),
            year,
            genre: None,
            actors: actors.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn test_corpus() -> TrainingCorpus {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rating = |user, movie, days| RatingRecord {
            user_seq: user,
            movie_seq: movie,
            rating: 4.0,
            sentiment_score: None,
            created_at: base + Duration::days(days),
        };

        TrainingCorpus {
            movies: vec![
                movie(1, "Inception", 2010, &["Leonardo DiCaprio", "Tom Hardy"]),
                movie(2, "The Revenant", 2015, &["Leonardo DiCaprio", "Tom Hardy"]),
                movie(3, "Mad Max: Fury Road", 2015, &["Tom Hardy", "Charlize Theron"]),
                movie(4, "Frozen", 2013, &["Kristen Bell", "Idina Menzel"]),
            ],
            ratings: vec![rating(1, 1, 0), rating(1, 2, 1), rating(2, 4, 0)],
        }
    }

    fn fixed_model() -> EmbeddingModel {
        EmbeddingModel::from_vectors(
            2,
            vec![
                (Token::title("Alpha", 2000), vec![1.0, 0.0]),
                (Token::title("Beta", 2001), vec![0.9, 0.1]),
                (Token::title("Gamma", 2002), vec![0.0, 1.0]),
                (Token::title("Delta", 2003), vec![0.0, 1.0]),
                (Token::actor("Some Actor"), vec![1.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_training_is_deterministic() {
        let trainer = EmbeddingTrainer::new(32, 7);
        let first = trainer.train(&test_corpus()).unwrap();
        let second = trainer.train(&test_corpus()).unwrap();

        let token = Token::title("Inception", 2010);
        assert_eq!(first.vector(&token), second.vector(&token));
        assert_eq!(first.len(), 9);
    }

    #[test]
    fn test_self_similarity_ranks_first() {
        let model = EmbeddingTrainer::new(64, 42).train(&test_corpus()).unwrap();
        let engine = SimilarityEngine::new(10, CombineStrategy::Max);

        let ranked = engine.rank(&model, &[Token::title("Inception", 2010)]);

        assert_eq!(ranked[0], MovieResponse::new("Inception", 2010));
        assert_eq!(ranked.len(), 4);
    }

    #[test]
    fn test_shared_cast_ranks_above_unrelated() {
        let model = EmbeddingTrainer::new(64, 42).train(&test_corpus()).unwrap();
        let engine = SimilarityEngine::new(10, CombineStrategy::Max);

        let ranked = engine.rank(&model, &[Token::title("Inception", 2010)]);
        let revenant = ranked
            .iter()
            .position(|m| m.movie_title == "The Revenant")
            .unwrap();
        let frozen = ranked.iter().position(|m| m.movie_title == "Frozen").unwrap();

        assert!(revenant < frozen);
    }

    #[test]
    fn test_actor_query_returns_only_titles() {
        let model = fixed_model();
        let engine = SimilarityEngine::new(10, CombineStrategy::Max);

        let ranked = engine.rank(&model, &[Token::actor("Some Actor")]);

        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0], MovieResponse::new("Alpha", 2000));
        assert!(ranked.iter().all(|m| m.movie_title != "Some Actor"));
    }

    #[test]
    fn test_unknown_tokens_are_skipped() {
        let model = fixed_model();
        let engine = SimilarityEngine::new(10, CombineStrategy::Max);

        let known = engine.rank(&model, &[Token::title("Alpha", 2000)]);
        let mixed = engine.rank(
            &model,
            &[Token::actor("Nobody"), Token::title("Alpha", 2000), Token::title("Missing", 1990)],
        );

        assert_eq!(known, mixed);
    }

    #[test]
    fn test_all_unknown_is_empty() {
        let model = fixed_model();
        let engine = SimilarityEngine::new(10, CombineStrategy::Max);

        assert!(engine.rank(&model, &[Token::actor("Nobody")]).is_empty());
        assert!(engine.rank(&model, &[]).is_empty());
    }

    #[test]
    fn test_ties_break_by_title() {
        let model = fixed_model();
        let engine = SimilarityEngine::new(2, CombineStrategy::Max);

        let ranked = engine.rank(&model, &[Token::title("Gamma", 2002)]);

        assert_eq!(
            ranked,
            vec![MovieResponse::new("Delta", 2003), MovieResponse::new("Gamma", 2002)]
        );
    }

    #[test]
    fn test_max_and_sum_combine_differ() {
        let model = fixed_model();
        let queries = [Token::title("Alpha", 2000), Token::title("Gamma", 2002)];

        let max = SimilarityEngine::new(4, CombineStrategy::Max).rank(&model, &queries);
        let sum = SimilarityEngine::new(4, CombineStrategy::Sum).rank(&model, &queries);

        // Under max, Alpha/Gamma/Delta all score 1.0 and sort by title
        assert_eq!(max[0], MovieResponse::new("Alpha", 2000));
        assert_eq!(max[1], MovieResponse::new("Delta", 2003));
        // Under sum, Beta collects from both queries and overtakes Delta
        let beta = sum.iter().position(|m| m.movie_title == "Beta").unwrap();
        let delta = sum.iter().position(|m| m.movie_title == "Delta").unwrap();
        assert!(beta < delta);
    }

    #[test]
    fn test_duplicate_tokens_are_deduplicated() {
        let model = EmbeddingModel::from_vectors(
            2,
            vec![
                (Token::title("Alpha", 2000), vec![1.0, 0.0]),
                (Token::title("Alpha", 2000), vec![0.0, 1.0]),
            ],
        )
        .unwrap();
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let result = EmbeddingModel::from_vectors(3, vec![(Token::actor("A"), vec![1.0])]);
        assert!(matches!(result, Err(AppError::Training(_))));
    }

    #[test]
    fn test_empty_corpus_yields_empty_model() {
        let model = EmbeddingTrainer::new(16, 1).train(&TrainingCorpus::default()).unwrap();
        assert!(model.is_empty());
    }
}
