//! Collaborative model: latent user/movie factors with a recency signal.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    models::{MovieResponse, MovieSeq, TrainingCorpus, UserSeq},
    services::embedding::{fnv1a, splitmix64},
};

const LEARNING_RATE: f32 = 0.05;
const REGULARIZATION: f32 = 0.02;
const INIT_SCALE: f32 = 0.1;
/// Top of the review rating scale; sentiment in `0..=1` is stretched onto `0..=RATING_SCALE`
const RATING_SCALE: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct UserFactor {
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct MovieFactor {
    pub movie_seq: MovieSeq,
    pub title: String,
    pub year: i32,
    pub vector: Vec<f32>,
    /// Halves every half-life since the movie's latest review; 0 when never reviewed
    pub recency: f32,
    pub interactions: u32,
}

/// Immutable factor set for one generation
#[derive(Debug, Clone)]
pub struct FactorStore {
    dim: usize,
    built_at: DateTime<Utc>,
    users: HashMap<UserSeq, UserFactor>,
    /// Sorted by `movie_seq`
    movies: Vec<MovieFactor>,
    rated: HashMap<UserSeq, HashSet<MovieSeq>>,
    /// Indices into `movies`, most popular first
    popularity: Vec<usize>,
}

impl FactorStore {
    /// A store with no users and no movies
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            built_at: Utc::now(),
            users: HashMap::new(),
            movies: Vec::new(),
            rated: HashMap::new(),
            popularity: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn movie_count(&self) -> usize {
        self.movies.len()
    }

    pub fn user(&self, user_seq: UserSeq) -> Option<&UserFactor> {
        self.users.get(&user_seq)
    }

    pub fn movie(&self, movie_seq: MovieSeq) -> Option<&MovieFactor> {
        self.movies
            .binary_search_by_key(&movie_seq, |m| m.movie_seq)
            .ok()
            .map(|i| &self.movies[i])
    }
}

/// Scores movies for a user against one factor store
#[derive(Debug, Clone, Copy)]
pub struct CollaborativeEngine {
    recency_weight: f32,
    limit: usize,
}

impl CollaborativeEngine {
    pub fn new(recency_weight: f32, limit: usize) -> Self {
        Self {
            recency_weight,
            limit,
        }
    }

    /// Ranks unseen movies for `user_seq`, blending factor affinity and recency
    ///
    /// Users without factors get the popularity list instead.
    pub fn recommend(&self, store: &FactorStore, user_seq: UserSeq) -> Vec<MovieResponse> {
        let Some(user) = store.user(user_seq) else {
            tracing::debug!(user_seq, "Cold-start user, serving popularity fallback");
            return self.popular(store);
        };

        let seen = store.rated.get(&user_seq);
        let w = self.recency_weight;

        let mut scored: Vec<(&MovieFactor, f32)> = store
            .movies
            .iter()
            .filter(|m| seen.map_or(true, |s| !s.contains(&m.movie_seq)))
            .map(|m| {
                let affinity = dot(&user.vector, &m.vector);
                (m, (1.0 - w) * affinity + w * m.recency)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.movie_seq.cmp(&b.0.movie_seq))
        });

        scored
            .into_iter()
            .take(self.limit)
            .map(|(m, _)| MovieResponse::new(m.title.as_str(), m.year))
            .collect()
    }

    /// Most-reviewed movies, weighted toward recent activity
    pub fn popular(&self, store: &FactorStore) -> Vec<MovieResponse> {
        store
            .popularity
            .iter()
            .take(self.limit)
            .map(|&i| &store.movies[i])
            .map(|m| MovieResponse::new(m.title.as_str(), m.year))
            .collect()
    }
}

/// SGD matrix factorisation over mean-centred ratings
#[derive(Debug, Clone)]
pub struct FactorTrainer {
    dim: usize,
    epochs: usize,
    half_life_days: f32,
    sentiment_weight: f32,
}

impl FactorTrainer {
    /// Trains on star ratings alone until `with_sentiment_weight` says otherwise
    pub fn new(dim: usize, epochs: usize, half_life_days: f32) -> Self {
        Self {
            dim,
            epochs,
            half_life_days,
            sentiment_weight: 0.0,
        }
    }

    /// Share of the training target taken by the review's sentiment score (0.0..=1.0)
    pub fn with_sentiment_weight(mut self, weight: f32) -> Self {
        self.sentiment_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// `(1 - w) * rating + w * sentiment * RATING_SCALE`; unscored reviews keep their rating
    fn target(&self, rating: f32, sentiment: Option<f32>) -> f32 {
        match sentiment {
            Some(score) => {
                let w = self.sentiment_weight;
                (1.0 - w) * rating + w * score.clamp(0.0, 1.0) * RATING_SCALE
            }
            None => rating,
        }
    }

    /// Trains a factor store; `now` anchors the recency weights
    pub fn train(&self, corpus: &TrainingCorpus, now: DateTime<Utc>) -> AppResult<FactorStore> {
        if self.dim == 0 {
            return Err(AppError::Training("Factor dimension must be positive".to_string()));
        }

        // Latest review wins for a repeated (user, movie) pair
        let mut latest: HashMap<(UserSeq, MovieSeq), Sample> = HashMap::new();
        for r in &corpus.ratings {
            let sample = Sample {
                rating: r.rating,
                target: self.target(r.rating, r.sentiment_score),
                at: r.created_at,
            };
            latest
                .entry((r.user_seq, r.movie_seq))
                .and_modify(|e| {
                    if r.created_at >= e.at {
                        *e = sample;
                    }
                })
                .or_insert(sample);
        }

        let mut ratings: Vec<((UserSeq, MovieSeq), Sample)> = latest.into_iter().collect();
        ratings.sort_by_key(|(key, _)| *key);

        let mut movies: Vec<MovieFactor> = corpus
            .movies
            .iter()
            .map(|m| MovieFactor {
                movie_seq: m.movie_seq,
                title: m.title.clone(),
                year: m.year,
                vector: self.init_vector("movie", m.movie_seq),
                recency: 0.0,
                interactions: 0,
            })
            .collect();
        movies.sort_by_key(|m| m.movie_seq);
        movies.dedup_by_key(|m| m.movie_seq);

        let position: HashMap<MovieSeq, usize> = movies
            .iter()
            .enumerate()
            .map(|(i, m)| (m.movie_seq, i))
            .collect();

        // Reviews of movies missing from the catalogue cannot be recommended back
        ratings.retain(|((_, movie), _)| position.contains_key(movie));

        let mut users: HashMap<UserSeq, UserFactor> = HashMap::new();
        let mut rated: HashMap<UserSeq, HashSet<MovieSeq>> = HashMap::new();
        let mut last_review: HashMap<MovieSeq, DateTime<Utc>> = HashMap::new();

        for ((user, movie), Sample { at, .. }) in &ratings {
            users.entry(*user).or_insert_with(|| UserFactor {
                vector: self.init_vector("user", *user),
            });
            rated.entry(*user).or_default().insert(*movie);
            last_review
                .entry(*movie)
                .and_modify(|t| *t = (*t).max(*at))
                .or_insert(*at);
            movies[position[movie]].interactions += 1;
        }

        // Centred on the star-rating mean, so sentiment moves targets off that baseline
        let mean = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|(_, s)| s.rating).sum::<f32>() / ratings.len() as f32
        };

        for _ in 0..self.epochs {
            for ((user, movie), Sample { target, .. }) in &ratings {
                let (Some(u), Some(&mi)) = (users.get_mut(user), position.get(movie)) else {
                    continue;
                };
                let m = &mut movies[mi];
                let error = (target - mean) - dot(&u.vector, &m.vector);
                for k in 0..self.dim {
                    let uk = u.vector[k];
                    let mk = m.vector[k];
                    u.vector[k] += LEARNING_RATE * (error * mk - REGULARIZATION * uk);
                    m.vector[k] += LEARNING_RATE * (error * uk - REGULARIZATION * mk);
                }
            }
        }

        for m in &mut movies {
            if let Some(at) = last_review.get(&m.movie_seq) {
                m.recency = self.recency(now, *at);
            }
        }

        let mut popularity: Vec<usize> = (0..movies.len())
            .filter(|&i| movies[i].interactions > 0)
            .collect();
        let pop_score = |m: &MovieFactor| m.interactions as f32 * (0.5 + 0.5 * m.recency);
        popularity.sort_by(|&a, &b| {
            pop_score(&movies[b])
                .total_cmp(&pop_score(&movies[a]))
                .then_with(|| movies[a].movie_seq.cmp(&movies[b].movie_seq))
        });

        tracing::debug!(
            users = users.len(),
            movies = movies.len(),
            ratings = ratings.len(),
            "Factor store trained"
        );

        Ok(FactorStore {
            dim: self.dim,
            built_at: now,
            users,
            movies,
            rated,
            popularity,
        })
    }

    fn recency(&self, now: DateTime<Utc>, at: DateTime<Utc>) -> f32 {
        let age_days = (now - at).num_seconds().max(0) as f32 / 86_400.0;
        0.5f32.powf(age_days / self.half_life_days)
    }

    fn init_vector(&self, kind: &str, seq: i64) -> Vec<f32> {
        let mut state = fnv1a(kind.as_bytes()) ^ (seq as u64).wrapping_mul(0x2545_f491_4f6c_dd1d);
        (0..self.dim)
            .map(|_| {
                let unit = (splitmix64(&mut state) >> 40) as f32 / (1u64 << 24) as f32;
                (unit - 0.5) * 2.0 * INIT_SCALE
            })
            .collect()
    }
}

/// Latest review of one (user, movie) pair
#[derive(Debug, Clone, Copy)]
struct Sample {
    rating: f32,
    target: f32,
    at: DateTime<Utc>,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieRecord, RatingRecord};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn movie(seq: i64, title: &str) -> MovieRecord {
        MovieRecord {
            movie_seq: seq,
            title: title.to_string(),
            year: 2000 + seq as i32,
            genre: None,
            actors: vec![],
        }
    }

    fn rating(user: i64, movie: i64, value: f32, days_ago: i64) -> RatingRecord {
        RatingRecord {
            user_seq: user,
            movie_seq: movie,
            rating: value,
            sentiment_score: None,
            created_at: now() - Duration::days(days_ago),
        }
    }

    fn corpus() -> TrainingCorpus {
        TrainingCorpus {
            movies: vec![movie(1, "A"), movie(2, "B"), movie(3, "C"), movie(4, "D")],
            ratings: vec![
                rating(1, 1, 5.0, 1),
                rating(1, 2, 5.0, 2),
                rating(2, 1, 5.0, 3),
                rating(2, 2, 4.0, 3),
                rating(2, 3, 5.0, 1),
                rating(3, 4, 2.0, 300),
                rating(3, 3, 4.0, 2),
            ],
        }
    }

    fn trained() -> FactorStore {
        FactorTrainer::new(8, 50, 30.0).train(&corpus(), now()).unwrap()
    }

    #[test]
    fn test_known_user_excludes_rated_movies() {
        let store = trained();
        let engine = CollaborativeEngine::new(0.2, 10);

        let recs = engine.recommend(&store, 1);

        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|m| m.movie_title != "A" && m.movie_title != "B"));
    }

    #[test]
    fn test_cold_start_user_gets_popularity_fallback() {
        let store = trained();
        let engine = CollaborativeEngine::new(0.2, 10);

        let recs = engine.recommend(&store, 999);

        // A, B and C have two reviews each; C and A share the most recent activity
        assert_eq!(recs.len(), 4);
        assert_eq!(recs.last().unwrap().movie_title, "D");
    }

    #[test]
    fn test_cold_start_on_empty_store_is_empty() {
        let store = FactorStore::empty(8);
        let engine = CollaborativeEngine::new(0.2, 10);
        assert!(engine.recommend(&store, 1).is_empty());
    }

    #[test]
    fn test_recency_decides_when_affinity_is_ignored() {
        let store = trained();
        let engine = CollaborativeEngine::new(1.0, 10);

        // User 1 has seen A and B; C was reviewed a day ago, D three hundred days ago
        let recs = engine.recommend(&store, 1);

        assert_eq!(
            recs,
            vec![MovieResponse::new("C", 2003), MovieResponse::new("D", 2004)]
        );
    }

    #[test]
    fn test_recency_halves_per_half_life() {
        let trainer = FactorTrainer::new(4, 1, 30.0);
        let weight = trainer.recency(now(), now() - Duration::days(30));
        assert!((weight - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_ties_break_by_movie_seq() {
        let corpus = TrainingCorpus {
            movies: vec![movie(3, "C"), movie(1, "A"), movie(2, "B")],
            ratings: vec![],
        };
        let mut store = FactorTrainer::new(4, 0, 30.0).train(&corpus, now()).unwrap();
        store.users.insert(
            7,
            UserFactor {
                vector: vec![0.0; 4],
            },
        );

        let recs = CollaborativeEngine::new(0.5, 10).recommend(&store, 7);

        let titles: Vec<_> = recs.iter().map(|m| m.movie_title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_limit_truncates() {
        let store = trained();
        let recs = CollaborativeEngine::new(0.2, 1).recommend(&store, 999);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_training_is_deterministic() {
        let a = trained();
        let b = trained();
        assert_eq!(a.user(1).unwrap().vector, b.user(1).unwrap().vector);
        assert_eq!(a.movie(3).unwrap().vector, b.movie(3).unwrap().vector);
    }

    #[test]
    fn test_sentiment_shifts_factors_when_weighted() {
        let with_sentiment = |score: f32| {
            let mut corpus = corpus();
            for r in &mut corpus.ratings {
                r.sentiment_score = Some(score);
            }
            FactorTrainer::new(8, 50, 30.0)
                .with_sentiment_weight(0.5)
                .train(&corpus, now())
                .unwrap()
        };

        let sour = with_sentiment(0.0);
        let glowing = with_sentiment(1.0);

        assert_ne!(sour.user(1).unwrap().vector, glowing.user(1).unwrap().vector);
        assert_ne!(sour.movie(3).unwrap().vector, glowing.movie(3).unwrap().vector);
    }

    #[test]
    fn test_sentiment_ignored_at_zero_weight() {
        let mut scored = corpus();
        for r in &mut scored.ratings {
            r.sentiment_score = Some(0.0);
        }

        let plain = FactorTrainer::new(8, 50, 30.0).train(&corpus(), now()).unwrap();
        let scored = FactorTrainer::new(8, 50, 30.0).train(&scored, now()).unwrap();

        assert_eq!(plain.user(1).unwrap().vector, scored.user(1).unwrap().vector);
    }

    #[test]
    fn test_target_blends_rating_and_sentiment() {
        let trainer = FactorTrainer::new(4, 1, 30.0).with_sentiment_weight(0.4);
        assert!((trainer.target(4.0, Some(1.0)) - 4.4).abs() < 1e-5);
        assert!((trainer.target(4.0, Some(0.0)) - 2.4).abs() < 1e-5);
        assert_eq!(trainer.target(4.0, None), 4.0);
    }

    #[test]
    fn test_reviews_of_unknown_movies_are_ignored() {
        let mut corpus = corpus();
        corpus.ratings.push(rating(9, 42, 5.0, 1));
        let store = FactorTrainer::new(4, 5, 30.0).train(&corpus, now()).unwrap();
        assert!(store.user(9).is_none());
        assert_eq!(store.movie_count(), 4);
    }
}
