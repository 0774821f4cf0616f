use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{
        MovieRecord, MovieSeq, NewMovieUpdateRequest, RatingRecord, ReviewAction, ReviewEvent,
        TrainingCorpus, WordCloudRequest,
    },
    services::retraining::CorpusSource,
};

/// Relational store behind the feedback endpoints and the retraining corpus
///
/// Every batch write runs in one transaction: either all rows of a request land,
/// or none do.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies CREATE/DELETE review events in request order
    pub async fn apply_review_events(&self, events: &[ReviewEvent]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        match Self::write_review_events(&mut tx, events).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(events = events.len(), "Review events committed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, events = events.len(), "Review events rolled back");
                roll_back(tx).await;
                Err(e)
            }
        }
    }

    async fn write_review_events(
        tx: &mut Transaction<'_, Sqlite>,
        events: &[ReviewEvent],
    ) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();

        for event in events {
            match event.action {
                ReviewAction::Create => {
                    sqlx::query(
                        r#"
                        INSERT INTO review_info
                            (review_seq, user_seq, movie_seq, review_rating, sentiment_score, created_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(event.review_seq)
                    .bind(event.user_seq)
                    .bind(event.movie_seq)
                    .bind(event.rating)
                    .bind(event.sentiment_score)
                    .bind(&now)
                    .execute(&mut **tx)
                    .await?;
                }
                ReviewAction::Delete => {
                    sqlx::query("DELETE FROM review_info WHERE review_seq = ?")
                        .bind(event.review_seq)
                        .execute(&mut **tx)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Stores word-cloud text; blank entries are skipped. Returns rows written.
    pub async fn insert_word_cloud(&self, entries: &[WordCloudRequest]) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for entry in entries {
            let Some(content) = entry.content.as_deref().filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            if let Err(e) = sqlx::query("INSERT INTO wordcloud (movie_seq, content) VALUES (?, ?)")
                .bind(entry.movie_seq)
                .bind(content)
                .execute(&mut *tx)
                .await
            {
                tracing::error!(error = %e, "Word cloud insert failed, rolling back");
                roll_back(tx).await;
                return Err(e.into());
            }
            written += 1;
        }

        tx.commit().await?;
        tracing::info!(written, skipped = entries.len() - written, "Word cloud text stored");
        Ok(written)
    }

    /// Stores new movies together with their cast
    pub async fn insert_movies(&self, movies: &[NewMovieUpdateRequest]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        match Self::write_movies(&mut tx, movies).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(movies = movies.len(), "Movies committed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, movies = movies.len(), "Movie insert rolled back");
                roll_back(tx).await;
                Err(e)
            }
        }
    }

    async fn write_movies(
        tx: &mut Transaction<'_, Sqlite>,
        movies: &[NewMovieUpdateRequest],
    ) -> AppResult<()> {
        for movie in movies {
            sqlx::query(
                "INSERT INTO movie_info (movie_seq, movie_title, movie_year, genre) VALUES (?, ?, ?, ?)",
            )
            .bind(movie.movie_seq)
            .bind(&movie.movie_title)
            .bind(movie.movie_year)
            .bind(&movie.genre)
            .execute(&mut **tx)
            .await?;

            for actor in &movie.actors {
                sqlx::query("INSERT INTO movie_actor (movie_seq, actor_name) VALUES (?, ?)")
                    .bind(movie.movie_seq)
                    .bind(&actor.actor_name)
                    .execute(&mut **tx)
                    .await?;
            }
        }

        Ok(())
    }

    /// All word-cloud text, grouped by movie in ascending order
    pub async fn load_word_cloud_texts(&self) -> AppResult<Vec<(MovieSeq, Vec<String>)>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT movie_seq, content FROM wordcloud ORDER BY movie_seq, rowid")
                .fetch_all(&self.pool)
                .await?;

        let mut grouped: Vec<(MovieSeq, Vec<String>)> = Vec::new();
        for (movie_seq, content) in rows {
            match grouped.last_mut() {
                Some((seq, texts)) if *seq == movie_seq => texts.push(content),
                _ => grouped.push((movie_seq, vec![content])),
            }
        }

        Ok(grouped)
    }

    pub async fn review_count(&self) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM review_info")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl CorpusSource for Store {
    async fn load_corpus(&self) -> AppResult<TrainingCorpus> {
        let movie_rows: Vec<(i64, String, i64, Option<String>)> = sqlx::query_as(
            "SELECT movie_seq, movie_title, movie_year, genre FROM movie_info ORDER BY movie_seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let actor_rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT movie_seq, actor_name FROM movie_actor ORDER BY movie_seq, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let review_rows: Vec<(i64, i64, f64, Option<f64>, String)> = sqlx::query_as(
            r#"
            SELECT user_seq, movie_seq, review_rating, sentiment_score, created_at
            FROM review_info
            ORDER BY review_seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut actors: HashMap<MovieSeq, Vec<String>> = HashMap::new();
        for (movie_seq, actor_name) in actor_rows {
            actors.entry(movie_seq).or_default().push(actor_name);
        }

        let movies = movie_rows
            .into_iter()
            .map(|(movie_seq, title, year, genre)| MovieRecord {
                movie_seq,
                title,
                year: year as i32,
                genre,
                actors: actors.remove(&movie_seq).unwrap_or_default(),
            })
            .collect();

        let ratings = review_rows
            .into_iter()
            .map(|(user_seq, movie_seq, rating, sentiment, created_at)| {
                Ok(RatingRecord {
                    user_seq,
                    movie_seq,
                    rating: rating as f32,
                    sentiment_score: sentiment.map(|s| s as f32),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(TrainingCorpus { movies, ratings })
    }
}

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS`
/// Ends a failed transaction; the caller keeps reporting the write error
async fn roll_back(tx: Transaction<'_, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| AppError::Internal(format!("Invalid review timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::create_pool, models::ActorRequest};

    async fn test_store() -> Store {
        Store::new(create_pool("sqlite::memory:").await.unwrap())
    }

    fn event(review_seq: i64, action: ReviewAction) -> ReviewEvent {
        ReviewEvent {
            review_seq,
            user_seq: 1,
            movie_seq: 10,
            rating: 4.5,
            sentiment_score: 0.8,
            action,
        }
    }

    fn new_movie(seq: i64, title: &str, actors: &[&str]) -> NewMovieUpdateRequest {
        NewMovieUpdateRequest {
            movie_seq: seq,
            movie_title: title.to_string(),
            movie_year: 2010,
            genre: Some("Sci-Fi".to_string()),
            actors: actors
                .iter()
                .map(|a| ActorRequest {
                    actor_name: a.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_then_delete_leaves_no_row() {
        let store = test_store().await;

        store
            .apply_review_events(&[event(7, ReviewAction::Create), event(7, ReviewAction::Delete)])
            .await
            .unwrap();

        assert_eq!(store.review_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back_as_unit() {
        let store = test_store().await;

        // Second CREATE violates the primary key
        let result = store
            .apply_review_events(&[event(1, ReviewAction::Create), event(1, ReviewAction::Create)])
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(store.review_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_word_cloud_skips_blank_content() {
        let store = test_store().await;
        let entries = vec![
            WordCloudRequest {
                movie_seq: 1,
                content: Some("great dream heist".to_string()),
            },
            WordCloudRequest {
                movie_seq: 1,
                content: Some("   ".to_string()),
            },
            WordCloudRequest {
                movie_seq: 2,
                content: None,
            },
        ];

        assert_eq!(store.insert_word_cloud(&entries).await.unwrap(), 1);

        let texts = store.load_word_cloud_texts().await.unwrap();
        assert_eq!(texts, vec![(1, vec!["great dream heist".to_string()])]);
    }

    #[tokio::test]
    async fn test_load_corpus_joins_actors_and_reviews() {
        let store = test_store().await;
        store
            .insert_movies(&[
                new_movie(10, "Inception", &["Leonardo DiCaprio", "Tom Hardy"]),
                new_movie(11, "Frozen", &[]),
            ])
            .await
            .unwrap();
        store
            .apply_review_events(&[event(1, ReviewAction::Create)])
            .await
            .unwrap();

        let corpus = store.load_corpus().await.unwrap();

        assert_eq!(corpus.movies.len(), 2);
        assert_eq!(corpus.movies[0].actors, vec!["Leonardo DiCaprio", "Tom Hardy"]);
        assert!(corpus.movies[1].actors.is_empty());
        assert_eq!(corpus.ratings.len(), 1);
        assert_eq!(corpus.ratings[0].sentiment_score, Some(0.8));
    }

    #[tokio::test]
    async fn test_failed_movie_insert_reports_the_write_error() {
        let store = test_store().await;
        store.insert_movies(&[new_movie(10, "Inception", &[])]).await.unwrap();

        let result = store.insert_movies(&[new_movie(10, "Again", &[])]).await;

        match result {
            Err(AppError::Database(sqlx::Error::Database(db))) => {
                assert!(db.is_unique_violation())
            }
            other => panic!("expected the constraint violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_movie_rolls_back_cast() {
        let store = test_store().await;
        store.insert_movies(&[new_movie(10, "Inception", &[])]).await.unwrap();

        let result = store
            .insert_movies(&[new_movie(11, "Frozen", &["Kristen Bell"]), new_movie(10, "Again", &[])])
            .await;

        assert!(result.is_err());
        let corpus = store.load_corpus().await.unwrap();
        assert_eq!(corpus.movies.len(), 1);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("2024-01-01 12:30:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
