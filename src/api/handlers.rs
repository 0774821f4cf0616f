use std::collections::HashSet;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cached;
use crate::db::CacheKey;
use crate::error::{AppError, AppResult};
use crate::middleware::request_id::RequestId;
use crate::models::{
    CollaboMovieRequest, ContentMovieRequest, MovieResponse, NewMovieUpdateRequest, ReviewEvent,
    SentimentResult, SentimentReviewEvent, Token, WordCloud, WordCloudRequest,
};
use crate::services::TriggerOutcome;

use super::extract::ValidJson;
use super::state::{AppState, RESPONSE_CACHE_TTL};

#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    pub status: TriggerOutcome,
    /// Generation serving requests when the trigger was accepted
    pub generation: u64,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Sentiment analysis API is running" }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let generation = state.registry.current();
    let summary = state.retraining.summary();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "generation": generation.id(),
            "builtAt": generation.built_at(),
            "retraining": {
                "runs": summary.runs,
                "failures": summary.failures,
                "lastPublished": summary.last_published,
                "lastError": summary.last_error,
            },
        })),
    )
}

/// Titles similar to the given actors and titles
pub async fn content(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidJson(request): ValidJson<Vec<ContentMovieRequest>>,
) -> AppResult<Json<Vec<MovieResponse>>> {
    let mut tokens = request
        .into_iter()
        .map(Token::try_from)
        .collect::<AppResult<Vec<Token>>>()?;
    let mut seen = HashSet::new();
    tokens.retain(|token| seen.insert(token.clone()));

    // One generation for the whole request, even if a publish lands mid-way
    let generation = state.registry.current();
    let key = CacheKey::content(&generation, tokens.iter().map(Token::to_string));
    tracing::info!(
        request_id = %request_id,
        generation = generation.id(),
        queries = tokens.len(),
        "Content recommendation"
    );

    let similarity = state.similarity;
    let movies: Vec<MovieResponse> = cached!(state.cache.as_deref(), key, RESPONSE_CACHE_TTL, async move {
        tokio::task::spawn_blocking(move || similarity.rank(generation.embedding(), &tokens))
            .await
            .map_err(AppError::from)
    })?;

    Ok(Json(movies))
}

/// Collaborative recommendations for one user
pub async fn collabo(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidJson(request): ValidJson<CollaboMovieRequest>,
) -> AppResult<Json<Vec<MovieResponse>>> {
    let user_seq = request.user_seq();
    let generation = state.registry.current();
    let key = CacheKey::collabo(&generation, user_seq);
    tracing::info!(
        request_id = %request_id,
        generation = generation.id(),
        user_seq,
        "Collaborative recommendation"
    );

    let collaborative = state.collaborative;
    let movies: Vec<MovieResponse> = cached!(state.cache.as_deref(), key, RESPONSE_CACHE_TTL, async move {
        tokio::task::spawn_blocking(move || collaborative.recommend(generation.factors(), user_seq))
            .await
            .map_err(AppError::from)
    })?;

    Ok(Json(movies))
}

pub async fn sentiment_score(
    State(state): State<AppState>,
    ValidJson(reviews): ValidJson<Vec<SentimentReviewEvent>>,
) -> AppResult<Json<Vec<SentimentResult>>> {
    tracing::info!(
        reviews = reviews.len(),
        batch_size = state.batcher.batch_size(),
        "Scoring review sentiment"
    );
    let results = state.batcher.score_reviews(&reviews).await?;
    Ok(Json(results))
}

/// Applies review feedback; the whole batch commits or none of it does
pub async fn update_model(
    State(state): State<AppState>,
    ValidJson(events): ValidJson<Vec<ReviewEvent>>,
) -> AppResult<Json<Value>> {
    state.store.apply_review_events(&events).await?;
    Ok(Json(json!({ "applied": events.len() })))
}

/// Schedules a rebuild of both models and returns immediately
pub async fn word2vec_update(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<RetrainResponse>)> {
    let status = state.retraining.trigger()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RetrainResponse {
            status,
            generation: state.registry.current().id(),
        }),
    ))
}

pub async fn word_cloud(
    State(state): State<AppState>,
    ValidJson(entries): ValidJson<Vec<WordCloudRequest>>,
) -> AppResult<Json<Value>> {
    let stored = state.store.insert_word_cloud(&entries).await?;
    Ok(Json(json!({ "stored": stored })))
}

/// Recomputes word frequencies for every movie with stored text
pub async fn wordcloud_update(State(state): State<AppState>) -> AppResult<Json<Vec<WordCloud>>> {
    let texts = state.store.load_word_cloud_texts().await?;
    let builder = state.word_clouds.clone();
    let clouds = tokio::task::spawn_blocking(move || builder.build(&texts)).await?;
    Ok(Json(clouds))
}

/// Stores new movies with their cast; they become recommendable after the next rebuild
pub async fn movie_update(
    State(state): State<AppState>,
    ValidJson(movies): ValidJson<Vec<NewMovieUpdateRequest>>,
) -> AppResult<Json<Value>> {
    state.store.insert_movies(&movies).await?;
    Ok(Json(json!({ "inserted": movies.len() })))
}
