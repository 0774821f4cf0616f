use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route("/content", post(handlers::content))
        .route("/collabo", post(handlers::collabo))
        // Sentiment and feedback
        .route("/sentiment_score", post(handlers::sentiment_score))
        .route("/update_model", post(handlers::update_model))
        .route("/word2vec_update", post(handlers::word2vec_update))
        // Catalog and word clouds
        .route("/movie_update", post(handlers::movie_update))
        .route("/word_cloud", post(handlers::word_cloud))
        .route("/wordcloud_update", post(handlers::wordcloud_update))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
