use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub mod token;

pub use token::Token;

/// Movie identifier in the relational store
pub type MovieSeq = i64;
/// User identifier in the relational store
pub type UserSeq = i64;
/// Review identifier in the relational store
pub type ReviewSeq = i64;

// ============================================================================
// Recommendation API Types
// ============================================================================

/// One item of a content-similarity request
///
/// Exactly one of `actor_name` or (`movie_title` + `year`) must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMovieRequest {
    #[serde(default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl TryFrom<ContentMovieRequest> for Token {
    type Error = AppError;

    fn try_from(request: ContentMovieRequest) -> Result<Self, Self::Error> {
        match (request.actor_name, request.movie_title, request.year) {
            (Some(actor), None, None) => Ok(Token::Actor(actor)),
            (None, Some(title), Some(year)) => Ok(Token::title(title, year)),
            (None, Some(_), None) => Err(AppError::InvalidInput(
                "movieTitle requires a year".to_string(),
            )),
            (None, None, _) => Err(AppError::InvalidInput(
                "Each item needs an actorName or a movieTitle with year".to_string(),
            )),
            (Some(_), _, _) => Err(AppError::InvalidInput(
                "actorName cannot be combined with movieTitle or year".to_string(),
            )),
        }
    }
}

/// Collaborative-filtering request: `{"userSeq": 5}` or a bare `5`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CollaboMovieRequest {
    Wrapped {
        #[serde(rename = "userSeq")]
        user_seq: UserSeq,
    },
    Bare(UserSeq),
}

impl CollaboMovieRequest {
    pub fn user_seq(&self) -> UserSeq {
        match self {
            CollaboMovieRequest::Wrapped { user_seq } | CollaboMovieRequest::Bare(user_seq) => {
                *user_seq
            }
        }
    }
}

/// A recommended movie as returned by `/content` and `/collabo`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieResponse {
    pub movie_title: String,
    pub movie_year: i32,
}

impl MovieResponse {
    pub fn new(title: impl Into<String>, year: i32) -> Self {
        Self {
            movie_title: title.into(),
            movie_year: year,
        }
    }
}

// ============================================================================
// Sentiment & Feedback Types
// ============================================================================

/// Review submitted for sentiment scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentReviewEvent {
    pub review_seq: ReviewSeq,
    pub user_seq: UserSeq,
    pub movie_seq: MovieSeq,
    pub review_text: String,
    pub rating: f32,
}

/// Sentiment score for one review, correlated by `review_seq`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    pub review_seq: ReviewSeq,
    pub user_seq: UserSeq,
    pub movie_seq: MovieSeq,
    pub rating: f32,
    pub sentiment_score: f32,
}

impl SentimentResult {
    pub fn from_event(event: &SentimentReviewEvent, sentiment_score: f32) -> Self {
        Self {
            review_seq: event.review_seq,
            user_seq: event.user_seq,
            movie_seq: event.movie_seq,
            rating: event.rating,
            sentiment_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    Create,
    Delete,
}

/// Feedback event applied to `review_info`; a deletion is a new event, never an edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub review_seq: ReviewSeq,
    pub user_seq: UserSeq,
    pub movie_seq: MovieSeq,
    pub rating: f32,
    pub sentiment_score: f32,
    pub action: ReviewAction,
}

/// Free text attached to a movie for word clouds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCloudRequest {
    pub movie_seq: MovieSeq,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    pub actor_name: String,
}

/// New movie with its cast
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovieUpdateRequest {
    pub movie_seq: MovieSeq,
    pub movie_title: String,
    pub movie_year: i32,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub actors: Vec<ActorRequest>,
}

/// Most frequent words for one movie
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCloud {
    pub movie_seq: MovieSeq,
    pub words: Vec<WordCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: u32,
}

// ============================================================================
// Training Corpus Types
// ============================================================================

/// A movie with its cast, as read back from the store for training
#[derive(Debug, Clone, PartialEq)]
pub struct MovieRecord {
    pub movie_seq: MovieSeq,
    pub title: String,
    pub year: i32,
    pub genre: Option<String>,
    pub actors: Vec<String>,
}

impl MovieRecord {
    pub fn title_token(&self) -> Token {
        Token::title(self.title.clone(), self.year)
    }
}

/// One persisted review used as an interaction by the collaborative model
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub user_seq: UserSeq,
    pub movie_seq: MovieSeq,
    pub rating: f32,
    pub sentiment_score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// Everything a retraining run consumes
#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    pub movies: Vec<MovieRecord>,
    pub ratings: Vec<RatingRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(actor: Option<&str>, title: Option<&str>, year: Option<i32>) -> ContentMovieRequest {
        ContentMovieRequest {
            actor_name: actor.map(str::to_string),
            movie_title: title.map(str::to_string),
            year,
        }
    }

    #[test]
    fn test_content_request_actor_to_token() {
        let token = Token::try_from(content(Some("Tom Hardy"), None, None)).unwrap();
        assert_eq!(token, Token::actor("Tom Hardy"));
    }

    #[test]
    fn test_content_request_title_to_token() {
        let token = Token::try_from(content(None, Some("Inception"), Some(2010))).unwrap();
        assert_eq!(token.to_string(), "Inception^2010T");
    }

    #[test]
    fn test_content_request_rejects_both_kinds() {
        let result = Token::try_from(content(Some("Tom Hardy"), Some("Inception"), Some(2010)));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_content_request_rejects_missing_year() {
        let result = Token::try_from(content(None, Some("Inception"), None));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_content_request_rejects_empty_item() {
        let result = Token::try_from(content(None, None, None));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_collabo_request_accepts_both_shapes() {
        let wrapped: CollaboMovieRequest = serde_json::from_str(r#"{"userSeq": 5}"#).unwrap();
        let bare: CollaboMovieRequest = serde_json::from_str("5").unwrap();
        assert_eq!(wrapped.user_seq(), 5);
        assert_eq!(bare.user_seq(), 5);
    }

    #[test]
    fn test_review_action_serialization() {
        assert_eq!(serde_json::to_string(&ReviewAction::Create).unwrap(), "\"CREATE\"");
        let action: ReviewAction = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(action, ReviewAction::Delete);
    }

    #[test]
    fn test_movie_response_uses_camel_case() {
        let json = serde_json::to_value(MovieResponse::new("Inception", 2010)).unwrap();
        assert_eq!(json["movieTitle"], "Inception");
        assert_eq!(json["movieYear"], 2010);
    }
}
