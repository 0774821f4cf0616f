use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::SentimentScorer;

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    scores: Vec<f32>,
}

/// Sentiment model served over HTTP
///
/// POSTs `{"texts": [...]}` and expects `{"scores": [...]}` back in the same order.
#[derive(Clone)]
pub struct RemoteScorer {
    http_client: HttpClient,
    url: String,
}

impl RemoteScorer {
    pub fn new(url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            url,
        }
    }
}

#[async_trait::async_trait]
impl SentimentScorer for RemoteScorer {
    async fn score(&self, texts: Vec<String>) -> AppResult<Vec<f32>> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&ScoreRequest { texts: &texts })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body,
                batch = texts.len(),
                "Sentiment model request failed"
            );
            return Err(AppError::Scoring(format!(
                "Sentiment model returned status {}",
                status
            )));
        }

        let parsed: ScoreResponse = response.json().await?;
        Ok(parsed.scores)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
