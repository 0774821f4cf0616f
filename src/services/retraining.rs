//! Out-of-band model rebuilds.
//!
//! A single worker task owns every rebuild. Triggers go through a channel with
//! room for one pending request: a trigger that arrives while another is already
//! pending is coalesced into it, and a trigger that arrives during a build queues
//! exactly one follow-up build so feedback stored mid-build is not missed. Two
//! builds never run at the same time.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::TrainingCorpus,
    services::{
        embedding::EmbeddingTrainer,
        factors::FactorTrainer,
        registry::{ModelGeneration, ModelRegistry},
    },
};

/// Where retraining reads its corpus from
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CorpusSource: Send + Sync {
    async fn load_corpus(&self) -> AppResult<TrainingCorpus>;
}

/// Trains both models of a generation from one corpus snapshot
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    embedding: EmbeddingTrainer,
    factors: FactorTrainer,
}

impl ModelBuilder {
    pub fn new(embedding: EmbeddingTrainer, factors: FactorTrainer) -> Self {
        Self { embedding, factors }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            EmbeddingTrainer::new(config.embedding_dim, config.embedding_seed),
            FactorTrainer::new(
                config.factor_dim,
                config.factor_epochs,
                config.recency_half_life_days,
            )
            .with_sentiment_weight(config.sentiment_weight),
        )
    }

    pub fn build(&self, id: u64, corpus: &TrainingCorpus) -> AppResult<ModelGeneration> {
        let embedding = self.embedding.train(corpus)?;
        let factors = self.factors.train(corpus, Utc::now())?;
        Ok(ModelGeneration::new(id, embedding, factors))
    }

    /// Loads the corpus and trains off the async runtime
    pub async fn build_from(&self, source: &dyn CorpusSource, id: u64) -> AppResult<ModelGeneration> {
        let corpus = source.load_corpus().await?;
        tracing::info!(
            generation = id,
            movies = corpus.movies.len(),
            ratings = corpus.ratings.len(),
            "Training model generation"
        );

        let builder = self.clone();
        tokio::task::spawn_blocking(move || builder.build(id, &corpus)).await?
    }
}

/// Builds generation 1 and wraps it in a registry; any failure is fatal to startup
pub async fn bootstrap(source: &dyn CorpusSource, builder: &ModelBuilder) -> AppResult<ModelRegistry> {
    let initial = builder.build_from(source, 1).await?;
    Ok(ModelRegistry::new(initial))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// A new build was queued
    Scheduled,
    /// A build was already pending and will pick up this request's data
    Coalesced,
}

/// Progress of the worker, for health reporting and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrainingSummary {
    pub runs: u64,
    pub failures: u64,
    pub last_published: Option<u64>,
    pub last_error: Option<String>,
}

/// Cheap handle used by request handlers to request a rebuild
#[derive(Clone)]
pub struct RetrainingPipeline {
    trigger_tx: mpsc::Sender<()>,
    summary_rx: watch::Receiver<RetrainingSummary>,
}

/// Stops the retraining worker once its current build finishes
pub struct RetrainingHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl RetrainingHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Retraining worker panicked");
        }
    }
}

impl RetrainingPipeline {
    pub fn spawn(
        source: Arc<dyn CorpusSource>,
        builder: ModelBuilder,
        registry: ModelRegistry,
    ) -> (Self, RetrainingHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (summary_tx, summary_rx) = watch::channel(RetrainingSummary::default());

        let task = tokio::spawn(Self::worker(
            source,
            builder,
            registry,
            trigger_rx,
            shutdown_rx,
            summary_tx,
        ));

        (
            Self {
                trigger_tx,
                summary_rx,
            },
            RetrainingHandle { shutdown_tx, task },
        )
    }

    /// Requests a rebuild without waiting for it
    pub fn trigger(&self) -> AppResult<TriggerOutcome> {
        match self.trigger_tx.try_send(()) {
            Ok(()) => {
                tracing::info!("Retraining scheduled");
                Ok(TriggerOutcome::Scheduled)
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::info!("Retraining already pending, trigger coalesced");
                Ok(TriggerOutcome::Coalesced)
            }
            Err(mpsc::error::TrySendError::Closed(())) => Err(AppError::Internal(
                "Retraining worker is not running".to_string(),
            )),
        }
    }

    pub fn summary(&self) -> RetrainingSummary {
        self.summary_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RetrainingSummary> {
        self.summary_rx.clone()
    }

    async fn worker(
        source: Arc<dyn CorpusSource>,
        builder: ModelBuilder,
        registry: ModelRegistry,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown_rx: mpsc::Receiver<()>,
        summary_tx: watch::Sender<RetrainingSummary>,
    ) {
        tracing::info!("Retraining worker started");

        loop {
            tokio::select! {
                Some(()) = trigger_rx.recv() => {
                    let id = registry.next_generation_id();
                    let outcome = builder
                        .build_from(source.as_ref(), id)
                        .await
                        .map(|generation| registry.publish(Arc::new(generation)));

                    if let Err(e) = &outcome {
                        tracing::error!(
                            generation = id,
                            error = %e,
                            current = registry.current().id(),
                            "Retraining failed, keeping current generation"
                        );
                    }

                    // Reported after publish, never ahead of the registry
                    summary_tx.send_modify(|summary| {
                        summary.runs += 1;
                        match &outcome {
                            Ok(published) => {
                                if *published {
                                    summary.last_published = Some(id);
                                }
                                summary.last_error = None;
                            }
                            Err(e) => {
                                summary.failures += 1;
                                summary.last_error = Some(e.to_string());
                            }
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Retraining worker stopped");
                    break;
                }
            }
        }
    }
}
