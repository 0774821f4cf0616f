use chrono::{DateTime, Utc};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::services::{embedding::EmbeddingModel, factors::FactorStore};

/// One consistent pair of models, swapped into the registry as a unit
#[derive(Debug)]
pub struct ModelGeneration {
    id: u64,
    /// Unique per build, unlike `id` which restarts with the process
    build_id: Uuid,
    built_at: DateTime<Utc>,
    embedding: Arc<EmbeddingModel>,
    factors: Arc<FactorStore>,
}

impl ModelGeneration {
    pub fn new(id: u64, embedding: EmbeddingModel, factors: FactorStore) -> Self {
        Self {
            id,
            build_id: Uuid::new_v4(),
            built_at: factors.built_at(),
            embedding: Arc::new(embedding),
            factors: Arc::new(factors),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn embedding(&self) -> &EmbeddingModel {
        &self.embedding
    }

    pub fn factors(&self) -> &FactorStore {
        &self.factors
    }
}

/// Process-wide holder of the current model generation
///
/// Can only be created from an already-built generation, so there is no state
/// in which `current()` has nothing to return.
#[derive(Clone)]
pub struct ModelRegistry {
    current: Arc<watch::Sender<Arc<ModelGeneration>>>,
    next_id: Arc<AtomicU64>,
}

impl ModelRegistry {
    pub fn new(initial: ModelGeneration) -> Self {
        let next_id = initial.id() + 1;
        tracing::info!(
            generation = initial.id(),
            vocabulary = initial.embedding().len(),
            users = initial.factors().user_count(),
            "Initial model generation registered"
        );
        let (tx, _) = watch::channel(Arc::new(initial));
        Self {
            current: Arc::new(tx),
            next_id: Arc::new(AtomicU64::new(next_id)),
        }
    }

    /// Latest published generation; never blocks on a publish in progress
    pub fn current(&self) -> Arc<ModelGeneration> {
        self.current.borrow().clone()
    }

    /// Reserves the id for a generation about to be built
    pub fn next_generation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Swaps `generation` in if it is newer than the current one
    ///
    /// Returns whether the swap happened. Re-publishing the current generation, or
    /// publishing one that finished after a newer build, leaves the registry as is.
    pub fn publish(&self, generation: Arc<ModelGeneration>) -> bool {
        let id = generation.id();
        let swapped = self.current.send_if_modified(move |current| {
            if generation.id() > current.id() {
                *current = generation;
                true
            } else {
                false
            }
        });

        if swapped {
            tracing::info!(generation = id, "Model generation published");
        } else {
            tracing::warn!(generation = id, "Stale model generation not published");
        }

        swapped
    }

    /// Receiver notified on every successful publish
    pub fn subscribe(&self) -> watch::Receiver<Arc<ModelGeneration>> {
        self.current.subscribe()
    }
}
