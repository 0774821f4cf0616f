use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::UserSeq;
use crate::services::{embedding::fnv1a, registry::ModelGeneration};

/// Identity of the generation a cached response was computed from
///
/// Generation ids restart at 1 with every process, so the key also carries the
/// generation's random build id. Entries from an earlier process, another
/// replica or an older generation are never read back; they expire on their TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationScope {
    pub generation: u64,
    pub build_id: Uuid,
}

impl From<&ModelGeneration> for GenerationScope {
    fn from(generation: &ModelGeneration) -> Self {
        Self {
            generation: generation.id(),
            build_id: generation.build_id(),
        }
    }
}

impl Display for GenerationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.generation, self.build_id.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Content-similarity result for a set of query tokens
    Content {
        scope: GenerationScope,
        tokens: Vec<String>,
    },
    /// Collaborative recommendation for one user
    Collabo {
        scope: GenerationScope,
        user_seq: UserSeq,
    },
}

impl CacheKey {
    /// Token order does not change the ranking, so it does not change the key either
    pub fn content(
        generation: &ModelGeneration,
        tokens: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut tokens: Vec<String> = tokens.into_iter().collect();
        tokens.sort();
        tokens.dedup();
        CacheKey::Content {
            scope: generation.into(),
            tokens,
        }
    }

    pub fn collabo(generation: &ModelGeneration, user_seq: UserSeq) -> Self {
        CacheKey::Collabo {
            scope: generation.into(),
            user_seq,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Content { scope, tokens } => {
                let digest = fnv1a(tokens.join("\u{1f}").as_bytes());
                write!(f, "content:{}:{:016x}", scope, digest)
            }
            CacheKey::Collabo { scope, user_seq } => write!(f, "collabo:{}:{}", scope, user_seq),
        }
    }
}

/// Storage behind the response cache, addressed by rendered `CacheKey`s
#[async_trait::async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a value without making the caller wait on the backend
    fn put_raw(&self, key: String, value: String, ttl: u64);
}

impl<'a> dyn ResponseCache + 'a {
    /// Cached value for `key`; entries that no longer decode count as misses
    pub async fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let cached = self.get_raw(&key.to_string()).await?;

        Ok(cached.and_then(|json| match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }))
    }

    pub fn set_in_background<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        match serde_json::to_string(value) {
            Ok(json) => self.put_raw(key.to_string(), json, ttl),
            Err(e) => tracing::error!(key = %key, error = %e, "Cache serialization error"),
        }
    }
}

/// Opens a Redis client; no connection is made until the cache starts
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache for recommendation responses
///
/// Reads go straight to Redis over a shared `ConnectionManager`; writes are
/// queued to a background task so a response never waits on the cache.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    write_tx: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer after draining queued writes
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Connects to Redis and spawns the background writer
    pub async fn new(redis_client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(redis_client).await?;
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(Self::writer_task(conn.clone(), write_rx, shutdown_rx));

        Ok((Self { conn, write_tx }, CacheWriterHandle { shutdown_tx, task }))
    }

    async fn writer_task(
        mut conn: ConnectionManager,
        mut write_rx: mpsc::UnboundedReceiver<PendingWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed = 0u64;

        loop {
            tokio::select! {
                Some(write) = write_rx.recv() => {
                    if let Err(e) = Self::write(&mut conn, write).await {
                        failed += 1;
                        tracing::warn!(error = %e, failed, "Cache write failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    // Refuse new writes but keep what is already queued
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(write) = write_rx.recv().await {
                        if let Err(e) = Self::write(&mut conn, write).await {
                            tracing::warn!(error = %e, "Cache write failed during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }
                    tracing::info!(flushed, failed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write(conn: &mut ConnectionManager, write: PendingWrite) -> AppResult<()> {
        let _: () = conn.set_ex(write.key, write.value, write.ttl).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResponseCache for Cache {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    /// Queues the write for the background task and returns immediately
    fn put_raw(&self, key: String, value: String, ttl: u64) {
        let write = PendingWrite { key, value, ttl };
        if let Err(mpsc::error::SendError(write)) = self.write_tx.send(write) {
            tracing::debug!(key = %write.key, "Cache writer stopped, dropping write");
        }
    }
}
