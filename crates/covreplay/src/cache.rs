//! Single-writer key/value cache reachable only by message passing
//!
//! A dedicated tokio task owns the map. Callers hold a cloneable
//! [`CacheHandle`] and send `Read`/`Write` requests, each carrying a oneshot
//! reply sender. The worker serves requests one at a time in receipt order, so
//! there are no partial writes, the last write to a key wins, and a caller's
//! own write-then-read observes its write.
//!
//! Payloads are opaque (`Arc<dyn Any + Send + Sync>`). The cache never checks
//! their shape; [`CacheHandle::read_as`] reports a wrong type to the caller as
//! [`ReplayError::CacheProtocol`].

use crate::result::{ReplayError, ReplayResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Opaque cache payload
pub type CachePayload = Arc<dyn Any + Send + Sync>;

enum CacheRequest {
    Read {
        key: String,
        reply: oneshot::Sender<Option<CachePayload>>,
    },
    Write {
        key: String,
        payload: CachePayload,
        reply: oneshot::Sender<()>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to a cache worker
#[derive(Debug, Clone)]
pub struct CacheHandle {
    name: Arc<str>,
    tx: mpsc::Sender<CacheRequest>,
}

impl CacheHandle {
    /// Spawn a cache worker on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn spawn(name: &str, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let name: Arc<str> = Arc::from(name);
        tokio::spawn(run_worker(Arc::clone(&name), rx));
        Self { name, tx }
    }

    /// Cache instance name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the payload stored under `key`
    pub async fn read(&self, key: &str) -> ReplayResult<Option<CachePayload>> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheRequest::Read {
            key: key.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Store `payload` under `key`, replacing any previous payload
    pub async fn write(&self, key: &str, payload: CachePayload) -> ReplayResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheRequest::Write {
            key: key.to_string(),
            payload,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Store a typed value under `key`
    pub async fn write_value<T: Any + Send + Sync>(&self, key: &str, value: T) -> ReplayResult<()> {
        self.write(key, Arc::new(value)).await
    }

    /// Read the value under `key` as a `T`
    ///
    /// Returns `Ok(None)` for an absent key and a `CacheProtocol` error when
    /// the stored payload is not a `T`.
    pub async fn read_as<T: Any + Send + Sync>(&self, key: &str) -> ReplayResult<Option<Arc<T>>> {
        match self.read(key).await? {
            Some(payload) => payload
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ReplayError::CacheProtocol {
                    cache: self.name.to_string(),
                    key: key.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> ReplayResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheRequest::Len { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Whether the cache holds no keys
    pub async fn is_empty(&self) -> ReplayResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn send(&self, request: CacheRequest) -> ReplayResult<()> {
        self.tx.send(request).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> ReplayError {
        ReplayError::CacheClosed {
            cache: self.name.to_string(),
        }
    }
}

async fn run_worker(name: Arc<str>, mut rx: mpsc::Receiver<CacheRequest>) {
    let mut store: HashMap<String, CachePayload> = HashMap::new();
    debug!(cache = %name, "cache worker started");

    while let Some(request) = rx.recv().await {
        match request {
            CacheRequest::Read { key, reply } => {
                trace!(cache = %name, %key, "read");
                // The requester may have given up; nothing to do then.
                let _ = reply.send(store.get(&key).cloned());
            }
            CacheRequest::Write {
                key,
                payload,
                reply,
            } => {
                trace!(cache = %name, %key, "write");
                store.insert(key, payload);
                let _ = reply.send(());
            }
            CacheRequest::Len { reply } => {
                let _ = reply.send(store.len());
            }
        }
    }

    debug!(cache = %name, entries = store.len(), "cache worker stopped");
}
