use crate::models::UserId;
use crate::services::lifecycle::LifecycleManager;
use crate::services::recommendation::RecommendationEngine;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Enqueues background regenerations. Cheap to clone.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<UserId>,
}

impl RefreshHandle {
    /// Returns false when the request was dropped because the queue is full or
    /// the worker has stopped. A later trigger regenerates anyway.
    pub fn schedule(&self, user_id: UserId) -> bool {
        match self.tx.try_send(user_id) {
            Ok(()) => {
                debug!(user_id, "Scheduled recommendation refresh");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id, "Refresh queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(user_id, "Refresh worker stopped, dropping request");
                false
            }
        }
    }
}

/// Consumes user ids and regenerates their recommendations one at a time.
pub struct RefreshWorker {
    engine: Arc<RecommendationEngine>,
    lifecycle: Arc<LifecycleManager>,
    count: usize,
}

impl RefreshWorker {
    pub fn new(engine: Arc<RecommendationEngine>, lifecycle: Arc<LifecycleManager>, count: usize) -> Self {
        Self {
            engine,
            lifecycle,
            count,
        }
    }

    /// Starts the worker loop on the current runtime. The loop ends once every
    /// handle has been dropped.
    pub fn spawn(self, capacity: usize) -> (RefreshHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<UserId>(capacity.max(1));

        let task = tokio::spawn(async move {
            info!("Starting recommendation refresh worker");
            while let Some(user_id) = rx.recv().await {
                self.refresh(user_id).await;
            }
            info!("Recommendation refresh worker stopped");
        });

        (RefreshHandle { tx }, task)
    }

    async fn refresh(&self, user_id: UserId) {
        let candidates = match self.engine.try_generate(user_id, self.count).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(user_id, "Background refresh failed: {}", e);
                return;
            }
        };

        if let Err(e) = self.lifecycle.persist(user_id, &candidates).await {
            error!(user_id, "Background refresh could not persist: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommendationConfig;
    use crate::services::explanation::TemplateExplainer;
    use crate::services::store::{InMemoryStore, RecommendationStore};

    fn worker(store: Arc<InMemoryStore>) -> RefreshWorker {
        let engine = Arc::new(RecommendationEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            &RecommendationConfig::default(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            Arc::new(TemplateExplainer::new()),
        ));
        RefreshWorker::new(engine, lifecycle, 5)
    }

    #[tokio::test]
    async fn test_scheduled_refresh_persists_rows() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let (handle, task) = worker(store.clone()).spawn(8);

        assert!(handle.schedule(1));
        drop(handle);
        task.await.unwrap();

        let active = store.active_for_user(1).await.unwrap();
        assert_eq!(active.len(), 5);
        assert!(active.iter().all(|r| r.algorithm == crate::models::Algorithm::Popularity));
    }

    #[tokio::test]
    async fn test_unknown_user_does_not_stop_worker() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let (handle, task) = worker(store.clone()).spawn(8);

        assert!(handle.schedule(404));
        assert!(handle.schedule(2));
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.active_for_user(2).await.unwrap().len(), 5);
    }
}
