use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::services::explanation::ExplanationGenerator;
use crate::services::store::{CatalogStore, InteractionLog, RecommendationStore, UserDirectory};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Writes ranked candidates as the user's active recommendations.
///
/// Explanations are rendered first, concurrently. Only then are the user's
/// active rows retired and one row per candidate written, so readers see an
/// empty active set for the length of a few store writes. The whole sequence
/// runs under a per-user lock: two regenerations for the same user never
/// interleave while different users proceed in parallel. A lock entry is
/// dropped once no task holds or waits on it.
pub struct LifecycleManager {
    store: Arc<dyn RecommendationStore>,
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionLog>,
    explainer: Arc<dyn ExplanationGenerator>,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionLog>,
        explainer: Arc<dyn ExplanationGenerator>,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            interactions,
            explainer,
            locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn persist(&self, user_id: UserId, candidates: &[Candidate]) -> RecommendResult<Vec<Recommendation>> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.retire_and_write(user_id, candidates).await
        };
        // Map entry plus our handle: nobody else is queued on this user.
        self.locks.remove_if(&user_id, |_, held| Arc::strong_count(held) == 2);

        if let Err(e) = &result {
            error!(user_id, "Failed to persist recommendations: {}", e);
        }
        result
    }

    async fn retire_and_write(&self, user_id: UserId, candidates: &[Candidate]) -> RecommendResult<Vec<Recommendation>> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| RecommendError::user_not_found(user_id))?;

        let history = self.interactions.interactions_for_user(user_id).await?;
        let products = self.catalog.list_products().await?;
        let context = UserContext::from_history(&user, &history, &products);

        let mut targets = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match products.iter().find(|p| p.id == candidate.product_id) {
                Some(product) => targets.push((candidate, product)),
                None => warn!(
                    user_id,
                    product_id = candidate.product_id,
                    "Skipping recommendation for product missing from catalog"
                ),
            }
        }

        let explanations = join_all(
            targets
                .iter()
                .map(|(candidate, product)| self.explainer.explain(&context, product, candidate.algorithm)),
        )
        .await;

        let active = self.store.active_for_user(user_id).await?;
        for row in &active {
            self.store.deactivate(row).await?;
        }
        debug!(user_id, retired = active.len(), "Retired active recommendations");

        let mut stored = Vec::with_capacity(targets.len());
        for ((candidate, _), explanation) in targets.iter().zip(&explanations) {
            let row = self
                .store
                .upsert(user_id, candidate.product_id, candidate.score, explanation, candidate.algorithm)
                .await?;
            stored.push(row);
        }

        info!(user_id, stored = stored.len(), "Persisted recommendations");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::explanation::TemplateExplainer;
    use crate::services::store::InMemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    const EXPLAIN_DELAY: Duration = Duration::from_millis(200);

    struct SlowExplainer;

    #[async_trait]
    impl ExplanationGenerator for SlowExplainer {
        async fn explain(&self, _user: &UserContext, product: &Product, _algorithm: Algorithm) -> String {
            tokio::time::sleep(EXPLAIN_DELAY).await;
            format!("because {}", product.name)
        }
    }

    fn manager(store: Arc<InMemoryStore>) -> LifecycleManager {
        LifecycleManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            Arc::new(TemplateExplainer::new()),
        )
    }

    fn candidate(product_id: ProductId, score: f64) -> Candidate {
        Candidate::new(product_id, score, Algorithm::Popularity, "popular".to_string())
    }

    #[tokio::test]
    async fn test_persist_retires_previous_rows() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = manager(store.clone());

        lifecycle
            .persist(1, &[candidate(1, 0.5), candidate(2, 0.4), candidate(3, 0.3)])
            .await
            .unwrap();
        lifecycle.persist(1, &[candidate(1, 0.6), candidate(4, 0.2)]).await.unwrap();

        let mut active: Vec<ProductId> = store
            .active_for_user(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.product_id)
            .collect();
        active.sort();
        assert_eq!(active, vec![1, 4]);

        let history = store.history_for_user(1).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().filter(|r| !r.is_active).count(), 3);
    }

    #[tokio::test]
    async fn test_persist_twice_is_stable() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = manager(store.clone());
        let candidates = [candidate(5, 0.7), candidate(6, 0.3)];

        let first = lifecycle.persist(2, &candidates).await.unwrap();
        let second = lifecycle.persist(2, &candidates).await.unwrap();

        let key = |rows: &[Recommendation]| -> Vec<(ProductId, String, String)> {
            rows.iter()
                .map(|r| (r.product_id, format!("{:.6}", r.score), r.explanation.clone()))
                .collect()
        };
        assert_eq!(key(&first), key(&second));
        assert_eq!(store.active_for_user(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_product_is_skipped() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = manager(store.clone());

        let stored = lifecycle.persist(1, &[candidate(999, 0.9), candidate(2, 0.4)]).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].product_id, 2);
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = manager(store);
        let result = lifecycle.persist(42, &[candidate(1, 0.5)]).await;
        assert!(matches!(result, Err(RecommendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_persists_keep_one_active_row_per_product() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = Arc::new(manager(store.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move {
                    let candidates = [candidate(1, 0.1 * i as f64), candidate(2, 0.05)];
                    lifecycle.persist(3, &candidates).await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let active = store.active_for_user(3).await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_explanations_do_not_leave_user_without_active_rows() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(SlowExplainer),
        ));

        let first: Vec<Candidate> = (1..=5).map(|p| candidate(p, 0.5)).collect();
        lifecycle.persist(1, &first).await.unwrap();

        let second: Vec<Candidate> = (6..=10).map(|p| candidate(p, 0.5)).collect();
        let started = Instant::now();
        let writer = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.persist(1, &second).await })
        };

        let mut incomplete_since: Option<Instant> = None;
        let mut longest_incomplete = Duration::ZERO;
        while !writer.is_finished() {
            let seen = store.active_for_user(1).await.unwrap().len();
            if seen == 5 {
                incomplete_since = None;
            } else {
                let since = *incomplete_since.get_or_insert_with(Instant::now);
                longest_incomplete = longest_incomplete.max(since.elapsed());
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let stored = writer.await.unwrap().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|r| r.explanation.starts_with("because ")));
        // Explanations overlap instead of queueing one after another.
        assert!(elapsed < EXPLAIN_DELAY * 3, "persist took {:?}", elapsed);
        assert!(
            longest_incomplete < EXPLAIN_DELAY / 2,
            "active set was incomplete for {:?}",
            longest_incomplete
        );

        let mut active: Vec<ProductId> = store.active_for_user(1).await.unwrap().iter().map(|r| r.product_id).collect();
        active.sort();
        assert_eq!(active, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_user_locks_are_released_after_persist() {
        let store = Arc::new(InMemoryStore::with_sample_data());
        let lifecycle = Arc::new(manager(store.clone()));

        lifecycle.persist(1, &[candidate(1, 0.5)]).await.unwrap();
        assert!(lifecycle.locks.is_empty());

        let _ = lifecycle.persist(42, &[candidate(1, 0.5)]).await;
        assert!(lifecycle.locks.is_empty());

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move { lifecycle.persist(1 + i % 2, &[candidate(2, 0.3)]).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }
        assert!(lifecycle.locks.is_empty());
        assert_eq!(store.active_for_user(1).await.unwrap().len(), 1);
        assert_eq!(store.active_for_user(2).await.unwrap().len(), 1);
    }
}
