use crate::config::RecommendationConfig;
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::services::lifecycle::LifecycleManager;
use crate::services::recommendation::RecommendationEngine;
use crate::services::refresh::RefreshHandle;
use crate::services::store::{CatalogStore, InteractionLog, RecommendationStore, UserDirectory};
use crate::utils::validation::{sanitize_string, validate_count, validate_new_interaction, validate_new_user};
use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

const RECENT_ACTIVITY: usize = 10;
const MAX_NAME_LENGTH: usize = 100;

/// A globally popular product, independent of any user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularItem {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub product: Option<Product>,
}

#[derive(Debug, Default)]
struct LatencyStats {
    samples: u64,
    total_ms: u64,
    max_ms: u64,
}

/// Request-facing facade over the stores, the engine and the lifecycle manager.
pub struct ServingService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionLog>,
    store: Arc<dyn RecommendationStore>,
    engine: Arc<RecommendationEngine>,
    lifecycle: Arc<LifecycleManager>,
    refresh: RefreshHandle,
    default_count: usize,
    max_count: usize,
    serving_stats: Arc<DashMap<String, u64>>,
    latency: Arc<Mutex<LatencyStats>>,
}

impl ServingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionLog>,
        store: Arc<dyn RecommendationStore>,
        engine: Arc<RecommendationEngine>,
        lifecycle: Arc<LifecycleManager>,
        refresh: RefreshHandle,
        config: &RecommendationConfig,
    ) -> Self {
        Self {
            users,
            catalog,
            interactions,
            store,
            engine,
            lifecycle,
            refresh,
            default_count: config.default_count,
            max_count: config.max_count,
            serving_stats: Arc::new(DashMap::new()),
            latency: Arc::new(Mutex::new(LatencyStats::default())),
        }
    }

    pub fn default_count(&self) -> usize {
        self.default_count
    }

    /// Active recommendations for the user, best first. Generates and persists
    /// a fresh set when `refresh` is set or nothing is stored yet.
    pub async fn recommendations_for(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        refresh: bool,
    ) -> RecommendResult<Vec<RecommendationView>> {
        self.increment_stat("total_requests");
        let start_time = Instant::now();

        let result = self.load_or_generate(user_id, limit, refresh).await;
        self.finish_request(&result, start_time);

        if let Ok(views) = &result {
            info!(
                user_id,
                count = views.len(),
                latency_ms = start_time.elapsed().as_millis() as u64,
                "Served recommendations"
            );
        }
        result
    }

    async fn load_or_generate(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        refresh: bool,
    ) -> RecommendResult<Vec<RecommendationView>> {
        let limit = limit.unwrap_or(self.default_count);
        validate_count(limit, self.max_count)?;
        self.require_user(user_id).await?;

        if !refresh {
            let mut active = self.store.active_for_user(user_id).await?;
            if !active.is_empty() {
                active.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.product_id.cmp(&b.product_id))
                });
                active.truncate(limit);
                return self.render(active).await;
            }
        }

        self.regenerate(user_id, limit).await
    }

    pub async fn generate_and_persist(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<RecommendationView>> {
        self.increment_stat("total_requests");
        let start_time = Instant::now();

        let result = async {
            validate_count(count, self.max_count)?;
            self.require_user(user_id).await?;
            self.regenerate(user_id, count).await
        }
        .await;

        self.finish_request(&result, start_time);
        result
    }

    async fn regenerate(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<RecommendationView>> {
        let candidates = self.engine.try_generate(user_id, count).await?;
        let stored = self.lifecycle.persist(user_id, &candidates).await?;
        self.increment_stat("generations");
        self.render(stored).await
    }

    pub async fn popular(&self, limit: Option<usize>) -> RecommendResult<Vec<PopularItem>> {
        let limit = limit.unwrap_or(self.default_count);
        validate_count(limit, self.max_count)?;

        let candidates = self.engine.trending(limit).await?;
        try_join_all(candidates.into_iter().map(|candidate| async move {
            let product = self.catalog.get_product(candidate.product_id).await?;
            Ok::<_, RecommendError>(PopularItem { candidate, product })
        }))
        .await
    }

    /// Validates and appends an interaction. Significant interactions queue a
    /// background regeneration for the user.
    pub async fn record_interaction(&self, new: NewInteraction) -> RecommendResult<Interaction> {
        validate_new_interaction(&new)?;
        self.require_user(new.user_id).await?;
        if self.catalog.get_product(new.product_id).await?.is_none() {
            return Err(RecommendError::product_not_found(new.product_id));
        }

        let interaction = self.interactions.append(new).await?;
        self.increment_stat("interactions_recorded");
        info!(
            user_id = interaction.user_id,
            product_id = interaction.product_id,
            interaction_type = %interaction.interaction_type,
            "Recorded interaction"
        );

        if interaction.interaction_type.is_significant() && self.refresh.schedule(interaction.user_id) {
            self.increment_stat("refreshes_scheduled");
        }
        Ok(interaction)
    }

    pub async fn user_stats(&self, user_id: UserId) -> RecommendResult<UserStats> {
        let user = self.require_user(user_id).await?;
        let mut history = self.interactions.interactions_for_user(user_id).await?;
        let products = self.catalog.list_products().await?;
        let categories: HashMap<ProductId, &str> = products.iter().map(|p| (p.id, p.category.as_str())).collect();

        let mut interaction_counts: HashMap<InteractionType, usize> = HashMap::new();
        let mut per_category: HashMap<&str, (usize, Vec<f64>)> = HashMap::new();
        for interaction in &history {
            *interaction_counts.entry(interaction.interaction_type).or_insert(0) += 1;
            if let Some(category) = categories.get(&interaction.product_id) {
                let entry = per_category.entry(*category).or_default();
                entry.0 += 1;
                if let Some(rating) = interaction.rating.filter(|_| interaction.is_rating()) {
                    entry.1.push(f64::from(rating));
                }
            }
        }

        let mut category_preferences: Vec<CategoryPreference> = per_category
            .into_iter()
            .map(|(category, (count, ratings))| CategoryPreference {
                category: category.to_string(),
                interaction_count: count,
                average_rating: if ratings.is_empty() {
                    None
                } else {
                    Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
                },
            })
            .collect();
        category_preferences.sort_by(|a, b| {
            b.interaction_count
                .cmp(&a.interaction_count)
                .then_with(|| a.category.cmp(&b.category))
        });

        let total_interactions = history.len();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(RECENT_ACTIVITY);

        Ok(UserStats {
            user,
            interaction_counts,
            category_preferences,
            recent_activity: history,
            total_interactions,
        })
    }

    pub async fn list_products(
        &self,
        category: Option<&str>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> RecommendResult<Vec<Product>> {
        let limit = limit.unwrap_or(20);
        validate_count(limit, self.max_count)?;

        Ok(self
            .catalog
            .list_products()
            .await?
            .into_iter()
            .filter(|p| category.map_or(true, |c| p.category.eq_ignore_ascii_case(c)))
            .skip(offset.unwrap_or(0))
            .take(limit)
            .collect())
    }

    pub async fn product(&self, product_id: ProductId) -> RecommendResult<Product> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| RecommendError::product_not_found(product_id))
    }

    pub async fn categories(&self) -> RecommendResult<Vec<String>> {
        self.catalog.categories().await
    }

    pub async fn list_users(&self) -> RecommendResult<Vec<User>> {
        self.users.list_users().await
    }

    pub async fn create_user(&self, name: &str, email: &str) -> RecommendResult<User> {
        let name = sanitize_string(name.trim(), MAX_NAME_LENGTH);
        let email = email.trim().to_lowercase();
        validate_new_user(&name, &email)?;
        let user = self.users.create_user(&name, &email).await?;
        info!(user_id = user.id, "Created user");
        Ok(user)
    }

    pub async fn health_check(&self) -> HashMap<String, serde_json::Value> {
        let mut health = HashMap::new();

        let store_healthy = match self.catalog.list_products().await {
            Ok(products) => {
                health.insert("products".to_string(), serde_json::Value::from(products.len()));
                true
            }
            Err(e) => {
                error!("Health check could not read catalog: {}", e);
                false
            }
        };

        health.insert("store".to_string(), serde_json::Value::Bool(store_healthy));
        health.insert(
            "status".to_string(),
            serde_json::Value::String(if store_healthy { "healthy" } else { "degraded" }.to_string()),
        );
        health.insert(
            "version".to_string(),
            serde_json::Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        health
    }

    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        let mut stats: HashMap<String, u64> = self
            .serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let latency = self.latency.lock();
        if latency.samples > 0 {
            stats.insert("avg_latency_ms".to_string(), latency.total_ms / latency.samples);
            stats.insert("max_latency_ms".to_string(), latency.max_ms);
        }
        stats
    }

    async fn require_user(&self, user_id: UserId) -> RecommendResult<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| RecommendError::user_not_found(user_id))
    }

    async fn render(&self, rows: Vec<Recommendation>) -> RecommendResult<Vec<RecommendationView>> {
        try_join_all(rows.into_iter().map(|recommendation| async move {
            let product = self.catalog.get_product(recommendation.product_id).await?;
            Ok::<_, RecommendError>(RecommendationView { recommendation, product })
        }))
        .await
    }

    fn finish_request<T>(&self, result: &RecommendResult<T>, start_time: Instant) {
        self.update_latency_stat(start_time.elapsed().as_millis() as u64);
        match result {
            Ok(_) => self.increment_stat("successful_requests"),
            Err(_) => self.increment_stat("failed_requests"),
        }
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }

    fn update_latency_stat(&self, latency_ms: u64) {
        let mut latency = self.latency.lock();
        latency.samples += 1;
        latency.total_ms += latency_ms;
        latency.max_ms = latency.max_ms.max(latency_ms);
    }
}
