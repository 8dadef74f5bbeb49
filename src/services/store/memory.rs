use super::{CatalogStore, InteractionLog, RecommendationStore, UserDirectory};
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

/// Process-local implementation of every store trait. Locks are never held
/// across an await point.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<BTreeMap<UserId, User>>,
    products: RwLock<BTreeMap<ProductId, Product>>,
    interactions: RwLock<Vec<Interaction>>,
    recommendations: RwLock<Vec<Recommendation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the sample catalog and users.
    pub fn with_sample_data() -> Self {
        let store = Self::new();
        store.insert_products(super::seed::sample_products());
        store.insert_users(super::seed::sample_users());
        info!(
            "Seeded in-memory store with {} products and {} users",
            store.products.read().len(),
            store.users.read().len()
        );
        store
    }

    pub fn insert_products(&self, products: impl IntoIterator<Item = Product>) {
        let mut guard = self.products.write();
        for product in products {
            guard.insert(product.id, product);
        }
    }

    pub fn insert_users(&self, users: impl IntoIterator<Item = User>) {
        let mut guard = self.users.write();
        for user in users {
            guard.insert(user.id, user);
        }
    }

    /// Appends pre-built interactions without validation, for seeding and tests.
    pub fn insert_interactions(&self, interactions: impl IntoIterator<Item = Interaction>) {
        self.interactions.write().extend(interactions);
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, user_id: UserId) -> RecommendResult<Option<User>> {
        Ok(self.users.read().get(&user_id).cloned())
    }

    async fn list_users(&self) -> RecommendResult<Vec<User>> {
        Ok(self.users.read().values().cloned().collect())
    }

    async fn create_user(&self, name: &str, email: &str) -> RecommendResult<User> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == email) {
            return Err(RecommendError::InvalidInput(
                "User with this email already exists".to_string(),
            ));
        }

        let id = users.keys().next_back().copied().unwrap_or(0) + 1;
        let user = User::new(id, name, email);
        users.insert(id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_products(&self) -> RecommendResult<Vec<Product>> {
        Ok(self.products.read().values().cloned().collect())
    }

    async fn get_product(&self, product_id: ProductId) -> RecommendResult<Option<Product>> {
        Ok(self.products.read().get(&product_id).cloned())
    }

    async fn categories(&self) -> RecommendResult<Vec<String>> {
        let mut categories: Vec<String> = self
            .products
            .read()
            .values()
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

#[async_trait]
impl InteractionLog for InMemoryStore {
    async fn interactions_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Interaction>> {
        Ok(self
            .interactions
            .read()
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all_rated_interactions(&self) -> RecommendResult<Vec<Interaction>> {
        Ok(self
            .interactions
            .read()
            .iter()
            .filter(|i| i.is_rating())
            .cloned()
            .collect())
    }

    async fn interaction_counts(&self) -> RecommendResult<HashMap<ProductId, usize>> {
        let mut counts = HashMap::new();
        for interaction in self.interactions.read().iter() {
            *counts.entry(interaction.product_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn append(&self, interaction: NewInteraction) -> RecommendResult<Interaction> {
        let interaction = Interaction::from_new(interaction);
        self.interactions.write().push(interaction.clone());
        Ok(interaction)
    }
}

#[async_trait]
impl RecommendationStore for InMemoryStore {
    async fn active_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>> {
        Ok(self
            .recommendations
            .read()
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, recommendation: &Recommendation) -> RecommendResult<()> {
        let mut rows = self.recommendations.write();
        let row = rows
            .iter_mut()
            .find(|r| r.id == recommendation.id)
            .ok_or_else(|| RecommendError::NotFound(format!("Recommendation {} not found", recommendation.id)))?;
        row.is_active = false;
        Ok(())
    }

    async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        score: f64,
        explanation: &str,
        algorithm: Algorithm,
    ) -> RecommendResult<Recommendation> {
        let mut rows = self.recommendations.write();

        if let Some(existing) = rows
            .iter_mut()
            .find(|r| r.user_id == user_id && r.product_id == product_id && r.is_active)
        {
            existing.score = score;
            existing.explanation = explanation.to_string();
            existing.algorithm = algorithm;
            existing.created_at = Utc::now();
            return Ok(existing.clone());
        }

        let recommendation = Recommendation {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            score,
            explanation: explanation.to_string(),
            algorithm,
            created_at: Utc::now(),
            is_active: true,
        };
        rows.push(recommendation.clone());
        Ok(recommendation)
    }

    async fn history_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>> {
        let mut rows: Vec<Recommendation> = self
            .recommendations
            .read()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}
