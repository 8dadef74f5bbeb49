//! Storage collaborators the pipeline reads from and writes to.

pub mod memory;
pub mod postgres;
pub mod seed;

use crate::error::RecommendResult;
use crate::models::*;
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> RecommendResult<Option<User>>;
    async fn list_users(&self) -> RecommendResult<Vec<User>>;
    /// Fails with `InvalidInput` when the email is already registered.
    async fn create_user(&self, name: &str, email: &str) -> RecommendResult<User>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self) -> RecommendResult<Vec<Product>>;
    async fn get_product(&self, product_id: ProductId) -> RecommendResult<Option<Product>>;
    async fn categories(&self) -> RecommendResult<Vec<String>>;
}

#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn interactions_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Interaction>>;
    async fn all_rated_interactions(&self) -> RecommendResult<Vec<Interaction>>;
    /// Interaction count of any type, per product. Products never touched are absent.
    async fn interaction_counts(&self) -> RecommendResult<HashMap<ProductId, usize>>;
    async fn append(&self, interaction: NewInteraction) -> RecommendResult<Interaction>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn active_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>>;
    async fn deactivate(&self, recommendation: &Recommendation) -> RecommendResult<()>;
    /// Updates the active row for (user, product) in place, or inserts a new active row.
    async fn upsert(
        &self,
        user_id: UserId,
        product_id: ProductId,
        score: f64,
        explanation: &str,
        algorithm: Algorithm,
    ) -> RecommendResult<Recommendation>;
    /// Every row ever written for the user, retired ones included, newest first.
    async fn history_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>>;
}
