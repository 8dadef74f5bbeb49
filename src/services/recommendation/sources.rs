use super::CandidateSource;
use crate::algorithms::{ContentBasedFilter, PopularityRanker, UserBasedCollaborative};
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::services::store::{CatalogStore, InteractionLog};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Feeds the rating log into user-based collaborative filtering.
pub struct CollaborativeSource {
    interactions: Arc<dyn InteractionLog>,
    model: UserBasedCollaborative,
}

impl CollaborativeSource {
    pub fn new(interactions: Arc<dyn InteractionLog>, model: UserBasedCollaborative) -> Self {
        Self { interactions, model }
    }
}

#[async_trait]
impl CandidateSource for CollaborativeSource {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Collaborative
    }

    async fn candidates(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>> {
        let rated = self.interactions.all_rated_interactions().await?;
        let history = self.interactions.interactions_for_user(user_id).await?;
        self.model.recommend(user_id, &rated, &history, count)
    }
}

/// Feeds the catalog and the user's liked products into the TF-IDF model.
pub struct ContentSource {
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionLog>,
    model: ContentBasedFilter,
}

impl ContentSource {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionLog>,
        model: ContentBasedFilter,
    ) -> Self {
        Self {
            catalog,
            interactions,
            model,
        }
    }
}

#[async_trait]
impl CandidateSource for ContentSource {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ContentBased
    }

    async fn candidates(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>> {
        let history = self.interactions.interactions_for_user(user_id).await?;
        let products = self.catalog.list_products().await?;
        let model = self.model.clone();
        // TF-IDF over the whole catalog is CPU bound.
        tokio::task::spawn_blocking(move || model.recommend(&history, &products, count))
            .await
            .map_err(|e| RecommendError::ComputationFailure(format!("content model task failed: {}", e)))?
    }
}

/// Most-interacted products the user has not touched yet.
pub struct PopularitySource {
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionLog>,
    ranker: PopularityRanker,
}

impl PopularitySource {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionLog>,
        ranker: PopularityRanker,
    ) -> Self {
        Self {
            catalog,
            interactions,
            ranker,
        }
    }

    /// Ranking with nothing excluded, for anonymous "trending" listings.
    pub async fn global(&self, count: usize) -> RecommendResult<Vec<Candidate>> {
        let products = self.catalog.list_products().await?;
        let counts = self.interactions.interaction_counts().await?;
        Ok(self.ranker.rank(&products, &counts, &HashSet::new(), count))
    }
}

#[async_trait]
impl CandidateSource for PopularitySource {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Popularity
    }

    async fn candidates(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>> {
        let products = self.catalog.list_products().await?;
        let counts = self.interactions.interaction_counts().await?;
        let seen: HashSet<ProductId> = self
            .interactions
            .interactions_for_user(user_id)
            .await?
            .into_iter()
            .map(|i| i.product_id)
            .collect();
        Ok(self.ranker.rank(&products, &counts, &seen, count))
    }
}
