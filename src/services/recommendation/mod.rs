pub mod sources;

use crate::algorithms::{ContentBasedFilter, HybridCombiner, PopularityRanker, UserBasedCollaborative};
use crate::config::RecommendationConfig;
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::services::store::{CatalogStore, InteractionLog, UserDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use sources::{CollaborativeSource, ContentSource, PopularitySource};

/// A model that yields scored candidates for one user.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn algorithm(&self) -> Algorithm;
    async fn candidates(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>>;
}

/// One step of the fallback chain. Each stage either produces a non-empty list
/// or hands over to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Collaborative and content models, merged by the hybrid combiner.
    Personalized,
    Popularity,
}

/// Picks which models run for a user and merges their output.
pub struct RecommendationEngine {
    users: Arc<dyn UserDirectory>,
    interactions: Arc<dyn InteractionLog>,
    collaborative: Arc<dyn CandidateSource>,
    content: Arc<dyn CandidateSource>,
    popularity: Arc<PopularitySource>,
    combiner: HybridCombiner,
    min_interactions: usize,
}

impl RecommendationEngine {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionLog>,
        config: &RecommendationConfig,
    ) -> Self {
        let collaborative = Arc::new(CollaborativeSource::new(
            interactions.clone(),
            UserBasedCollaborative::new(&config.collaborative),
        ));
        let content = Arc::new(ContentSource::new(
            catalog.clone(),
            interactions.clone(),
            ContentBasedFilter::new(&config.content),
        ));
        let popularity = Arc::new(PopularitySource::new(
            catalog,
            interactions.clone(),
            PopularityRanker::new(&config.popularity),
        ));

        Self::with_sources(users, interactions, collaborative, content, popularity, config)
    }

    /// Builds an engine around caller-supplied personalised models.
    pub fn with_sources(
        users: Arc<dyn UserDirectory>,
        interactions: Arc<dyn InteractionLog>,
        collaborative: Arc<dyn CandidateSource>,
        content: Arc<dyn CandidateSource>,
        popularity: Arc<PopularitySource>,
        config: &RecommendationConfig,
    ) -> Self {
        Self {
            users,
            interactions,
            collaborative,
            content,
            popularity,
            combiner: HybridCombiner::new(&config.hybrid),
            min_interactions: config.min_interactions,
        }
    }

    /// Stages to try, in order, for a user with `history_len` interactions.
    pub fn plan(&self, history_len: usize) -> Vec<Stage> {
        if history_len < self.min_interactions {
            vec![Stage::Popularity]
        } else {
            vec![Stage::Personalized, Stage::Popularity]
        }
    }

    /// Ranked candidates for `user_id`, at most `count` long. Only an unknown
    /// user or an unreadable interaction log is reported as an error; model
    /// failures degrade to the next stage.
    pub async fn try_generate(&self, user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>> {
        if self.users.get_user(user_id).await?.is_none() {
            return Err(RecommendError::user_not_found(user_id));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let history = self.interactions.interactions_for_user(user_id).await?;

        for stage in self.plan(history.len()) {
            if let Some(candidates) = self.run_stage(stage, user_id, count).await {
                info!(
                    user_id,
                    stage = ?stage,
                    count = candidates.len(),
                    "Generated recommendations"
                );
                return Ok(candidates);
            }
            debug!(user_id, stage = ?stage, "Stage produced nothing, falling back");
        }

        warn!(user_id, "No recommendation stage produced candidates");
        Ok(Vec::new())
    }

    /// Like [`try_generate`](Self::try_generate) but never fails: errors are
    /// logged and yield an empty list.
    pub async fn generate(&self, user_id: UserId, count: usize) -> Vec<Candidate> {
        match self.try_generate(user_id, count).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(user_id, "Error generating recommendations: {}", e);
                Vec::new()
            }
        }
    }

    /// Popularity ranking over the whole catalog, nothing excluded.
    pub async fn trending(&self, count: usize) -> RecommendResult<Vec<Candidate>> {
        self.popularity.global(count).await
    }

    async fn run_stage(&self, stage: Stage, user_id: UserId, count: usize) -> Option<Vec<Candidate>> {
        let candidates = match stage {
            Stage::Personalized => {
                let (collaborative, content) = tokio::join!(
                    run_source(self.collaborative.as_ref(), user_id, count),
                    run_source(self.content.as_ref(), user_id, count),
                );
                self.combiner.combine(&collaborative, &content, count)
            }
            Stage::Popularity => run_source(self.popularity.as_ref(), user_id, count).await,
        };

        if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        }
    }
}

/// Runs one model, turning any failure into an empty list.
async fn run_source(source: &dyn CandidateSource, user_id: UserId, count: usize) -> Vec<Candidate> {
    match source.candidates(user_id, count).await {
        Ok(candidates) => candidates,
        Err(e) if e.is_degradable() => {
            debug!(user_id, algorithm = %source.algorithm(), "Model skipped: {}", e);
            Vec::new()
        }
        Err(e) => {
            error!(user_id, algorithm = %source.algorithm(), "Model failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    struct FailingSource(Algorithm);

    #[async_trait]
    impl CandidateSource for FailingSource {
        fn algorithm(&self) -> Algorithm {
            self.0
        }

        async fn candidates(&self, _user_id: UserId, _count: usize) -> RecommendResult<Vec<Candidate>> {
            Err(RecommendError::ComputationFailure("boom".to_string()))
        }
    }

    struct FixedSource(Vec<Candidate>);

    #[async_trait]
    impl CandidateSource for FixedSource {
        fn algorithm(&self) -> Algorithm {
            Algorithm::Collaborative
        }

        async fn candidates(&self, _user_id: UserId, count: usize) -> RecommendResult<Vec<Candidate>> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    fn warm_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_sample_data());
        store.insert_interactions(vec![
            Interaction::new(1, 1, InteractionType::View),
            Interaction::new(1, 2, InteractionType::Click),
            Interaction::new(1, 3, InteractionType::Purchase),
            Interaction::new(2, 4, InteractionType::View),
            Interaction::new(2, 4, InteractionType::Click),
        ]);
        store
    }

    fn engine_with(
        store: Arc<InMemoryStore>,
        collaborative: Arc<dyn CandidateSource>,
        content: Arc<dyn CandidateSource>,
    ) -> RecommendationEngine {
        let config = RecommendationConfig::default();
        let popularity = Arc::new(PopularitySource::new(
            store.clone(),
            store.clone(),
            PopularityRanker::new(&config.popularity),
        ));
        RecommendationEngine::with_sources(store.clone(), store, collaborative, content, popularity, &config)
    }

    #[tokio::test]
    async fn test_plan_depends_on_history_depth() {
        let store = warm_store();
        let engine = RecommendationEngine::new(store.clone(), store.clone(), store, &RecommendationConfig::default());
        assert_eq!(engine.plan(2), vec![Stage::Popularity]);
        assert_eq!(engine.plan(3), vec![Stage::Personalized, Stage::Popularity]);
    }

    #[tokio::test]
    async fn test_failing_models_fall_back_to_popularity() {
        let store = warm_store();
        let engine = engine_with(
            store,
            Arc::new(FailingSource(Algorithm::Collaborative)),
            Arc::new(FailingSource(Algorithm::ContentBased)),
        );

        let candidates = engine.generate(1, 3).await;
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.algorithm == Algorithm::Popularity));
        assert_eq!(candidates[0].product_id, 4);
        assert!(candidates.iter().all(|c| ![1, 2, 3].contains(&c.product_id)));
    }

    #[tokio::test]
    async fn test_one_failing_model_does_not_abort_the_other() {
        let store = warm_store();
        let fixed = vec![Candidate::new(9, 0.6, Algorithm::Collaborative, "fixed".to_string())];
        let engine = engine_with(
            store,
            Arc::new(FixedSource(fixed)),
            Arc::new(FailingSource(Algorithm::ContentBased)),
        );

        let candidates = engine.generate(1, 5).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product_id, 9);
        assert_eq!(candidates[0].algorithm, Algorithm::Collaborative);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = warm_store();
        let engine = RecommendationEngine::new(store.clone(), store.clone(), store, &RecommendationConfig::default());
        assert!(matches!(engine.try_generate(999, 5).await, Err(RecommendError::NotFound(_))));
        assert!(engine.generate(999, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_trending_excludes_nothing() {
        let store = warm_store();
        let engine = RecommendationEngine::new(store.clone(), store.clone(), store, &RecommendationConfig::default());
        let trending = engine.trending(2).await.unwrap();
        assert_eq!(trending[0].product_id, 4);
        assert!((trending[0].score - 0.2).abs() < 1e-9);
        assert_eq!(trending[1].product_id, 1);
    }
}
