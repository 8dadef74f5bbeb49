use crate::config::PopularityConfig;
use crate::models::*;
use std::collections::{HashMap, HashSet};

/// Ranks products by interaction volume. Used for cold-start users and as the
/// last resort when the personalised models yield nothing.
#[derive(Debug, Clone)]
pub struct PopularityRanker {
    score_cap: f64,
    saturation: f64,
}

impl PopularityRanker {
    pub fn new(config: &PopularityConfig) -> Self {
        Self {
            score_cap: config.score_cap,
            saturation: config.saturation,
        }
    }

    pub fn score(&self, interaction_count: usize) -> f64 {
        if self.saturation <= 0.0 {
            return self.score_cap;
        }
        (interaction_count as f64 / self.saturation).min(self.score_cap)
    }

    /// Products absent from `counts` rank with zero interactions.
    pub fn rank(
        &self,
        products: &[Product],
        counts: &HashMap<ProductId, usize>,
        exclude: &HashSet<ProductId>,
        count: usize,
    ) -> Vec<Candidate> {
        let mut ranked: Vec<(ProductId, usize)> = products
            .iter()
            .filter(|p| !exclude.contains(&p.id))
            .map(|p| (p.id, counts.get(&p.id).copied().unwrap_or(0)))
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(count);

        ranked
            .into_iter()
            .map(|(product_id, interactions)| {
                Candidate::new(
                    product_id,
                    self.score(interactions),
                    Algorithm::Popularity,
                    format!(
                        "This is a popular product with {} user interactions. Perfect for discovering trending items!",
                        interactions
                    ),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommendationConfig;

    fn ranker() -> PopularityRanker {
        PopularityRanker::new(&RecommendationConfig::default().popularity)
    }

    #[test]
    fn test_score_is_capped() {
        let ranker = ranker();
        assert_eq!(ranker.score(0), 0.0);
        assert!((ranker.score(2) - 0.2).abs() < 1e-9);
        assert!((ranker.score(8) - 0.8).abs() < 1e-9);
        assert!((ranker.score(50) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_count_then_id_and_excludes() {
        let products: Vec<Product> = (1..=4)
            .map(|id| Product::new(id, "Item", "General", "", 1.0))
            .collect();
        let counts: HashMap<ProductId, usize> = [(1, 3), (2, 5), (3, 3)].into_iter().collect();

        let ranked = ranker().rank(&products, &counts, &HashSet::new(), 10);
        let ids: Vec<_> = ranked.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
        assert_eq!(ranked[3].score, 0.0);

        let exclude: HashSet<ProductId> = [2].into_iter().collect();
        let ranked = ranker().rank(&products, &counts, &exclude, 2);
        let ids: Vec<_> = ranked.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(ranked.iter().all(|c| c.algorithm == Algorithm::Popularity));
    }
}
