use crate::algorithms::tfidf::TfIdfVectorizer;
use crate::config::ContentConfig;
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::utils::sparse_cosine_similarity;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Content-based filtering over product category and description text.
///
/// Products the user rated at or above `like_threshold` form the reference
/// set. Every other product is scored by its best TF-IDF cosine similarity to
/// any reference product, discounted by `score_weight`.
#[derive(Debug, Clone)]
pub struct ContentBasedFilter {
    max_features: usize,
    similarity_floor: f64,
    like_threshold: u8,
    score_weight: f64,
}

impl ContentBasedFilter {
    pub fn new(config: &ContentConfig) -> Self {
        Self {
            max_features: config.max_features,
            similarity_floor: config.similarity_floor,
            like_threshold: config.like_threshold,
            score_weight: config.score_weight,
        }
    }

    pub fn recommend(
        &self,
        user_history: &[Interaction],
        products: &[Product],
        count: usize,
    ) -> RecommendResult<Vec<Candidate>> {
        let liked: HashSet<ProductId> = user_history
            .iter()
            .filter(|i| i.rating.map_or(false, |r| r >= self.like_threshold))
            .map(|i| i.product_id)
            .collect();

        if liked.is_empty() {
            return Err(RecommendError::InsufficientData(
                "user has not rated any product highly".to_string(),
            ));
        }

        let documents: Vec<String> = products.iter().map(Product::feature_text).collect();
        let mut vectorizer = TfIdfVectorizer::new(self.max_features);
        let vectors = vectorizer.fit_transform(&documents);

        let index: HashMap<ProductId, usize> = products
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id, idx))
            .collect();
        let liked_vectors: Vec<usize> = liked.iter().filter_map(|id| index.get(id).copied()).collect();

        if liked_vectors.is_empty() {
            return Err(RecommendError::InsufficientData(
                "liked products are no longer in the catalog".to_string(),
            ));
        }

        let scored: Vec<(usize, f64)> = products
            .par_iter()
            .enumerate()
            .filter(|(_, product)| !liked.contains(&product.id))
            .map(|(idx, _)| {
                let max_similarity = liked_vectors
                    .iter()
                    .map(|&liked_idx| sparse_cosine_similarity(&vectors[idx], &vectors[liked_idx]))
                    .fold(0.0_f64, f64::max);
                (idx, max_similarity)
            })
            .collect();

        if scored.iter().any(|(_, s)| !s.is_finite()) {
            return Err(RecommendError::ComputationFailure(
                "non-finite text similarity".to_string(),
            ));
        }

        let mut candidates: Vec<Candidate> = scored
            .into_iter()
            .filter(|(_, similarity)| *similarity > self.similarity_floor)
            .map(|(idx, similarity)| {
                let product = &products[idx];
                Candidate::new(
                    product.id,
                    similarity * self.score_weight,
                    Algorithm::ContentBased,
                    format!(
                        "This {} product is similar to items you've previously rated highly",
                        product.category.to_lowercase()
                    ),
                )
            })
            .collect();

        rank_candidates(&mut candidates);
        candidates.truncate(count);
        Ok(candidates)
    }
}
