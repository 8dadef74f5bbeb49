use crate::config::CollaborativeConfig;
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use crate::utils::row_cosine_similarity;
use nalgebra::DMatrix;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Dense user x product matrix of average ratings (0 where a user never rated).
#[derive(Debug, Clone)]
pub struct RatingMatrix {
    users: Vec<UserId>,
    products: Vec<ProductId>,
    values: DMatrix<f64>,
    rated_pairs: usize,
}

impl RatingMatrix {
    /// Builds the matrix from rating interactions. Repeated ratings of the same
    /// product by the same user are averaged; other interaction types are ignored.
    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        let mut sums: BTreeMap<(UserId, ProductId), (f64, usize)> = BTreeMap::new();
        for interaction in interactions.iter().filter(|i| i.is_rating()) {
            if let Some(rating) = interaction.rating {
                let entry = sums
                    .entry((interaction.user_id, interaction.product_id))
                    .or_insert((0.0, 0));
                entry.0 += f64::from(rating);
                entry.1 += 1;
            }
        }

        let users: Vec<UserId> = sums
            .keys()
            .map(|(u, _)| *u)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let products: Vec<ProductId> = sums
            .keys()
            .map(|(_, p)| *p)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let user_index: HashMap<UserId, usize> =
            users.iter().enumerate().map(|(i, u)| (*u, i)).collect();
        let product_index: HashMap<ProductId, usize> =
            products.iter().enumerate().map(|(i, p)| (*p, i)).collect();

        let mut values = DMatrix::zeros(users.len(), products.len());
        for ((user_id, product_id), (sum, n)) in &sums {
            values[(user_index[user_id], product_index[product_id])] = sum / *n as f64;
        }

        Self {
            users,
            products,
            values,
            rated_pairs: sums.len(),
        }
    }

    pub fn rated_pairs(&self) -> usize {
        self.rated_pairs
    }

    pub fn user_row(&self, user_id: UserId) -> Option<usize> {
        self.users.binary_search(&user_id).ok()
    }

    #[cfg(test)]
    fn rating(&self, row: usize, product_id: ProductId) -> f64 {
        match self.products.binary_search(&product_id) {
            Ok(col) => self.values[(row, col)],
            Err(_) => 0.0,
        }
    }

    /// Cosine similarity of `row` against every other user row, most similar first.
    /// Ties are ordered by ascending user id.
    pub fn neighbors(&self, row: usize) -> Vec<(UserId, usize, f64)> {
        let mut neighbors: Vec<(UserId, usize, f64)> = (0..self.users.len())
            .filter(|&other| other != row)
            .map(|other| (self.users[other], other, row_cosine_similarity(&self.values, row, other)))
            .collect();

        neighbors.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        neighbors
    }

    /// Products the user in `row` rated at or above `threshold`, by average rating.
    pub fn liked_products(&self, row: usize, threshold: f64) -> Vec<ProductId> {
        self.products
            .iter()
            .enumerate()
            .filter(|(col, _)| self.values[(row, *col)] >= threshold)
            .map(|(_, p)| *p)
            .collect()
    }
}

/// User-based nearest-neighbour collaborative filtering.
#[derive(Debug, Clone)]
pub struct UserBasedCollaborative {
    min_ratings: usize,
    neighbors: usize,
    similarity_floor: f64,
    like_threshold: f64,
    score_weight: f64,
}

impl UserBasedCollaborative {
    pub fn new(config: &CollaborativeConfig) -> Self {
        Self {
            min_ratings: config.min_ratings,
            neighbors: config.neighbors,
            similarity_floor: config.similarity_floor,
            like_threshold: config.like_threshold,
            score_weight: config.score_weight,
        }
    }

    /// `rated` is every rating interaction in the system; `user_history` is the
    /// target user's full history, used to exclude anything they already touched.
    pub fn recommend(
        &self,
        user_id: UserId,
        rated: &[Interaction],
        user_history: &[Interaction],
        count: usize,
    ) -> RecommendResult<Vec<Candidate>> {
        let matrix = RatingMatrix::from_interactions(rated);

        if matrix.rated_pairs() < self.min_ratings {
            return Err(RecommendError::InsufficientData(format!(
                "{} rated pairs, need at least {}",
                matrix.rated_pairs(),
                self.min_ratings
            )));
        }

        let row = matrix.user_row(user_id).ok_or_else(|| {
            RecommendError::InsufficientData(format!("user {} has not rated anything", user_id))
        })?;

        let seen: HashSet<ProductId> = user_history.iter().map(|i| i.product_id).collect();
        let mut best: HashMap<ProductId, f64> = HashMap::new();

        for (_neighbor_id, neighbor_row, similarity) in matrix.neighbors(row).into_iter().take(self.neighbors) {
            if !similarity.is_finite() {
                return Err(RecommendError::ComputationFailure(format!(
                    "non-finite similarity between user {} and a neighbour",
                    user_id
                )));
            }
            if similarity < self.similarity_floor {
                continue;
            }

            let score = similarity * self.score_weight;
            for product_id in matrix.liked_products(neighbor_row, self.like_threshold) {
                if seen.contains(&product_id) {
                    continue;
                }
                let entry = best.entry(product_id).or_insert(score);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut candidates: Vec<Candidate> = best
            .into_iter()
            .map(|(product_id, score)| {
                let similarity = score / self.score_weight;
                Candidate::new(
                    product_id,
                    score,
                    Algorithm::Collaborative,
                    format!(
                        "Users with similar preferences have highly rated this product (similarity: {:.0}%)",
                        similarity * 100.0
                    ),
                )
            })
            .collect();

        rank_candidates(&mut candidates);
        candidates.truncate(count);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommendationConfig;

    fn model() -> UserBasedCollaborative {
        UserBasedCollaborative::new(&RecommendationConfig::default().collaborative)
    }

    #[test]
    fn test_rating_matrix_averages_repeated_ratings() {
        let interactions = vec![
            Interaction::rated(1, 10, 4),
            Interaction::rated(1, 10, 2),
            Interaction::rated(2, 11, 5),
            Interaction::new(2, 12, InteractionType::Purchase),
        ];
        let matrix = RatingMatrix::from_interactions(&interactions);

        assert_eq!(matrix.rated_pairs(), 2);
        let row = matrix.user_row(1).unwrap();
        assert_eq!(matrix.rating(row, 10), 3.0);
        assert_eq!(matrix.rating(row, 11), 0.0);
        assert_eq!(matrix.rating(row, 12), 0.0);
    }

    #[test]
    fn test_too_few_ratings_is_insufficient_data() {
        let rated = vec![Interaction::rated(1, 1, 5), Interaction::rated(2, 1, 5)];
        let result = model().recommend(1, &rated, &rated[..1], 5);
        assert!(matches!(result, Err(RecommendError::InsufficientData(_))));
    }

    #[test]
    fn test_neighbour_products_are_scored_by_similarity() {
        // Users 1 and 2 agree on 1 and 2; user 3 also liked 3; user 4 is unrelated.
        let rated = vec![
            Interaction::rated(1, 1, 5),
            Interaction::rated(1, 2, 4),
            Interaction::rated(2, 1, 5),
            Interaction::rated(2, 2, 4),
            Interaction::rated(3, 1, 5),
            Interaction::rated(3, 2, 4),
            Interaction::rated(3, 3, 5),
            Interaction::rated(4, 5, 5),
            Interaction::rated(4, 6, 4),
            Interaction::rated(4, 7, 3),
        ];
        let history: Vec<Interaction> = rated.iter().filter(|i| i.user_id == 1).cloned().collect();

        let candidates = model().recommend(1, &rated, &history, 5).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product_id, 3);
        assert_eq!(candidates[0].algorithm, Algorithm::Collaborative);

        let matrix = RatingMatrix::from_interactions(&rated);
        let expected = row_cosine_similarity(
            &matrix.values,
            matrix.user_row(1).unwrap(),
            matrix.user_row(3).unwrap(),
        ) * 0.8;
        assert!((candidates[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_excludes_products_user_interacted_with() {
        let mut rated = vec![
            Interaction::rated(1, 1, 5),
            Interaction::rated(2, 1, 5),
            Interaction::rated(2, 2, 5),
            Interaction::rated(2, 3, 5),
        ];
        for u in 10..16 {
            rated.push(Interaction::rated(u, 99, 1));
        }
        let history = vec![rated[0].clone(), Interaction::new(1, 2, InteractionType::View)];

        let candidates = model().recommend(1, &rated, &history, 5).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_only_closest_neighbours_contribute() {
        // Users 2..=8 share user 1's taste on 1 and 2; each extra low rating
        // pushes a user further away, so users 7 and 8 fall outside the top 5.
        let mut rated = vec![Interaction::rated(1, 1, 5), Interaction::rated(1, 2, 5)];
        for u in 2..=8 {
            rated.push(Interaction::rated(u, 1, 5));
            rated.push(Interaction::rated(u, 2, 5));
            rated.push(Interaction::rated(u, 100 + u, 5));
            for j in 0..(u - 2) {
                rated.push(Interaction::rated(u, 200 + 10 * u + j, 1));
            }
        }
        let history = rated[..2].to_vec();

        let candidates = model().recommend(1, &rated, &history, 10).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![102, 103, 104, 105, 106]);
    }

    #[test]
    fn test_weakly_similar_neighbour_is_ignored() {
        // User 3 shares product 1 only through a low rating: similarity 1/sqrt(101).
        let mut rated = vec![
            Interaction::rated(1, 1, 5),
            Interaction::rated(2, 1, 5),
            Interaction::rated(2, 2, 5),
            Interaction::rated(3, 1, 1),
            Interaction::rated(3, 3, 5),
            Interaction::rated(3, 4, 5),
            Interaction::rated(3, 5, 5),
            Interaction::rated(3, 6, 5),
        ];
        rated.extend((10..12).map(|u| Interaction::rated(u, 99, 1)));

        let matrix = RatingMatrix::from_interactions(&rated);
        let similarity = row_cosine_similarity(
            &matrix.values,
            matrix.user_row(1).unwrap(),
            matrix.user_row(3).unwrap(),
        );
        assert!(similarity > 0.0 && similarity < 0.1);

        let candidates = model().recommend(1, &rated, &rated[..1], 10).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_minimum_rated_pairs_boundary() {
        let rated_with_padding = |padding: i64| {
            let mut rated = vec![
                Interaction::rated(1, 1, 5),
                Interaction::rated(2, 1, 5),
                Interaction::rated(2, 2, 5),
            ];
            rated.extend((0..padding).map(|u| Interaction::rated(10 + u, 99, 1)));
            rated
        };

        let nine = rated_with_padding(6);
        assert_eq!(RatingMatrix::from_interactions(&nine).rated_pairs(), 9);
        assert!(matches!(
            model().recommend(1, &nine, &nine[..1], 5),
            Err(RecommendError::InsufficientData(_))
        ));

        let ten = rated_with_padding(7);
        assert_eq!(RatingMatrix::from_interactions(&ten).rated_pairs(), 10);
        let candidates = model().recommend(1, &ten, &ten[..1], 5).unwrap();
        assert_eq!(candidates.iter().map(|c| c.product_id).collect::<Vec<_>>(), vec![2]);
    }
}
