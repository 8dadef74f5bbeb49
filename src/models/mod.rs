use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RecommendError;

pub type UserId = i64;
pub type ProductId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    View,
    Click,
    Rating,
    Favorite,
    Purchase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub interaction_type: InteractionType,
    pub rating: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

/// An interaction as submitted by a caller, before the log assigns it an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[serde(default = "default_interaction_type")]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub rating: Option<u8>,
}

fn default_interaction_type() -> InteractionType {
    InteractionType::View
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "popularity")]
    Popularity,
    #[serde(rename = "collaborative")]
    Collaborative,
    #[serde(rename = "content-based")]
    ContentBased,
    #[serde(rename = "hybrid")]
    Hybrid,
}

/// A scored product produced during a single generation pass. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub product_id: ProductId,
    pub score: f64,
    pub algorithm: Algorithm,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub score: f64,
    pub explanation: String,
    pub algorithm: Algorithm,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A stored recommendation joined with the product it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationView {
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAffinity {
    pub category: String,
    pub count: usize,
}

/// Per-pass summary of a user's history, handed to explanation generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: UserId,
    pub name: String,
    pub interaction_count: usize,
    pub favorite_categories: Vec<CategoryAffinity>,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPreference {
    pub category: String,
    pub interaction_count: usize,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user: User,
    pub interaction_counts: HashMap<InteractionType, usize>,
    pub category_preferences: Vec<CategoryPreference>,
    pub recent_activity: Vec<Interaction>,
    pub total_interactions: usize,
}

impl InteractionType {
    pub const ALL: [InteractionType; 5] = [
        InteractionType::View,
        InteractionType::Click,
        InteractionType::Rating,
        InteractionType::Favorite,
        InteractionType::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::Rating => "rating",
            InteractionType::Favorite => "favorite",
            InteractionType::Purchase => "purchase",
        }
    }

    /// Interactions strong enough to warrant regenerating recommendations.
    pub fn is_significant(&self) -> bool {
        matches!(
            self,
            InteractionType::Rating | InteractionType::Favorite | InteractionType::Purchase
        )
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InteractionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                RecommendError::InvalidInput(format!(
                    "Invalid interaction_type '{}'. Must be one of: view, click, rating, favorite, purchase",
                    s
                ))
            })
    }
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Popularity => "popularity",
            Algorithm::Collaborative => "collaborative",
            Algorithm::ContentBased => "content-based",
            Algorithm::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popularity" => Ok(Algorithm::Popularity),
            "collaborative" => Ok(Algorithm::Collaborative),
            "content-based" => Ok(Algorithm::ContentBased),
            "hybrid" => Ok(Algorithm::Hybrid),
            other => Err(RecommendError::InvalidInput(format!("Unknown algorithm tag '{}'", other))),
        }
    }
}

impl Product {
    pub fn new(id: ProductId, name: &str, category: &str, description: &str, price: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            category: category.to_string(),
            description: Some(description.to_string()),
            price,
            created_at: Utc::now(),
        }
    }

    /// Text the content model indexes: the category followed by the description.
    pub fn feature_text(&self) -> String {
        format!("{} {}", self.category, self.description.as_deref().unwrap_or(""))
    }
}

impl User {
    pub fn new(id: UserId, name: &str, email: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Interaction {
    pub fn from_new(new: NewInteraction) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            product_id: new.product_id,
            interaction_type: new.interaction_type,
            rating: new.rating,
            timestamp: Utc::now(),
        }
    }

    pub fn new(user_id: UserId, product_id: ProductId, interaction_type: InteractionType) -> Self {
        Self::from_new(NewInteraction {
            user_id,
            product_id,
            interaction_type,
            rating: None,
        })
    }

    pub fn rated(user_id: UserId, product_id: ProductId, rating: u8) -> Self {
        Self::from_new(NewInteraction {
            user_id,
            product_id,
            interaction_type: InteractionType::Rating,
            rating: Some(rating),
        })
    }

    pub fn is_rating(&self) -> bool {
        self.interaction_type == InteractionType::Rating && self.rating.is_some()
    }
}

impl Candidate {
    pub fn new(product_id: ProductId, score: f64, algorithm: Algorithm, explanation: String) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            product_id,
            score,
            algorithm,
            explanation,
        }
    }
}

/// Orders candidates by descending score, breaking ties by ascending product id.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.product_id.cmp(&b.product_id))
    });
}

impl UserContext {
    pub fn from_history(user: &User, interactions: &[Interaction], products: &[Product]) -> Self {
        let categories: HashMap<ProductId, &str> = products
            .iter()
            .map(|p| (p.id, p.category.as_str()))
            .collect();

        let mut per_category: HashMap<&str, usize> = HashMap::new();
        for interaction in interactions {
            if let Some(category) = categories.get(&interaction.product_id) {
                *per_category.entry(category).or_insert(0) += 1;
            }
        }

        let mut favorite_categories: Vec<CategoryAffinity> = per_category
            .into_iter()
            .map(|(category, count)| CategoryAffinity {
                category: category.to_string(),
                count,
            })
            .collect();
        favorite_categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        favorite_categories.truncate(5);

        let ratings: Vec<f64> = interactions
            .iter()
            .filter(|i| i.is_rating())
            .filter_map(|i| i.rating.map(f64::from))
            .collect();
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
            (mean * 10.0).round() / 10.0
        };

        Self {
            user_id: user.id,
            name: user.name.clone(),
            interaction_count: interactions.len(),
            favorite_categories,
            average_rating,
        }
    }
}
