//! Sample catalog and users, plus a synthetic dataset generator for benches.

use crate::models::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn sample_products() -> Vec<Product> {
    vec![
        Product::new(1, "Wireless Bluetooth Headphones", "Electronics",
            "Premium quality wireless headphones with noise cancellation and 30-hour battery life", 79.99),
        Product::new(2, "Smart Fitness Tracker", "Electronics",
            "Advanced fitness tracker with heart rate monitor, GPS, and waterproof design", 129.99),
        Product::new(3, "Organic Cotton T-Shirt", "Clothing",
            "Sustainable organic cotton t-shirt available in multiple colors and sizes", 24.99),
        Product::new(4, "Stainless Steel Water Bottle", "Home & Kitchen",
            "Double-wall insulated water bottle keeps drinks cold for 24 hours", 19.99),
        Product::new(5, "Portable Bluetooth Speaker", "Electronics",
            "Compact wireless speaker with excellent sound quality and 12-hour battery", 45.99),
        Product::new(6, "Premium Yoga Mat", "Sports & Fitness",
            "Non-slip yoga mat with superior grip and cushioning for all workout types", 34.99),
        Product::new(7, "Smart Coffee Maker", "Home & Kitchen",
            "12-cup programmable coffee maker with thermal carafe and mobile app control", 89.99),
        Product::new(8, "Professional Running Shoes", "Sports & Fitness",
            "Lightweight running shoes with superior cushioning and breathable mesh upper", 119.99),
        Product::new(9, "Wireless Charging Station", "Electronics",
            "Multi-device wireless charging pad with fast charging for phones and earbuds", 39.99),
        Product::new(10, "Chef Kitchen Knife Set", "Home & Kitchen",
            "Professional ceramic knife set with ergonomic handles and protective cases", 59.99),
    ]
}

pub fn sample_users() -> Vec<User> {
    vec![
        User::new(1, "Alice Johnson", "alice@example.com"),
        User::new(2, "Bob Smith", "bob@example.com"),
        User::new(3, "Carol Davis", "carol@example.com"),
        User::new(4, "David Wilson", "david@example.com"),
        User::new(5, "Emma Brown", "emma@example.com"),
    ]
}

/// Synthetic catalog, users and interactions drawn from a seeded RNG so that
/// runs are reproducible.
pub struct SyntheticDataset {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub interactions: Vec<Interaction>,
}

const CATEGORIES: &[&str] = &["Electronics", "Clothing", "Home & Kitchen", "Sports & Fitness", "Books"];
const WORDS: &[&str] = &[
    "wireless", "organic", "portable", "premium", "compact", "durable", "smart", "lightweight",
    "waterproof", "ergonomic", "stainless", "insulated", "breathable", "rechargeable", "cotton",
    "leather", "ceramic", "bluetooth", "cushioned", "adjustable",
];

pub fn synthetic_dataset(users: usize, products: usize, interactions_per_user: usize, seed: u64) -> SyntheticDataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let products: Vec<Product> = (1..=products as i64)
        .map(|id| {
            let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
            let description: Vec<&str> = (0..6).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();
            Product::new(id, &format!("Product {}", id), category, &description.join(" "), rng.gen_range(5.0..200.0))
        })
        .collect();

    let users: Vec<User> = (1..=users as i64)
        .map(|id| User::new(id, &format!("User {}", id), &format!("user{}@example.com", id)))
        .collect();

    let mut interactions = Vec::with_capacity(users.len() * interactions_per_user);
    for user in &users {
        for _ in 0..interactions_per_user {
            let product_id = rng.gen_range(1..=products.len() as i64);
            let interaction = match rng.gen_range(0..5) {
                0 => Interaction::new(user.id, product_id, InteractionType::View),
                1 => Interaction::new(user.id, product_id, InteractionType::Click),
                2 => Interaction::new(user.id, product_id, InteractionType::Favorite),
                3 => Interaction::new(user.id, product_id, InteractionType::Purchase),
                _ => Interaction::rated(user.id, product_id, rng.gen_range(1..=5)),
            };
            interactions.push(interaction);
        }
    }

    SyntheticDataset {
        users,
        products,
        interactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_catalog_ids_are_unique() {
        let products = sample_products();
        let mut ids: Vec<_> = products.iter().map(|p| p.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_eq!(sample_users().len(), 5);
    }

    #[test]
    fn test_synthetic_dataset_is_reproducible() {
        let a = synthetic_dataset(5, 20, 4, 42);
        let b = synthetic_dataset(5, 20, 4, 42);
        assert_eq!(a.interactions.len(), 20);
        let key = |d: &SyntheticDataset| -> Vec<(i64, i64, Option<u8>)> {
            d.interactions.iter().map(|i| (i.user_id, i.product_id, i.rating)).collect()
        };
        assert_eq!(key(&a), key(&b));
        assert_eq!(a.products[3].category, b.products[3].category);
    }
}
