use super::{CatalogStore, InteractionLog, RecommendationStore, UserDirectory};
use crate::config::PostgresConfig;
use crate::error::{RecommendError, RecommendResult};
use crate::models::*;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Postgres-backed implementation of every store trait.
///
/// The one-active-row-per-(user, product) invariant is enforced by a partial
/// unique index, and `upsert` is a single `INSERT .. ON CONFLICT` statement.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

const RECOMMENDATION_COLUMNS: &str =
    "id, user_id, product_id, score, explanation, algorithm, created_at, is_active";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PostgresConfig) -> RecommendResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!("Connected to Postgres with max {} connections", config.max_connections);
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> RecommendResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts the sample catalog and users when the products table is empty.
    /// Returns whether anything was written.
    pub async fn seed_sample_data(&self) -> RecommendResult<bool> {
        let existing: i64 = sqlx::query("SELECT COUNT(*)::BIGINT AS n FROM products")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        if existing > 0 {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for product in super::seed::sample_products() {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, description, price, category, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(&product.category)
            .bind(product.created_at)
            .execute(&mut *tx)
            .await?;
        }
        for user in super::seed::sample_users() {
            sqlx::query(
                "INSERT INTO users (id, name, email, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT (email) DO NOTHING",
            )
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.created_at)
            .execute(&mut *tx)
            .await?;
        }
        for table in ["products", "users"] {
            sqlx::query(&format!(
                "SELECT setval(pg_get_serial_sequence('{table}', 'id'), (SELECT MAX(id) FROM {table}))"
            ))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Seeded Postgres with sample catalog");
        Ok(true)
    }
}

fn user_from_row(row: &PgRow) -> RecommendResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> RecommendResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        created_at: row.try_get("created_at")?,
    })
}

fn interaction_from_row(row: &PgRow) -> RecommendResult<Interaction> {
    let kind: String = row.try_get("interaction_type")?;
    let rating: Option<i16> = row.try_get("rating")?;
    let rating = rating
        .map(|r| u8::try_from(r).map_err(|_| RecommendError::PersistenceFailure(format!("rating {} out of range", r))))
        .transpose()?;

    Ok(Interaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        interaction_type: kind.parse()?,
        rating,
        timestamp: row.try_get("timestamp")?,
    })
}

fn recommendation_from_row(row: &PgRow) -> RecommendResult<Recommendation> {
    let algorithm: String = row.try_get("algorithm")?;
    Ok(Recommendation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        score: row.try_get("score")?,
        explanation: row.try_get("explanation")?,
        algorithm: algorithm.parse()?,
        created_at: row.try_get("created_at")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user(&self, user_id: UserId) -> RecommendResult<Option<User>> {
        sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn list_users(&self) -> RecommendResult<Vec<User>> {
        sqlx::query("SELECT id, name, email, created_at FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn create_user(&self, name: &str, email: &str) -> RecommendResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id, name, email, created_at",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => user_from_row(&row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                RecommendError::InvalidInput("User with this email already exists".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self) -> RecommendResult<Vec<Product>> {
        sqlx::query("SELECT id, name, category, description, price, created_at FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(product_from_row)
            .collect()
    }

    async fn get_product(&self, product_id: ProductId) -> RecommendResult<Option<Product>> {
        sqlx::query("SELECT id, name, category, description, price, created_at FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(product_from_row)
            .transpose()
    }

    async fn categories(&self) -> RecommendResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT category FROM products ORDER BY category")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("category").map_err(RecommendError::from))
            .collect()
    }
}

#[async_trait]
impl InteractionLog for PgStore {
    async fn interactions_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Interaction>> {
        sqlx::query(
            r#"
            SELECT id, user_id, product_id, interaction_type, rating, timestamp
            FROM interactions
            WHERE user_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(interaction_from_row)
        .collect()
    }

    async fn all_rated_interactions(&self) -> RecommendResult<Vec<Interaction>> {
        sqlx::query(
            r#"
            SELECT id, user_id, product_id, interaction_type, rating, timestamp
            FROM interactions
            WHERE interaction_type = 'rating' AND rating IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(interaction_from_row)
        .collect()
    }

    async fn interaction_counts(&self) -> RecommendResult<HashMap<ProductId, usize>> {
        let rows = sqlx::query(
            "SELECT product_id, COUNT(*)::BIGINT AS n FROM interactions GROUP BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let product_id: i64 = row.try_get("product_id")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(product_id, n.max(0) as usize);
        }
        Ok(counts)
    }

    async fn append(&self, interaction: NewInteraction) -> RecommendResult<Interaction> {
        let interaction = Interaction::from_new(interaction);
        sqlx::query(
            r#"
            INSERT INTO interactions (id, user_id, product_id, interaction_type, rating, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.user_id)
        .bind(interaction.product_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.rating.map(i16::from))
        .bind(interaction.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(interaction)
    }
}

#[async_trait]
impl RecommendationStore for PgStore {
    async fn active_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>> {
        sqlx::query(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE user_id = $1 AND is_active ORDER BY score DESC, product_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(recommendation_from_row)
        .collect()
    }

    async fn deactivate(&self, recommendation: &Recommendation) -> RecommendResult<()> {
        let result = sqlx::query("UPDATE recommendations SET is_active = FALSE WHERE id = $1")
            .bind(recommendation.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RecommendError::NotFound(format!(
                "Recommendation {} not found",
                recommendation.id
            )));
        }
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
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO recommendations (id, user_id, product_id, score, explanation, algorithm, created_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), TRUE)
            ON CONFLICT (user_id, product_id) WHERE is_active
            DO UPDATE SET score = EXCLUDED.score,
                          explanation = EXCLUDED.explanation,
                          algorithm = EXCLUDED.algorithm,
                          created_at = NOW()
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(score)
        .bind(explanation)
        .bind(algorithm.as_str())
        .fetch_one(&self.pool)
        .await?;

        recommendation_from_row(&row)
    }

    async fn history_for_user(&self, user_id: UserId) -> RecommendResult<Vec<Recommendation>> {
        sqlx::query(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(recommendation_from_row)
        .collect()
    }
}
