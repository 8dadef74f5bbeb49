use crate::config::{ExplanationBackend, ExplanationConfig};
use crate::models::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Turns a recommendation into a sentence for the user. Implementations must
/// not fail: on any internal error they return a generic sentence instead.
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    async fn explain(&self, user: &UserContext, product: &Product, algorithm: Algorithm) -> String;
}

const TEMPLATES: &[&str] = &[
    "Based on your interest in {category} products and previous purchases, this {product} aligns with your preferences.",
    "Users with similar shopping patterns to yours have highly rated this {product}. Your preference for {category} products makes this a strong match.",
    "This {product} complements your recent activity and fits the {category} items you keep coming back to.",
    "Given your positive ratings for {category} products, this {product} matches the quality you look for.",
    "Your interaction history shows a strong preference for {category} items, and this {product} is well reviewed by shoppers like you.",
    "Based on your history and the ratings you've given to similar products, this {product} in {category} is likely to meet your expectations.",
];

const FALLBACK_EXPLANATION: &str = "Recommended for you based on your activity in our store.";

/// Fills one of a fixed set of templates. The template is picked from the
/// (user, product) pair, so the same pair always gets the same sentence.
#[derive(Debug, Clone, Default)]
pub struct TemplateExplainer;

impl TemplateExplainer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, user: &UserContext, product: &Product, algorithm: Algorithm) -> String {
        let category = product.category.trim().to_lowercase();
        let name = product.name.trim().to_lowercase();
        if category.is_empty() || name.is_empty() {
            return FALLBACK_EXPLANATION.to_string();
        }

        let slot = (user.user_id as u64)
            .wrapping_mul(31)
            .wrapping_add(product.id as u64)
            % TEMPLATES.len() as u64;

        let mut explanation = TEMPLATES[slot as usize]
            .replace("{category}", &category)
            .replace("{product}", &name);

        match algorithm {
            Algorithm::Collaborative => explanation.push_str(" Similar users have given this product high ratings."),
            Algorithm::ContentBased => explanation.push_str(" The product features match your demonstrated preferences."),
            Algorithm::Hybrid => explanation.push_str(" This recommendation combines both your preferences and community feedback."),
            Algorithm::Popularity => explanation.push_str(" It is also one of the most popular items right now."),
        }
        explanation
    }
}

#[async_trait]
impl ExplanationGenerator for TemplateExplainer {
    async fn explain(&self, user: &UserContext, product: &Product, algorithm: Algorithm) -> String {
        self.render(user, product, algorithm)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Asks an OpenAI-compatible chat completion endpoint for the explanation and
/// falls back to the template explainer on any failure.
pub struct GenerativeExplainer {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    fallback: TemplateExplainer,
}

impl GenerativeExplainer {
    pub fn new(config: &ExplanationConfig, api_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            fallback: TemplateExplainer::new(),
        }
    }

    fn prompt(user: &UserContext, product: &Product, algorithm: Algorithm) -> String {
        let categories: Vec<&str> = user
            .favorite_categories
            .iter()
            .map(|c| c.category.as_str())
            .collect();

        format!(
            "Write one or two friendly sentences explaining why a shopper should consider \"{}\" \
             (category: {}, price: ${:.2}). The shopper has {} past interactions, favours {}, \
             and gives an average rating of {:.1}. The recommendation came from the {} model.",
            product.name,
            product.category,
            product.price,
            user.interaction_count,
            if categories.is_empty() { "no particular category".to_string() } else { categories.join(", ") },
            user.average_rating,
            algorithm,
        )
    }

    async fn request(&self, user: &UserContext, product: &Product, algorithm: Algorithm) -> Result<String, String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You explain product recommendations for an online store.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::prompt(user, product, algorithm),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.7,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("endpoint returned {}", response.status()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| "response contained no text".to_string())
    }
}

#[async_trait]
impl ExplanationGenerator for GenerativeExplainer {
    async fn explain(&self, user: &UserContext, product: &Product, algorithm: Algorithm) -> String {
        match self.request(user, product, algorithm).await {
            Ok(text) => text,
            Err(reason) => {
                warn!(
                    user_id = user.user_id,
                    product_id = product.id,
                    "Generative explanation failed, using template: {}",
                    reason
                );
                self.fallback.render(user, product, algorithm)
            }
        }
    }
}

/// Chooses the explanation backend once, at construction time.
pub fn explainer_from_config(config: &ExplanationConfig) -> Arc<dyn ExplanationGenerator> {
    match (config.backend, config.api_key.as_deref()) {
        (ExplanationBackend::OpenAi, Some(key)) if !key.trim().is_empty() => {
            info!("Using generative explanations with model {}", config.model);
            Arc::new(GenerativeExplainer::new(config, key.to_string()))
        }
        (ExplanationBackend::OpenAi, _) => {
            warn!("Generative explanations requested but no API key configured, using templates");
            Arc::new(TemplateExplainer::new())
        }
        (ExplanationBackend::Template, _) => Arc::new(TemplateExplainer::new()),
    }
}
