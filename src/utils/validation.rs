use crate::error::{RecommendError, RecommendResult};
use crate::models::*;

fn invalid(message: impl Into<String>) -> RecommendError {
    RecommendError::InvalidInput(message.into())
}

pub fn validate_new_interaction(interaction: &NewInteraction) -> RecommendResult<()> {
    if interaction.user_id <= 0 {
        return Err(invalid("user_id must be a positive integer"));
    }

    if interaction.product_id <= 0 {
        return Err(invalid("product_id must be a positive integer"));
    }

    match (interaction.interaction_type, interaction.rating) {
        (InteractionType::Rating, None) => {
            Err(invalid("A rating interaction requires a rating between 1 and 5"))
        }
        (InteractionType::Rating, Some(rating)) if !(1..=5).contains(&rating) => {
            Err(invalid("Rating must be between 1 and 5"))
        }
        (InteractionType::Rating, Some(_)) => Ok(()),
        (other, Some(_)) => Err(invalid(format!(
            "Only rating interactions may carry a rating, got '{}'",
            other
        ))),
        (_, None) => Ok(()),
    }
}

pub fn validate_count(count: usize, max_count: usize) -> RecommendResult<()> {
    if count == 0 {
        return Err(invalid("Number of recommendations must be greater than 0"));
    }

    if count > max_count {
        return Err(invalid(format!(
            "Number of recommendations too large: {} (max {})",
            count, max_count
        )));
    }

    Ok(())
}

pub fn validate_new_user(name: &str, email: &str) -> RecommendResult<()> {
    if name.trim().is_empty() || email.trim().is_empty() {
        return Err(invalid("Name and email are required"));
    }

    if name.len() > 100 {
        return Err(invalid("Name too long (max 100 characters)"));
    }

    if email.len() > 120 || !email.contains('@') {
        return Err(invalid(format!("Invalid email address: {}", email)));
    }

    Ok(())
}

pub fn sanitize_string(input: &str, max_length: usize) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "-_.,!?&@".contains(*c))
        .take(max_length)
        .collect()
}
