use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One product card scraped from a search results page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct Product {
    pub title: String,
    /// Formatted price, currency symbol included.
    pub price: String,
    /// Image URL.
    pub picture: String,
}

pub const TITLE_NOT_FOUND: &str = "Title Not Found";
pub const PRICE_NOT_FOUND: &str = "Price Not Found";
pub const IMAGE_NOT_FOUND: &str = "Image Not Found";

/// Title, price and image of a single item page.
///
/// Serialized as a three element array `[title, price, imageUrl]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ItemDetails(pub String, pub String, pub String);

impl ItemDetails {
    pub fn title(&self) -> &str {
        &self.0
    }

    pub fn price(&self) -> &str {
        &self.1
    }

    pub fn image(&self) -> &str {
        &self.2
    }
}

/// A stored user, keyed by the identity issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub external_id: String,
    pub username: Option<String>,
    pub games_played: i64,
    pub attempts_correct: i64,
    pub attempts_wrong: i64,
}

impl User {
    pub fn new(external_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            external_id: external_id.into(),
            username,
            games_played: 0,
            attempts_correct: 0,
            attempts_wrong: 0,
        }
    }

    pub fn stats(&self) -> UserStats {
        UserStats {
            username: self.username.clone(),
            games_played: self.games_played,
            attempts_correct: self.attempts_correct,
            attempts_wrong: self.attempts_wrong,
        }
    }
}

/// Public view of a user's counters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub username: Option<String>,
    pub games_played: i64,
    pub attempts_correct: i64,
    pub attempts_wrong: i64,
}

/// Increments applied to a user's counters. Missing fields count as zero.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsDelta {
    #[serde(default)]
    pub games_played_inc: i64,
    #[serde(default)]
    pub attempts_correct_inc: i64,
    #[serde(default)]
    pub attempts_wrong_inc: i64,
}

impl StatsDelta {
    /// Name of the first field that would drive a counter below zero.
    pub fn first_negative(&self) -> Option<&'static str> {
        if self.games_played_inc < 0 {
            Some("gamesPlayedInc")
        } else if self.attempts_correct_inc < 0 {
            Some("attemptsCorrectInc")
        } else if self.attempts_wrong_inc < 0 {
            Some("attemptsWrongInc")
        } else {
            None
        }
    }
}
