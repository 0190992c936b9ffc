use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::{StatsDelta, User};

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    // A plain UNIQUE column ignores NULLs, which gives usernames their
    // sparse uniqueness.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            external_id VARCHAR PRIMARY KEY,
            username VARCHAR UNIQUE,
            games_played BIGINT NOT NULL DEFAULT 0 CHECK (games_played >= 0),
            attempts_correct BIGINT NOT NULL DEFAULT 0 CHECK (attempts_correct >= 0),
            attempts_wrong BIGINT NOT NULL DEFAULT 0 CHECK (attempts_wrong >= 0),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Durable user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert with zeroed counters, or set the username of an existing user.
    async fn upsert(&self, external_id: &str, username: Option<&str>) -> Result<User, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, external_id: &str) -> Result<bool, StoreError>;

    async fn find(&self, external_id: &str) -> Result<Option<User>, StoreError>;

    /// Applies the delta in one step. `None` when the user does not exist.
    async fn increment(&self, external_id: &str, delta: StatsDelta) -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQLSTATE for `numeric_value_out_of_range`.
const OUT_OF_RANGE: &str = "22003";

fn map_counter_overflow(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some(OUT_OF_RANGE) => {
            StoreError::CounterOverflow
        }
        other => StoreError::Database(other),
    }
}

fn map_username_conflict(e: sqlx::Error, username: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            if let Some(name) = username {
                return StoreError::UsernameTaken(name.to_string());
            }
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn upsert(&self, external_id: &str, username: Option<&str>) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (external_id, username) VALUES ($1, $2)
            ON CONFLICT (external_id) DO UPDATE SET username = EXCLUDED.username
            RETURNING external_id, username, games_played, attempts_correct, attempts_wrong
            "#,
        )
        .bind(external_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_username_conflict(e, username))
    }

    async fn delete(&self, external_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT external_id, username, games_played, attempts_correct, attempts_wrong FROM users WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn increment(&self, external_id: &str, delta: StatsDelta) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                games_played = games_played + $2,
                attempts_correct = attempts_correct + $3,
                attempts_wrong = attempts_wrong + $4
            WHERE external_id = $1
            RETURNING external_id, username, games_played, attempts_correct, attempts_wrong
            "#,
        )
        .bind(external_id)
        .bind(delta.games_played_inc)
        .bind(delta.attempts_correct_inc)
        .bind(delta.attempts_wrong_inc)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_counter_overflow)?;
        Ok(user)
    }
}

/// Process-local store with the same semantics as the Postgres one.
/// Every operation runs under a single lock.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Puts a fully formed record in place, counters included.
    pub fn insert(&self, user: User) {
        self.lock().insert(user.external_id.clone(), user);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert(&self, external_id: &str, username: Option<&str>) -> Result<User, StoreError> {
        let mut users = self.lock();
        if let Some(name) = username {
            let taken = users
                .values()
                .any(|u| u.external_id != external_id && u.username.as_deref() == Some(name));
            if taken {
                return Err(StoreError::UsernameTaken(name.to_string()));
            }
        }
        let user = users
            .entry(external_id.to_string())
            .or_insert_with(|| User::new(external_id, None));
        user.username = username.map(str::to_string);
        Ok(user.clone())
    }

    async fn delete(&self, external_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().remove(external_id).is_some())
    }

    async fn find(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().get(external_id).cloned())
    }

    async fn increment(&self, external_id: &str, delta: StatsDelta) -> Result<Option<User>, StoreError> {
        let mut users = self.lock();
        let Some(user) = users.get_mut(external_id) else {
            return Ok(None);
        };
        let (Some(games_played), Some(attempts_correct), Some(attempts_wrong)) = (
            user.games_played.checked_add(delta.games_played_inc),
            user.attempts_correct.checked_add(delta.attempts_correct_inc),
            user.attempts_wrong.checked_add(delta.attempts_wrong_inc),
        ) else {
            return Err(StoreError::CounterOverflow);
        };
        user.games_played = games_played;
        user.attempts_correct = attempts_correct;
        user.attempts_wrong = attempts_wrong;
        Ok(Some(user.clone()))
    }
}
