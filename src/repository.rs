//! Durable-store access.
//!
//! `CodeRepository` owns the persisted-code rows; `IdentityResolver`
//! translates the numeric user id carried in staging keys into the username
//! the durable rows are keyed by. Both are traits so the committer can be
//! exercised against mocks.
use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AutosaveError;

#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Insert or overwrite the row for the triple. Never produces a second
    /// row for the same (problem, username, language).
    async fn upsert(
        &self,
        problem_id: u64,
        username: &str,
        language: &str,
        code: &str,
    ) -> Result<(), AutosaveError>;

    async fn find(
        &self,
        problem_id: u64,
        username: &str,
        language: &str,
    ) -> Result<Option<String>, AutosaveError>;
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, user_id: u64) -> Result<Option<String>, AutosaveError>;
}

pub struct PgCodeRepository {
    pool: PgPool,
}

impl PgCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeRepository for PgCodeRepository {
    async fn upsert(
        &self,
        problem_id: u64,
        username: &str,
        language: &str,
        code: &str,
    ) -> Result<(), AutosaveError> {
        sqlx::query(
            "INSERT INTO problem_code (problem_id, username, language, code, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (problem_id, username, language) \
             DO UPDATE SET code = EXCLUDED.code, updated_at = now()",
        )
        .bind(problem_id as i64)
        .bind(username)
        .bind(language)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        problem_id: u64,
        username: &str,
        language: &str,
    ) -> Result<Option<String>, AutosaveError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT code FROM problem_code \
             WHERE problem_id = $1 AND username = $2 AND language = $3",
        )
        .bind(problem_id as i64)
        .bind(username)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(code,)| code))
    }
}

pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    async fn resolve(&self, user_id: u64) -> Result<Option<String>, AutosaveError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id = $1")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(username,)| username))
    }
}
