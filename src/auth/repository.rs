use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{NewUser, UserModel};
use crate::db::classify;
use crate::shared::AppError;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, created_at, updated_at, deleted_at";

/// Credential store. Lookups only ever see live (not soft-deleted) users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a user; a taken username or email yields `DuplicateEntry`
    async fn create_user(&self, user: &NewUser) -> Result<UserModel, AppError>;
    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserModel>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError>;
    async fn exists_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<bool, AppError>;
}

fn duplicate_user() -> AppError {
    AppError::DuplicateEntry("User with this email or username already exists".to_string())
}

/// In-memory implementation of UserRepository for development and testing
pub struct InMemoryUserRepository {
    users: Mutex<BTreeMap<i64, UserModel>>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the current number of users in the repository
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: &NewUser) -> Result<UserModel, AppError> {
        let mut users = self.users.lock().unwrap();

        let taken = users.values().any(|u| {
            u.deleted_at.is_none() && (u.email == user.email || u.username == user.username)
        });
        if taken {
            warn!("User already exists in memory");
            return Err(duplicate_user());
        }

        let now = Utc::now();
        let id = users.keys().next_back().copied().unwrap_or(0) + 1;
        let model = UserModel {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.insert(id, model.clone());

        debug!(user_id = id, "User created in memory");
        Ok(model)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .get(&user_id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.deleted_at.is_none() && u.email == email)
            .cloned())
    }

    async fn exists_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<bool, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().any(|u| {
            u.deleted_at.is_none() && (u.email == email || u.username == username)
        }))
    }
}

/// PostgreSQL implementation of the credential store
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: &NewUser) -> Result<UserModel, AppError> {
        debug!("Creating user in database");

        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserModel>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match classify("Failed to create user")(e) {
                AppError::DuplicateEntry(_) => duplicate_user(),
                other => other,
            })
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserModel>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify("Failed to fetch user"))
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserModel>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify("Failed to fetch user"))
    }

    #[instrument(skip(self))]
    async fn exists_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE (email = $1 OR username = $2) AND deleted_at IS NULL)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to check existing users"))
    }
}
