use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    models::{normalize_email, NewUser, UserModel, DEFAULT_ROLE},
    password::{hash_password, verify_password},
    repository::UserRepository,
    token::TokenService,
    types::{LoginRequest, RegisterRequest},
};
use crate::shared::AppError;

/// Registration, login and identity lookups
pub struct AuthService {
    repository: Arc<dyn UserRepository>,
    token_service: Arc<TokenService>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        token_service: Arc<TokenService>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            repository,
            token_service,
            bcrypt_cost,
        }
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserModel, AppError> {
        request.validate()?;

        let email = normalize_email(&request.email);
        let username = request.username.trim().to_string();

        if self
            .repository
            .exists_by_email_or_username(&email, &username)
            .await?
        {
            warn!("Registration rejected, user already exists");
            return Err(AppError::DuplicateEntry(
                "User with this email or username already exists".to_string(),
            ));
        }

        let password_hash = hash_password(request.password, self.bcrypt_cost).await?;

        // The unique indexes still catch a concurrent registration of the same user
        let user = self
            .repository
            .create_user(&NewUser {
                username,
                email,
                password_hash,
                role: DEFAULT_ROLE.to_string(),
            })
            .await?;

        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Verifies credentials and issues a token. Unknown email and wrong password
    /// produce the same error.
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<String, AppError> {
        let email = normalize_email(&request.email);

        let Some(user) = self.repository.find_by_email(&email).await? else {
            warn!("Login failed");
            return Err(invalid_credentials());
        };

        if !verify_password(request.password, user.password_hash.clone()).await? {
            warn!(user_id = user.id, "Login failed");
            return Err(invalid_credentials());
        }

        let token = self.token_service.issue(user.id)?;
        info!(user_id = user.id, "User logged in");
        Ok(token)
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self, user_id: i64) -> Result<UserModel, AppError> {
        self.repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

fn invalid_credentials() -> AppError {
    AppError::Authentication("Invalid credentials".to_string())
}
