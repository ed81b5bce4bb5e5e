pub mod error;
pub mod pagination;
pub mod response;

use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{
    repository::{InMemoryUserRepository, PostgresUserRepository, UserRepository},
    token::TokenService,
};
use crate::exercise::repository::{
    ExerciseRepository, InMemoryExerciseRepository, PostgresExerciseRepository,
};
use crate::template::repository::{
    InMemoryTemplateRepository, PostgresTemplateRepository, TemplateRepository,
};
use crate::workout::repository::{
    InMemoryWorkoutRepository, PostgresWorkoutRepository, WorkoutRepository,
};

pub use error::{AppError, ErrorKind};

/// Settings the credential handlers need besides the token service
#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cookie_secure: false,
        }
    }
}

/// Orders reference-guarded deletes against the aggregate writes that add
/// references. Writers hold it shared from their reference checks until the
/// write lands; a guarded delete holds it exclusively from its usage check
/// until the row is gone.
pub type ReferenceGate = Arc<RwLock<()>>;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub user_repository: Arc<dyn UserRepository>,
    pub exercise_repository: Arc<dyn ExerciseRepository>,
    pub template_repository: Arc<dyn TemplateRepository>,
    pub workout_repository: Arc<dyn WorkoutRepository>,
    pub token_service: Arc<TokenService>,
    pub auth_settings: AuthSettings,
    pub reference_gate: ReferenceGate,
}

impl AppState {
    pub fn new(
        user_repository: Arc<dyn UserRepository>,
        exercise_repository: Arc<dyn ExerciseRepository>,
        template_repository: Arc<dyn TemplateRepository>,
        workout_repository: Arc<dyn WorkoutRepository>,
        token_service: Arc<TokenService>,
        auth_settings: AuthSettings,
    ) -> Self {
        Self {
            user_repository,
            exercise_repository,
            template_repository,
            workout_repository,
            token_service,
            auth_settings,
            reference_gate: Arc::new(RwLock::new(())),
        }
    }

    /// State backed by PostgreSQL repositories sharing one pool
    pub fn postgres(pool: PgPool, token_service: TokenService, auth_settings: AuthSettings) -> Self {
        Self::new(
            Arc::new(PostgresUserRepository::new(pool.clone())),
            Arc::new(PostgresExerciseRepository::new(pool.clone())),
            Arc::new(PostgresTemplateRepository::new(pool.clone())),
            Arc::new(PostgresWorkoutRepository::new(pool)),
            Arc::new(token_service),
            auth_settings,
        )
    }

    /// State backed by in-memory repositories, for development and tests.
    /// Data is lost when the process exits.
    pub fn in_memory(token_service: TokenService, auth_settings: AuthSettings) -> Self {
        Self::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryExerciseRepository::new()),
            Arc::new(InMemoryTemplateRepository::new()),
            Arc::new(InMemoryWorkoutRepository::new()),
            Arc::new(token_service),
            auth_settings,
        )
    }
}

/// Parses a path id, rejecting anything that is not a positive integer
pub fn parse_id(raw: &str, entity: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid {} ID", entity)))
}
