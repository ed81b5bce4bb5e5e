use tracing::debug;

use crate::shared::AppError;

/// Hashes a password with bcrypt on the blocking pool
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal("Failed to process password", e))?
        .map_err(|e| AppError::internal("Failed to process password", e))
}

/// Checks a password against a stored hash. A malformed hash counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal("Failed to verify password", e))?;

    match outcome {
        Ok(matches) => Ok(matches),
        Err(e) => {
            debug!(error = %e, "Stored password hash could not be parsed");
            Ok(false)
        }
    }
}
