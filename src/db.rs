//! Connection pool, migrations and the transaction boundary used for
//! every multi-row write.
//!
//! An atomic unit is opened with [`begin`], the steps run against the
//! transaction and return a `Result`, and [`finish`] commits on `Ok` or rolls
//! back on `Err`. If a step panics the transaction is dropped without a commit,
//! which sqlx turns into a rollback as well.

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::shared::AppError;

pub type Tx = Transaction<'static, Postgres>;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

pub async fn begin(pool: &PgPool) -> Result<Tx, AppError> {
    pool.begin()
        .await
        .map_err(|e| AppError::database("Failed to start transaction", e))
}

/// Commits `tx` if every step succeeded, otherwise rolls it back and returns
/// the step's error unchanged.
pub async fn finish<T>(tx: Tx, result: Result<T, AppError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| AppError::database("Failed to commit transaction", e))?;
            debug!("Transaction committed");
            Ok(value)
        }
        Err(err) => {
            match tx.rollback().await {
                Ok(()) => debug!(error = %err, "Transaction rolled back"),
                Err(rollback_err) => {
                    warn!(error = %rollback_err, "Failed to roll back transaction")
                }
            }
            Err(err)
        }
    }
}

/// Maps a sqlx error to an application error. Constraint violations become
/// client errors; everything else is reported as a database failure with
/// `context` as the public message.
pub fn classify(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return AppError::DuplicateEntry("Record already exists".to_string())
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return AppError::InvalidInput(
                        "Referenced record does not exist".to_string(),
                    )
                }
                sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::NotNullViolation => {
                    return AppError::InvalidInput("Value violates a constraint".to_string())
                }
                _ => {}
            }
        }
        warn!(error = %e, context, "Database operation failed");
        AppError::database(context, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_generic_error_keeps_context() {
        let err = classify("Failed to fetch template")(sqlx::Error::RowNotFound);
        match err {
            AppError::Database { message, .. } => assert_eq!(message, "Failed to fetch template"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_classify_pool_timeout_is_database_error() {
        let err = classify("Failed to list workouts")(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database { .. }));
    }
}
