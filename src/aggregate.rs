//! Checks shared by the template and workout write paths. They run before an
//! atomic unit is opened, so a rejected request never touches the store.

use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use crate::exercise::{models::ExerciseModel, repository::ExerciseRepository};
use crate::shared::AppError;

pub fn invalid_exercises() -> AppError {
    AppError::InvalidInput("One or more exercise IDs are invalid".to_string())
}

/// Sorted, deduplicated copy of `ids`
pub fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    ids.iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Template lines may reference each exercise only once
pub fn ensure_distinct_exercises(ids: &[i64]) -> Result<(), AppError> {
    let mut seen = BTreeSet::new();
    if ids.iter().all(|id| seen.insert(*id)) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(
            "Duplicate exercise IDs not allowed".to_string(),
        ))
    }
}

/// Single batch lookup: every referenced exercise must exist in the catalog
pub async fn verify_exercises_exist(
    repository: &dyn ExerciseRepository,
    ids: &[i64],
) -> Result<(), AppError> {
    let wanted = distinct_ids(ids);
    let found = repository.count_existing(&wanted).await?;

    if found != wanted.len() as i64 {
        warn!(
            requested = wanted.len(),
            found, "Request references unknown exercises"
        );
        return Err(invalid_exercises());
    }
    Ok(())
}

/// Exercise details keyed by id, for decorating aggregate responses
pub async fn exercise_lookup(
    repository: &dyn ExerciseRepository,
    ids: &[i64],
) -> Result<HashMap<i64, ExerciseModel>, AppError> {
    let exercises = repository.find_by_ids(&distinct_ids(ids)).await?;
    Ok(exercises.into_iter().map(|e| (e.id, e)).collect())
}
