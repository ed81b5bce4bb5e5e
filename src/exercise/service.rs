use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    models::{ExerciseFilter, ExerciseInput},
    repository::{exercise_in_use, exercise_not_found, ExerciseRepository},
    types::ExerciseResponse,
};
use crate::shared::{pagination::PageParams, AppError, ReferenceGate};
use crate::template::repository::TemplateRepository;
use crate::workout::repository::WorkoutRepository;

/// Service for the exercise catalog
pub struct ExerciseService {
    repository: Arc<dyn ExerciseRepository>,
    template_repository: Arc<dyn TemplateRepository>,
    workout_repository: Arc<dyn WorkoutRepository>,
    reference_gate: ReferenceGate,
}

impl ExerciseService {
    pub fn new(
        repository: Arc<dyn ExerciseRepository>,
        template_repository: Arc<dyn TemplateRepository>,
        workout_repository: Arc<dyn WorkoutRepository>,
        reference_gate: ReferenceGate,
    ) -> Self {
        Self {
            repository,
            template_repository,
            workout_repository,
            reference_gate,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create_exercise(&self, input: ExerciseInput) -> Result<ExerciseResponse, AppError> {
        let input = input.normalized()?;
        let exercise = self.repository.create_exercise(&input).await?;

        info!(exercise_id = exercise.id, name = %exercise.name, "Exercise created");
        Ok(exercise.into())
    }

    #[instrument(skip(self))]
    pub async fn get_exercise(&self, exercise_id: i64) -> Result<ExerciseResponse, AppError> {
        self.repository
            .get_exercise(exercise_id)
            .await?
            .map(ExerciseResponse::from)
            .ok_or_else(exercise_not_found)
    }

    #[instrument(skip(self, input))]
    pub async fn update_exercise(
        &self,
        exercise_id: i64,
        input: ExerciseInput,
    ) -> Result<ExerciseResponse, AppError> {
        let input = input.normalized()?;
        let exercise = self
            .repository
            .update_exercise(exercise_id, &input)
            .await?
            .ok_or_else(exercise_not_found)?;

        info!(exercise_id, "Exercise updated");
        Ok(exercise.into())
    }

    /// Exercises still referenced by a live template or workout cannot be removed
    #[instrument(skip(self))]
    pub async fn delete_exercise(&self, exercise_id: i64) -> Result<(), AppError> {
        let _exclusive = self.reference_gate.write().await;
        if self.repository.get_exercise(exercise_id).await?.is_none() {
            return Err(exercise_not_found());
        }

        let references = self
            .template_repository
            .count_exercise_references(exercise_id)
            .await?
            + self
                .workout_repository
                .count_exercise_references(exercise_id)
                .await?;
        if references > 0 {
            warn!(exercise_id, references, "Exercise still in use");
            return Err(exercise_in_use());
        }

        if !self.repository.delete_exercise(exercise_id).await? {
            return Err(exercise_not_found());
        }

        info!(exercise_id, "Exercise deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_exercises(
        &self,
        filter: &ExerciseFilter,
        page: PageParams,
    ) -> Result<(Vec<ExerciseResponse>, i64), AppError> {
        let (exercises, total) = self.repository.list_exercises(filter, page).await?;
        Ok((exercises.into_iter().map(Into::into).collect(), total))
    }
}
