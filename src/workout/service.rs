use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    models::WorkoutModel,
    repository::{workout_not_found, WorkoutRepository},
    types::{WorkoutDetail, WorkoutEntryDetail, WorkoutRequest, WorkoutSummary},
};
use crate::aggregate::{exercise_lookup, verify_exercises_exist};
use crate::exercise::repository::ExerciseRepository;
use crate::shared::{pagination::PageParams, AppError, ReferenceGate};
use crate::template::repository::{template_not_found, TemplateRepository};

/// Coordinates writes and reads of the workout aggregate
pub struct WorkoutService {
    repository: Arc<dyn WorkoutRepository>,
    template_repository: Arc<dyn TemplateRepository>,
    exercise_repository: Arc<dyn ExerciseRepository>,
    reference_gate: ReferenceGate,
}

impl WorkoutService {
    pub fn new(
        repository: Arc<dyn WorkoutRepository>,
        template_repository: Arc<dyn TemplateRepository>,
        exercise_repository: Arc<dyn ExerciseRepository>,
        reference_gate: ReferenceGate,
    ) -> Self {
        Self {
            repository,
            template_repository,
            exercise_repository,
            reference_gate,
        }
    }

    /// Checks that the template belongs to the caller and that every entry
    /// references a known exercise
    async fn check_references(&self, user_id: i64, request: &WorkoutRequest) -> Result<(), AppError> {
        if self
            .template_repository
            .find_owned(request.template_id, user_id)
            .await?
            .is_none()
        {
            return Err(template_not_found());
        }

        verify_exercises_exist(self.exercise_repository.as_ref(), &request.exercise_ids()).await
    }

    #[instrument(skip(self, request), fields(entries = request.entries.len()))]
    pub async fn create_workout(
        &self,
        user_id: i64,
        request: WorkoutRequest,
    ) -> Result<WorkoutDetail, AppError> {
        request.validate()?;
        let _writer = self.reference_gate.read().await;
        self.check_references(user_id, &request).await?;

        let workout = self
            .repository
            .create_with_entries(user_id, &request.draft(), &request.new_entries())
            .await?;

        info!(workout_id = workout.id, user_id, "Workout created");
        self.load_detail(workout).await
    }

    /// Full replace: the stored entries become exactly the request's entries
    #[instrument(skip(self, request), fields(entries = request.entries.len()))]
    pub async fn update_workout(
        &self,
        user_id: i64,
        workout_id: i64,
        request: WorkoutRequest,
    ) -> Result<WorkoutDetail, AppError> {
        request.validate()?;
        let _writer = self.reference_gate.read().await;

        if self
            .repository
            .find_owned(workout_id, user_id)
            .await?
            .is_none()
        {
            return Err(workout_not_found());
        }
        self.check_references(user_id, &request).await?;

        let workout = self
            .repository
            .replace_owned(workout_id, user_id, &request.draft(), &request.new_entries())
            .await?;

        info!(workout_id, user_id, "Workout updated");
        self.load_detail(workout).await
    }

    #[instrument(skip(self))]
    pub async fn get_workout(&self, user_id: i64, workout_id: i64) -> Result<WorkoutDetail, AppError> {
        let workout = self
            .repository
            .find_owned(workout_id, user_id)
            .await?
            .ok_or_else(workout_not_found)?;

        self.load_detail(workout).await
    }

    #[instrument(skip(self))]
    pub async fn list_workouts(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<WorkoutSummary>, i64), AppError> {
        let (workouts, total) = self.repository.list_owned(user_id, page).await?;

        let template_ids: Vec<i64> = workouts.iter().map(|w| w.template_id).collect();
        let names = self.template_names(&template_ids).await?;

        let summaries = workouts
            .into_iter()
            .map(|workout| WorkoutSummary {
                template_name: names.get(&workout.template_id).cloned().unwrap_or_default(),
                id: workout.id,
                name: workout.name,
                template_id: workout.template_id,
                notes: workout.notes,
                logged_at: workout.created_at,
            })
            .collect();

        Ok((summaries, total))
    }

    #[instrument(skip(self))]
    pub async fn delete_workout(&self, user_id: i64, workout_id: i64) -> Result<(), AppError> {
        if self
            .repository
            .find_owned(workout_id, user_id)
            .await?
            .is_none()
        {
            return Err(workout_not_found());
        }

        self.repository.delete_owned(workout_id, user_id).await?;

        info!(workout_id, user_id, "Workout deleted");
        Ok(())
    }

    async fn template_names(&self, ids: &[i64]) -> Result<HashMap<i64, String>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let templates = self.template_repository.find_by_ids(ids).await?;
        Ok(templates.into_iter().map(|t| (t.id, t.name)).collect())
    }

    async fn load_detail(&self, workout: WorkoutModel) -> Result<WorkoutDetail, AppError> {
        let entries = self.repository.entries_for(workout.id).await?;
        let exercise_ids: Vec<i64> = entries.iter().map(|e| e.exercise_id).collect();
        let exercises = exercise_lookup(self.exercise_repository.as_ref(), &exercise_ids).await?;
        let template_name = self
            .template_names(&[workout.template_id])
            .await?
            .remove(&workout.template_id)
            .unwrap_or_default();

        let entries = entries
            .into_iter()
            .map(|entry| WorkoutEntryDetail {
                exercise_name: exercises
                    .get(&entry.exercise_id)
                    .map(|e| e.name.clone())
                    .unwrap_or_default(),
                exercise_id: entry.exercise_id,
                set_number: entry.set_number,
                reps: entry.reps,
                weight: entry.weight,
            })
            .collect();

        Ok(WorkoutDetail {
            id: workout.id,
            name: workout.name,
            template_id: workout.template_id,
            template_name,
            notes: workout.notes,
            logged_at: workout.created_at,
            entries,
        })
    }
}
