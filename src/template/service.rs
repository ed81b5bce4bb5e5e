use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    models::TemplateModel,
    repository::{template_in_use, template_not_found, TemplateRepository},
    types::{CreateTemplateRequest, TemplateDetail, TemplateExerciseDetail, TemplateSummary},
};
use crate::aggregate::{ensure_distinct_exercises, exercise_lookup, verify_exercises_exist};
use crate::exercise::repository::ExerciseRepository;
use crate::shared::{pagination::PageParams, AppError, ReferenceGate};
use crate::workout::repository::WorkoutRepository;

/// Coordinates writes and reads of the template aggregate
pub struct TemplateService {
    repository: Arc<dyn TemplateRepository>,
    exercise_repository: Arc<dyn ExerciseRepository>,
    workout_repository: Arc<dyn WorkoutRepository>,
    reference_gate: ReferenceGate,
}

impl TemplateService {
    pub fn new(
        repository: Arc<dyn TemplateRepository>,
        exercise_repository: Arc<dyn ExerciseRepository>,
        workout_repository: Arc<dyn WorkoutRepository>,
        reference_gate: ReferenceGate,
    ) -> Self {
        Self {
            repository,
            exercise_repository,
            workout_repository,
            reference_gate,
        }
    }

    /// Validates the lines, checks every exercise in one lookup, then stores
    /// the template and its lines as one unit
    #[instrument(skip(self, request), fields(lines = request.exercises.len()))]
    pub async fn create_template(
        &self,
        user_id: i64,
        request: CreateTemplateRequest,
    ) -> Result<TemplateDetail, AppError> {
        request.validate()?;
        let _writer = self.reference_gate.read().await;

        let exercise_ids = request.exercise_ids();
        ensure_distinct_exercises(&exercise_ids)?;
        verify_exercises_exist(self.exercise_repository.as_ref(), &exercise_ids).await?;

        let template = self
            .repository
            .create_with_exercises(user_id, &request.draft(), &request.lines())
            .await?;

        info!(template_id = template.id, user_id, "Template created");
        self.load_detail(template).await
    }

    #[instrument(skip(self))]
    pub async fn get_template(
        &self,
        user_id: i64,
        template_id: i64,
    ) -> Result<TemplateDetail, AppError> {
        let template = self
            .repository
            .find_owned(template_id, user_id)
            .await?
            .ok_or_else(template_not_found)?;

        self.load_detail(template).await
    }

    #[instrument(skip(self))]
    pub async fn list_templates(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<TemplateSummary>, i64), AppError> {
        let (templates, total) = self.repository.list_owned(user_id, page).await?;
        Ok((templates.into_iter().map(Into::into).collect(), total))
    }

    /// Templates that live workouts still point at are kept
    #[instrument(skip(self))]
    pub async fn delete_template(&self, user_id: i64, template_id: i64) -> Result<(), AppError> {
        let _exclusive = self.reference_gate.write().await;
        if self
            .repository
            .find_owned(template_id, user_id)
            .await?
            .is_none()
        {
            return Err(template_not_found());
        }

        let workouts = self
            .workout_repository
            .count_for_template(template_id)
            .await?;
        if workouts > 0 {
            warn!(template_id, workouts, "Refusing to delete template in use");
            return Err(template_in_use());
        }

        self.repository.delete_owned(template_id, user_id).await?;

        info!(template_id, user_id, "Template deleted");
        Ok(())
    }

    async fn load_detail(&self, template: TemplateModel) -> Result<TemplateDetail, AppError> {
        let lines = self.repository.exercises_for(template.id).await?;
        let ids: Vec<i64> = lines.iter().map(|line| line.exercise_id).collect();
        let lookup = exercise_lookup(self.exercise_repository.as_ref(), &ids).await?;

        let exercises = lines
            .into_iter()
            .map(|line| {
                let exercise = lookup.get(&line.exercise_id);
                TemplateExerciseDetail {
                    exercise_id: line.exercise_id,
                    sets: line.sets,
                    name: exercise.map(|e| e.name.clone()).unwrap_or_default(),
                    description: exercise.map(|e| e.description.clone()).unwrap_or_default(),
                    category: exercise.map(|e| e.category.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Ok(TemplateDetail {
            id: template.id,
            name: template.name,
            description: template.description,
            user_id: template.user_id,
            created_at: template.created_at,
            updated_at: template.updated_at,
            exercises,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::{seed_exercise, seed_user, AppStateBuilder};
    use crate::shared::AppState;
    use crate::template::repository::InMemoryTemplateRepository;
    use crate::template::types::TemplateExerciseRequest;
    use crate::workout::models::{NewWorkoutEntry, WorkoutDraft};

    fn service(state: &AppState) -> TemplateService {
        TemplateService::new(
            Arc::clone(&state.template_repository),
            Arc::clone(&state.exercise_repository),
            Arc::clone(&state.workout_repository),
            Arc::clone(&state.reference_gate),
        )
    }

    fn request(lines: &[(i64, i32)]) -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: "Push".to_string(),
            description: "Upper body".to_string(),
            exercises: lines
                .iter()
                .map(|&(exercise_id, sets)| TemplateExerciseRequest { exercise_id, sets })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_template_returns_aggregate_with_details() {
        let state = AppStateBuilder::new().build();
        let user_id = seed_user(&state, "alice").await;
        let bench = seed_exercise(&state, "Bench Press").await;

        let detail = service(&state)
            .create_template(user_id, request(&[(bench.id, 3)]))
            .await
            .unwrap();

        assert_eq!(detail.name, "Push");
        assert_eq!(detail.user_id, user_id);
        assert_eq!(detail.exercises.len(), 1);
        assert_eq!(detail.exercises[0].exercise_id, bench.id);
        assert_eq!(detail.exercises[0].sets, 3);
        assert_eq!(detail.exercises[0].name, "Bench Press");
        assert_eq!(detail.exercises[0].category, "strength");
    }

    #[tokio::test]
    async fn test_duplicate_exercise_ids_rejected_before_write() {
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let state = AppStateBuilder::new()
            .with_template_repository(templates.clone())
            .build();
        let user_id = seed_user(&state, "alice").await;
        let bench = seed_exercise(&state, "Bench Press").await;

        let err = service(&state)
            .create_template(user_id, request(&[(bench.id, 3), (bench.id, 4)]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(err.public_message(), "Duplicate exercise IDs not allowed");
        assert_eq!(templates.template_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_exercise_rejected_before_write() {
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let state = AppStateBuilder::new()
            .with_template_repository(templates.clone())
            .build();
        let user_id = seed_user(&state, "alice").await;
        let bench = seed_exercise(&state, "Bench Press").await;

        let err = service(&state)
            .create_template(user_id, request(&[(bench.id, 3), (999, 3)]))
            .await
            .unwrap_err();

        assert_eq!(err.public_message(), "One or more exercise IDs are invalid");
        assert_eq!(templates.template_count(), 0);
        assert_eq!(templates.line_count(), 0);
    }

    #[tokio::test]
    async fn test_get_template_of_other_user_is_not_found() {
        let state = AppStateBuilder::new().build();
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let bench = seed_exercise(&state, "Bench Press").await;

        let detail = service(&state)
            .create_template(alice, request(&[(bench.id, 3)]))
            .await
            .unwrap();

        let result = service(&state).get_template(bob, detail.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        let result = service(&state).delete_template(bob, detail.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_template_in_use_is_rejected() {
        let state = AppStateBuilder::new().build();
        let user_id = seed_user(&state, "alice").await;
        let bench = seed_exercise(&state, "Bench Press").await;
        let detail = service(&state)
            .create_template(user_id, request(&[(bench.id, 3)]))
            .await
            .unwrap();

        state
            .workout_repository
            .create_with_entries(
                user_id,
                &WorkoutDraft {
                    template_id: detail.id,
                    name: "Monday".to_string(),
                    notes: String::new(),
                },
                &[NewWorkoutEntry {
                    exercise_id: bench.id,
                    set_number: 1,
                    reps: 5,
                    weight: 60.0,
                }],
            )
            .await
            .unwrap();

        let err = service(&state)
            .delete_template(user_id, detail.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.public_message(), "Template is used by existing workouts");

        let still_there = service(&state).get_template(user_id, detail.id).await.unwrap();
        assert_eq!(still_there.exercises.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unused_template() {
        let state = AppStateBuilder::new().build();
        let user_id = seed_user(&state, "alice").await;
        let bench = seed_exercise(&state, "Bench Press").await;
        let detail = service(&state)
            .create_template(user_id, request(&[(bench.id, 3)]))
            .await
            .unwrap();

        service(&state)
            .delete_template(user_id, detail.id)
            .await
            .unwrap();

        let result = service(&state).get_template(user_id, detail.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        let (templates, total) = service(&state)
            .list_templates(user_id, PageParams::default())
            .await
            .unwrap();
        assert!(templates.is_empty());
        assert_eq!(total, 0);
    }
}
