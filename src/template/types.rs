use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{NewTemplateExercise, TemplateDraft, TemplateModel};
use crate::shared::AppError;

/// Request payload for creating a template with its exercise lines
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub exercises: Vec<TemplateExerciseRequest>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TemplateExerciseRequest {
    pub exercise_id: i64,
    pub sets: i32,
}

impl CreateTemplateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Template name is required".to_string()));
        }
        if self.exercises.is_empty() {
            return Err(AppError::Validation(
                "At least one exercise is required".to_string(),
            ));
        }
        if self.exercises.iter().any(|e| e.exercise_id <= 0) {
            return Err(AppError::Validation("Invalid exercise ID".to_string()));
        }
        if self.exercises.iter().any(|e| e.sets < 1) {
            return Err(AppError::Validation("Sets must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn exercise_ids(&self) -> Vec<i64> {
        self.exercises.iter().map(|e| e.exercise_id).collect()
    }

    pub fn draft(&self) -> TemplateDraft {
        TemplateDraft {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }

    pub fn lines(&self) -> Vec<NewTemplateExercise> {
        self.exercises
            .iter()
            .map(|e| NewTemplateExercise {
                exercise_id: e.exercise_id,
                sets: e.sets,
            })
            .collect()
    }
}

/// Template as shown in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TemplateModel> for TemplateSummary {
    fn from(template: TemplateModel) -> Self {
        Self {
            id: template.id,
            name: template.name,
            description: template.description,
            created_at: template.created_at,
            updated_at: template.updated_at,
        }
    }
}

/// Full template aggregate with exercise details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exercises: Vec<TemplateExerciseDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateExerciseDetail {
    pub exercise_id: i64,
    pub sets: i32,
    pub name: String,
    pub description: String,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request(name: &str, exercises: Vec<(i64, i32)>) -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: name.to_string(),
            description: " Upper body ".to_string(),
            exercises: exercises
                .into_iter()
                .map(|(exercise_id, sets)| TemplateExerciseRequest { exercise_id, sets })
                .collect(),
        }
    }

    #[rstest]
    #[case(request("", vec![(1, 3)]), "Template name is required")]
    #[case(request("Push", vec![]), "At least one exercise is required")]
    #[case(request("Push", vec![(0, 3)]), "Invalid exercise ID")]
    #[case(request("Push", vec![(1, 3), (2, 0)]), "Sets must be at least 1")]
    fn test_validate_rejects(#[case] request: CreateTemplateRequest, #[case] message: &str) {
        let err = request.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.public_message(), message);
    }

    #[test]
    fn test_draft_and_lines() {
        let request = request(" Push ", vec![(1, 3), (2, 4)]);
        assert!(request.validate().is_ok());

        let draft = request.draft();
        assert_eq!(draft.name, "Push");
        assert_eq!(draft.description, "Upper body");
        assert_eq!(request.exercise_ids(), vec![1, 2]);
        assert_eq!(
            request.lines(),
            vec![
                NewTemplateExercise { exercise_id: 1, sets: 3 },
                NewTemplateExercise { exercise_id: 2, sets: 4 },
            ]
        );
    }
}
