use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database model for the templates table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TemplateModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Database model for the template_exercises table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TemplateExerciseModel {
    pub id: i64,
    pub template_id: i64,
    pub exercise_id: i64,
    pub sets: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Parent row of a template about to be written
#[derive(Debug, Clone)]
pub struct TemplateDraft {
    pub name: String,
    pub description: String,
}

/// Child row of a template about to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTemplateExercise {
    pub exercise_id: i64,
    pub sets: i32,
}
