use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::shared::AppError;

/// Database model for the exercises table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExerciseModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub primary_muscle: String,
    pub equipment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Writable fields of an exercise, used for both create and update
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub primary_muscle: String,
    #[serde(default)]
    pub equipment: String,
}

impl ExerciseInput {
    /// Trims every field and rejects an empty name
    pub fn normalized(&self) -> Result<ExerciseInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Exercise name is required".to_string()));
        }

        Ok(ExerciseInput {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            category: self.category.trim().to_string(),
            primary_muscle: self.primary_muscle.trim().to_string(),
            equipment: self.equipment.trim().to_string(),
        })
    }
}

/// Catalog filters. `search` matches names case-insensitively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ExerciseFilter {
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// `search` as a substring `LIKE` pattern, with the wildcards in the
    /// user's text escaped so they match literally
    pub fn search_pattern(&self) -> Option<String> {
        self.search().map(|s| {
            let mut pattern = String::with_capacity(s.len() + 2);
            pattern.push('%');
            for c in s.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }

    pub fn matches(&self, exercise: &ExerciseModel) -> bool {
        let category_ok = self.category().map_or(true, |c| exercise.category == c);
        let search_ok = self.search().map_or(true, |s| {
            exercise.name.to_lowercase().contains(&s.to_lowercase())
        });
        category_ok && search_ok
    }
}
