use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{NewWorkoutEntry, WorkoutDraft};
use crate::shared::AppError;

/// Request payload for logging or replacing a workout
#[derive(Debug, Deserialize)]
pub struct WorkoutRequest {
    pub template_id: i64,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub entries: Vec<WorkoutEntryRequest>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkoutEntryRequest {
    pub exercise_id: i64,
    pub set_number: i32,
    pub reps: i32,
    #[serde(default)]
    pub weight: f64,
}

impl WorkoutRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |message: &str| Err(AppError::Validation(message.to_string()));

        if self.name.trim().is_empty() {
            return invalid("Workout name is required");
        }
        if self.template_id <= 0 {
            return invalid("Invalid template ID");
        }
        if self.entries.is_empty() {
            return invalid("At least one entry is required");
        }
        for entry in &self.entries {
            if entry.exercise_id <= 0 {
                return invalid("Invalid exercise ID");
            }
            if entry.set_number < 1 {
                return invalid("Set number must be at least 1");
            }
            if entry.reps < 1 {
                return invalid("Reps must be at least 1");
            }
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return invalid("Weight cannot be negative");
            }
        }
        Ok(())
    }

    /// Exercise ids in entry order; repeats are expected (one per set)
    pub fn exercise_ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.exercise_id).collect()
    }

    pub fn draft(&self) -> WorkoutDraft {
        WorkoutDraft {
            template_id: self.template_id,
            name: self.name.trim().to_string(),
            notes: self.notes.trim().to_string(),
        }
    }

    pub fn new_entries(&self) -> Vec<NewWorkoutEntry> {
        self.entries
            .iter()
            .map(|e| NewWorkoutEntry {
                exercise_id: e.exercise_id,
                set_number: e.set_number,
                reps: e.reps,
                weight: e.weight,
            })
            .collect()
    }
}

/// Workout as shown in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub id: i64,
    pub name: String,
    pub template_id: i64,
    pub template_name: String,
    pub notes: String,
    pub logged_at: DateTime<Utc>,
}

/// Full workout aggregate with exercise names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutDetail {
    pub id: i64,
    pub name: String,
    pub template_id: i64,
    pub template_name: String,
    pub notes: String,
    pub logged_at: DateTime<Utc>,
    pub entries: Vec<WorkoutEntryDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutEntryDetail {
    pub exercise_id: i64,
    pub exercise_name: String,
    pub set_number: i32,
    pub reps: i32,
    pub weight: f64,
}
