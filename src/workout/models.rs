use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database model for the workouts table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkoutModel {
    pub id: i64,
    pub user_id: i64,
    pub template_id: i64,
    pub name: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Database model for the workout_entries table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkoutEntryModel {
    pub id: i64,
    pub workout_id: i64,
    pub exercise_id: i64,
    pub set_number: i32,
    pub reps: i32,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Parent row of a workout about to be written
#[derive(Debug, Clone)]
pub struct WorkoutDraft {
    pub template_id: i64,
    pub name: String,
    pub notes: String,
}

/// One logged set about to be written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewWorkoutEntry {
    pub exercise_id: i64,
    pub set_number: i32,
    pub reps: i32,
    pub weight: f64,
}

impl NewWorkoutEntry {
    /// Same rule as the CHECK constraints on workout_entries
    pub fn satisfies_constraints(&self) -> bool {
        self.set_number > 0 && self.reps > 0 && self.weight.is_finite() && self.weight >= 0.0
    }
}
