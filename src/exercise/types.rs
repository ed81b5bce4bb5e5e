use serde::{Deserialize, Serialize};

use super::models::ExerciseModel;

/// Exercise as returned by the catalog endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub primary_muscle: String,
    pub equipment: String,
}

impl From<ExerciseModel> for ExerciseResponse {
    fn from(exercise: ExerciseModel) -> Self {
        Self {
            id: exercise.id,
            name: exercise.name,
            description: exercise.description,
            category: exercise.category,
            primary_muscle: exercise.primary_muscle,
            equipment: exercise.equipment,
        }
    }
}
