use serde::{Deserialize, Serialize};

use super::models::TimeRange;

/// `?time_range=week|month|year` (also accepted as `timeRange`)
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(alias = "timeRange")]
    pub time_range: Option<String>,
}

impl StatsQuery {
    pub fn range(&self) -> TimeRange {
        TimeRange::parse_lenient(self.time_range.as_deref())
    }
}

/// Workouts per bucket, zero-filled; `labels` and `data` line up by index
#[derive(Debug, Serialize)]
pub struct WorkoutFrequency {
    pub time_range: TimeRange,
    pub labels: Vec<String>,
    pub data: Vec<i64>,
}

/// Daily best weight for one exercise; only days it was trained appear
#[derive(Debug, Serialize)]
pub struct ExerciseProgress {
    pub exercise_id: i64,
    pub exercise_name: String,
    pub time_range: TimeRange,
    pub dates: Vec<String>,
    pub weights: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct AggregateStats {
    pub total_workouts: i64,
    pub total_entries: i64,
    pub exercises: Vec<ExerciseRef>,
}

#[derive(Debug, Serialize)]
pub struct ExerciseRef {
    pub id: i64,
    pub name: String,
}
