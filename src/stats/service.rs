use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    models::{DailyCount, TimeRange},
    types::{AggregateStats, ExerciseProgress, ExerciseRef, WorkoutFrequency},
};
use crate::exercise::repository::{exercise_not_found, ExerciseRepository};
use crate::shared::AppError;
use crate::workout::repository::WorkoutRepository;

/// Read-only training statistics over a user's live workouts
pub struct StatsService {
    workout_repository: Arc<dyn WorkoutRepository>,
    exercise_repository: Arc<dyn ExerciseRepository>,
}

/// Spreads daily counts over the window's buckets, filling gaps with zero
fn fill_buckets(
    range: TimeRange,
    today: NaiveDate,
    counts: &[DailyCount],
) -> Result<WorkoutFrequency, AppError> {
    let mut per_bucket: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for count in counts {
        *per_bucket.entry(range.bucket_of(count.day)).or_default() += count.workouts;
    }

    let buckets = range.buckets(today)?;
    Ok(WorkoutFrequency {
        time_range: range,
        labels: buckets.iter().map(|b| range.label(*b)).collect(),
        data: buckets
            .iter()
            .map(|b| per_bucket.get(b).copied().unwrap_or(0))
            .collect(),
    })
}

impl StatsService {
    pub fn new(
        workout_repository: Arc<dyn WorkoutRepository>,
        exercise_repository: Arc<dyn ExerciseRepository>,
    ) -> Self {
        Self {
            workout_repository,
            exercise_repository,
        }
    }

    #[instrument(skip(self))]
    pub async fn workout_frequency(
        &self,
        user_id: i64,
        range: TimeRange,
        today: NaiveDate,
    ) -> Result<WorkoutFrequency, AppError> {
        let since = range.since(today)?;
        let counts = self
            .workout_repository
            .daily_workout_counts(user_id, since)
            .await?;

        debug!(days = counts.len(), %since, "Workout frequency computed");
        fill_buckets(range, today, &counts)
    }

    #[instrument(skip(self))]
    pub async fn exercise_progress(
        &self,
        user_id: i64,
        exercise_id: i64,
        range: TimeRange,
        today: NaiveDate,
    ) -> Result<ExerciseProgress, AppError> {
        let exercise = self
            .exercise_repository
            .get_exercise(exercise_id)
            .await?
            .ok_or_else(exercise_not_found)?;

        let since = range.since(today)?;
        let days = self
            .workout_repository
            .daily_max_weight(user_id, exercise_id, since)
            .await?;

        Ok(ExerciseProgress {
            exercise_id,
            exercise_name: exercise.name,
            time_range: range,
            dates: days.iter().map(|d| d.day.format("%Y-%m-%d").to_string()).collect(),
            weights: days.iter().map(|d| d.weight).collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn aggregate(&self, user_id: i64) -> Result<AggregateStats, AppError> {
        let totals = self.workout_repository.training_totals(user_id).await?;
        let exercises = self
            .exercise_repository
            .find_by_ids(&totals.exercise_ids)
            .await?
            .into_iter()
            .map(|e| ExerciseRef {
                id: e.id,
                name: e.name,
            })
            .collect();

        Ok(AggregateStats {
            total_workouts: totals.workouts,
            total_entries: totals.entries,
            exercises,
        })
    }
}
