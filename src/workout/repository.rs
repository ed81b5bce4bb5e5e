use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::{debug, info, instrument};

use super::models::{NewWorkoutEntry, WorkoutDraft, WorkoutEntryModel, WorkoutModel};
use crate::db::{self, classify, Tx};
use crate::exercise::repository::lock_live_exercises;
use crate::shared::{pagination::PageParams, AppError};
use crate::stats::models::{DailyCount, DailyMaxWeight, TrainingTotals};
use crate::template::repository::template_not_found;

const WORKOUT_COLUMNS: &str =
    "id, user_id, template_id, name, notes, created_at, updated_at, deleted_at";
const ENTRY_COLUMNS: &str =
    "id, workout_id, exercise_id, set_number, reps, weight, created_at, updated_at, deleted_at";

pub fn workout_not_found() -> AppError {
    AppError::NotFound("Workout not found".to_string())
}

/// Storage for the workout aggregate (workout row plus its entries).
/// Every write is atomic over the whole aggregate.
#[async_trait]
pub trait WorkoutRepository: Send + Sync {
    async fn create_with_entries(
        &self,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError>;
    /// Rewrites the workout row and swaps all prior entries for `entries`
    async fn replace_owned(
        &self,
        workout_id: i64,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError>;
    async fn find_owned(
        &self,
        workout_id: i64,
        user_id: i64,
    ) -> Result<Option<WorkoutModel>, AppError>;
    async fn entries_for(&self, workout_id: i64) -> Result<Vec<WorkoutEntryModel>, AppError>;
    /// Newest first
    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<WorkoutModel>, i64), AppError>;
    async fn delete_owned(&self, workout_id: i64, user_id: i64) -> Result<(), AppError>;
    /// Live workouts logged against the template
    async fn count_for_template(&self, template_id: i64) -> Result<i64, AppError>;
    /// Live entries of live workouts pointing at the exercise
    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError>;
    /// Workouts per UTC day from `since` on, days without workouts omitted
    async fn daily_workout_counts(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyCount>, AppError>;
    /// Heaviest weight per workout day for one exercise, from `since` on
    async fn daily_max_weight(
        &self,
        user_id: i64,
        exercise_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyMaxWeight>, AppError>;
    async fn training_totals(&self, user_id: i64) -> Result<TrainingTotals, AppError>;
}

#[derive(Default)]
struct WorkoutStore {
    workouts: BTreeMap<i64, WorkoutModel>,
    entries: BTreeMap<i64, WorkoutEntryModel>,
}

impl WorkoutStore {
    /// Live entries of the user's live workouts, paired with their workout
    fn live_entries(&self, user_id: i64) -> impl Iterator<Item = (&WorkoutModel, &WorkoutEntryModel)> {
        self.entries
            .values()
            .filter(|e| e.deleted_at.is_none())
            .filter_map(move |e| {
                self.workouts
                    .get(&e.workout_id)
                    .filter(|w| w.deleted_at.is_none() && w.user_id == user_id)
                    .map(|w| (w, e))
            })
    }

    fn owned(&self, workout_id: i64, user_id: i64) -> bool {
        self.workouts
            .get(&workout_id)
            .is_some_and(|w| w.deleted_at.is_none() && w.user_id == user_id)
    }

    fn retire_entries(&mut self, workout_id: i64) {
        let now = Utc::now();
        for entry in self
            .entries
            .values_mut()
            .filter(|e| e.workout_id == workout_id && e.deleted_at.is_none())
        {
            entry.deleted_at = Some(now);
        }
    }

    /// Builds the entry rows for `workout_id`; nothing is inserted here
    fn stage_entries(&self, workout_id: i64, entries: &[NewWorkoutEntry]) -> Vec<WorkoutEntryModel> {
        let now = Utc::now();
        let first = self.entries.keys().next_back().copied().unwrap_or(0) + 1;
        entries
            .iter()
            .zip(first..)
            .map(|(entry, id)| WorkoutEntryModel {
                id,
                workout_id,
                exercise_id: entry.exercise_id,
                set_number: entry.set_number,
                reps: entry.reps,
                weight: entry.weight,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .collect()
    }
}

fn check_entries(entries: &[NewWorkoutEntry]) -> Result<(), AppError> {
    if entries.iter().all(NewWorkoutEntry::satisfies_constraints) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(
            "Value violates a constraint".to_string(),
        ))
    }
}

/// In-memory implementation of WorkoutRepository for development and testing.
/// Writes are staged and applied only after every entry passes the same
/// checks as the database schema.
pub struct InMemoryWorkoutRepository {
    store: Mutex<WorkoutStore>,
}

impl Default for InMemoryWorkoutRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkoutRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(WorkoutStore::default()),
        }
    }

    pub fn workout_count(&self) -> usize {
        self.store.lock().unwrap().workouts.len()
    }

    /// Number of entry rows stored, live or not
    pub fn entry_count(&self) -> usize {
        self.store.lock().unwrap().entries.len()
    }
}

#[async_trait]
impl WorkoutRepository for InMemoryWorkoutRepository {
    #[instrument(skip(self, draft, entries), fields(entries = entries.len()))]
    async fn create_with_entries(
        &self,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError> {
        let mut store = self.store.lock().unwrap();
        check_entries(entries)?;

        let now = Utc::now();
        let workout = WorkoutModel {
            id: store.workouts.keys().next_back().copied().unwrap_or(0) + 1,
            user_id,
            template_id: draft.template_id,
            name: draft.name.clone(),
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let rows = store.stage_entries(workout.id, entries);

        store.workouts.insert(workout.id, workout.clone());
        store.entries.extend(rows.into_iter().map(|e| (e.id, e)));

        debug!(workout_id = workout.id, "Workout created in memory");
        Ok(workout)
    }

    #[instrument(skip(self, draft, entries), fields(entries = entries.len()))]
    async fn replace_owned(
        &self,
        workout_id: i64,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError> {
        let mut store = self.store.lock().unwrap();

        if !store.owned(workout_id, user_id) {
            return Err(workout_not_found());
        }
        check_entries(entries)?;

        let rows = store.stage_entries(workout_id, entries);
        store.retire_entries(workout_id);
        store.entries.extend(rows.into_iter().map(|e| (e.id, e)));

        let workout = store
            .workouts
            .get_mut(&workout_id)
            .ok_or_else(workout_not_found)?;
        workout.template_id = draft.template_id;
        workout.name = draft.name.clone();
        workout.notes = draft.notes.clone();
        workout.updated_at = Utc::now();

        debug!(workout_id, "Workout replaced in memory");
        Ok(workout.clone())
    }

    async fn find_owned(
        &self,
        workout_id: i64,
        user_id: i64,
    ) -> Result<Option<WorkoutModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .workouts
            .get(&workout_id)
            .filter(|w| w.deleted_at.is_none() && w.user_id == user_id)
            .cloned())
    }

    async fn entries_for(&self, workout_id: i64) -> Result<Vec<WorkoutEntryModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .entries
            .values()
            .filter(|e| e.workout_id == workout_id && e.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<WorkoutModel>, i64), AppError> {
        let store = self.store.lock().unwrap();
        let mut owned: Vec<WorkoutModel> = store
            .workouts
            .values()
            .filter(|w| w.deleted_at.is_none() && w.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok((page.slice(&owned), owned.len() as i64))
    }

    #[instrument(skip(self))]
    async fn delete_owned(&self, workout_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();

        if !store.owned(workout_id, user_id) {
            return Err(workout_not_found());
        }

        store.retire_entries(workout_id);
        if let Some(workout) = store.workouts.get_mut(&workout_id) {
            workout.deleted_at = Some(Utc::now());
        }

        debug!(workout_id, "Workout deleted in memory");
        Ok(())
    }

    async fn count_for_template(&self, template_id: i64) -> Result<i64, AppError> {
        let store = self.store.lock().unwrap();
        let count = store
            .workouts
            .values()
            .filter(|w| w.template_id == template_id && w.deleted_at.is_none())
            .count();
        Ok(count as i64)
    }

    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError> {
        let store = self.store.lock().unwrap();
        let count = store
            .entries
            .values()
            .filter(|e| e.exercise_id == exercise_id && e.deleted_at.is_none())
            .count();
        Ok(count as i64)
    }

    async fn daily_workout_counts(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyCount>, AppError> {
        let store = self.store.lock().unwrap();
        let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for workout in store
            .workouts
            .values()
            .filter(|w| w.deleted_at.is_none() && w.user_id == user_id)
        {
            let day = workout.created_at.date_naive();
            if day >= since {
                *days.entry(day).or_default() += 1;
            }
        }

        Ok(days
            .into_iter()
            .map(|(day, workouts)| DailyCount { day, workouts })
            .collect())
    }

    async fn daily_max_weight(
        &self,
        user_id: i64,
        exercise_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyMaxWeight>, AppError> {
        let store = self.store.lock().unwrap();
        let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (workout, entry) in store.live_entries(user_id) {
            let day = workout.created_at.date_naive();
            if entry.exercise_id == exercise_id && day >= since {
                let max = days.entry(day).or_insert(entry.weight);
                if entry.weight > *max {
                    *max = entry.weight;
                }
            }
        }

        Ok(days
            .into_iter()
            .map(|(day, weight)| DailyMaxWeight { day, weight })
            .collect())
    }

    async fn training_totals(&self, user_id: i64) -> Result<TrainingTotals, AppError> {
        let store = self.store.lock().unwrap();
        let workouts = store
            .workouts
            .values()
            .filter(|w| w.deleted_at.is_none() && w.user_id == user_id)
            .count();

        let mut entries = 0;
        let mut exercise_ids = BTreeSet::new();
        for (_, entry) in store.live_entries(user_id) {
            entries += 1;
            exercise_ids.insert(entry.exercise_id);
        }

        Ok(TrainingTotals {
            workouts: workouts as i64,
            entries,
            exercise_ids: exercise_ids.into_iter().collect(),
        })
    }
}

/// PostgreSQL implementation of the workout aggregate store
pub struct PostgresWorkoutRepository {
    pool: PgPool,
}

impl PostgresWorkoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Share-locks the owner's template so it cannot be deleted under the write
async fn lock_owned_template(tx: &mut Tx, template_id: i64, user_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM templates WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL FOR SHARE",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify("Failed to verify template"))?
    .map(|_| ())
    .ok_or_else(template_not_found)
}

async fn lock_owned_workout(tx: &mut Tx, workout_id: i64, user_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM workouts WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(workout_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify("Failed to find workout"))?
    .map(|_| ())
    .ok_or_else(workout_not_found)
}

async fn insert_entries(
    tx: &mut Tx,
    workout_id: i64,
    entries: &[NewWorkoutEntry],
) -> Result<(), AppError> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut insert = QueryBuilder::<Postgres>::new(
        "INSERT INTO workout_entries (workout_id, exercise_id, set_number, reps, weight) ",
    );
    insert.push_values(entries, |mut row, entry| {
        row.push_bind(workout_id)
            .push_bind(entry.exercise_id)
            .push_bind(entry.set_number)
            .push_bind(entry.reps)
            .push_bind(entry.weight);
    });
    insert
        .build()
        .execute(&mut **tx)
        .await
        .map_err(classify("Failed to create workout entries"))?;

    Ok(())
}

async fn retire_entries(tx: &mut Tx, workout_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE workout_entries SET deleted_at = NOW() WHERE workout_id = $1 AND deleted_at IS NULL",
    )
    .bind(workout_id)
    .execute(&mut **tx)
    .await
    .map_err(classify("Failed to delete workout entries"))?;
    Ok(())
}

fn exercise_ids(entries: &[NewWorkoutEntry]) -> Vec<i64> {
    entries.iter().map(|e| e.exercise_id).collect()
}

async fn insert_workout(
    tx: &mut Tx,
    user_id: i64,
    draft: &WorkoutDraft,
    entries: &[NewWorkoutEntry],
) -> Result<WorkoutModel, AppError> {
    lock_owned_template(tx, draft.template_id, user_id).await?;
    lock_live_exercises(tx, &exercise_ids(entries)).await?;

    let sql = format!(
        "INSERT INTO workouts (user_id, template_id, name, notes) VALUES ($1, $2, $3, $4) \
         RETURNING {}",
        WORKOUT_COLUMNS
    );
    let workout = sqlx::query_as::<_, WorkoutModel>(&sql)
        .bind(user_id)
        .bind(draft.template_id)
        .bind(&draft.name)
        .bind(&draft.notes)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify("Failed to create workout"))?;

    insert_entries(tx, workout.id, entries).await?;
    Ok(workout)
}

async fn replace_workout(
    tx: &mut Tx,
    workout_id: i64,
    user_id: i64,
    draft: &WorkoutDraft,
    entries: &[NewWorkoutEntry],
) -> Result<WorkoutModel, AppError> {
    lock_owned_workout(tx, workout_id, user_id).await?;
    lock_owned_template(tx, draft.template_id, user_id).await?;
    lock_live_exercises(tx, &exercise_ids(entries)).await?;

    let sql = format!(
        "UPDATE workouts SET template_id = $1, name = $2, notes = $3, updated_at = NOW() \
         WHERE id = $4 RETURNING {}",
        WORKOUT_COLUMNS
    );
    let workout = sqlx::query_as::<_, WorkoutModel>(&sql)
        .bind(draft.template_id)
        .bind(&draft.name)
        .bind(&draft.notes)
        .bind(workout_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify("Failed to update workout"))?;

    retire_entries(tx, workout_id).await?;
    insert_entries(tx, workout_id, entries).await?;
    Ok(workout)
}

async fn remove_workout(tx: &mut Tx, workout_id: i64, user_id: i64) -> Result<(), AppError> {
    lock_owned_workout(tx, workout_id, user_id).await?;
    retire_entries(tx, workout_id).await?;

    sqlx::query("UPDATE workouts SET deleted_at = NOW() WHERE id = $1")
        .bind(workout_id)
        .execute(&mut **tx)
        .await
        .map_err(classify("Failed to delete workout"))?;
    Ok(())
}

#[async_trait]
impl WorkoutRepository for PostgresWorkoutRepository {
    #[instrument(skip(self, draft, entries), fields(entries = entries.len()))]
    async fn create_with_entries(
        &self,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError> {
        let mut tx = db::begin(&self.pool).await?;
        let result = insert_workout(&mut tx, user_id, draft, entries).await;
        let workout = db::finish(tx, result).await?;

        info!(workout_id = workout.id, "Workout stored");
        Ok(workout)
    }

    #[instrument(skip(self, draft, entries), fields(entries = entries.len()))]
    async fn replace_owned(
        &self,
        workout_id: i64,
        user_id: i64,
        draft: &WorkoutDraft,
        entries: &[NewWorkoutEntry],
    ) -> Result<WorkoutModel, AppError> {
        let mut tx = db::begin(&self.pool).await?;
        let result = replace_workout(&mut tx, workout_id, user_id, draft, entries).await;
        let workout = db::finish(tx, result).await?;

        info!(workout_id, "Workout replaced");
        Ok(workout)
    }

    #[instrument(skip(self))]
    async fn find_owned(
        &self,
        workout_id: i64,
        user_id: i64,
    ) -> Result<Option<WorkoutModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM workouts WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            WORKOUT_COLUMNS
        );

        sqlx::query_as::<_, WorkoutModel>(&sql)
            .bind(workout_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify("Failed to retrieve workout"))
    }

    #[instrument(skip(self))]
    async fn entries_for(&self, workout_id: i64) -> Result<Vec<WorkoutEntryModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM workout_entries WHERE workout_id = $1 AND deleted_at IS NULL \
             ORDER BY id",
            ENTRY_COLUMNS
        );

        sqlx::query_as::<_, WorkoutEntryModel>(&sql)
            .bind(workout_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to retrieve workout entries"))
    }

    #[instrument(skip(self))]
    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<WorkoutModel>, i64), AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workouts WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to count workouts"))?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let sql = format!(
            "SELECT {} FROM workouts WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            WORKOUT_COLUMNS
        );
        let workouts = sqlx::query_as::<_, WorkoutModel>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to retrieve workouts"))?;

        Ok((workouts, total))
    }

    #[instrument(skip(self))]
    async fn delete_owned(&self, workout_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut tx = db::begin(&self.pool).await?;
        let result = remove_workout(&mut tx, workout_id, user_id).await;
        db::finish(tx, result).await?;

        info!(workout_id, "Workout deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_for_template(&self, template_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workouts WHERE template_id = $1 AND deleted_at IS NULL",
        )
        .bind(template_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to check template usage"))
    }

    #[instrument(skip(self))]
    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workout_entries e \
             JOIN workouts w ON w.id = e.workout_id \
             WHERE e.exercise_id = $1 AND e.deleted_at IS NULL AND w.deleted_at IS NULL",
        )
        .bind(exercise_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to check exercise usage"))
    }

    #[instrument(skip(self))]
    async fn daily_workout_counts(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyCount>, AppError> {
        sqlx::query_as::<_, DailyCount>(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS workouts \
             FROM workouts \
             WHERE user_id = $1 AND deleted_at IS NULL \
               AND (created_at AT TIME ZONE 'UTC')::date >= $2 \
             GROUP BY day ORDER BY day",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(classify("Failed to fetch workout statistics"))
    }

    #[instrument(skip(self))]
    async fn daily_max_weight(
        &self,
        user_id: i64,
        exercise_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyMaxWeight>, AppError> {
        sqlx::query_as::<_, DailyMaxWeight>(
            "SELECT (w.created_at AT TIME ZONE 'UTC')::date AS day, MAX(e.weight) AS weight \
             FROM workout_entries e \
             JOIN workouts w ON w.id = e.workout_id \
             WHERE w.user_id = $1 AND e.exercise_id = $2 \
               AND e.deleted_at IS NULL AND w.deleted_at IS NULL \
               AND (w.created_at AT TIME ZONE 'UTC')::date >= $3 \
             GROUP BY day ORDER BY day",
        )
        .bind(user_id)
        .bind(exercise_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(classify("Failed to fetch exercise progress"))
    }

    #[instrument(skip(self))]
    async fn training_totals(&self, user_id: i64) -> Result<TrainingTotals, AppError> {
        let workouts = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workouts WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to fetch workout statistics"))?;

        let per_exercise = sqlx::query_as::<_, (i64, i64)>(
            "SELECT e.exercise_id, COUNT(*) FROM workout_entries e \
             JOIN workouts w ON w.id = e.workout_id \
             WHERE w.user_id = $1 AND e.deleted_at IS NULL AND w.deleted_at IS NULL \
             GROUP BY e.exercise_id ORDER BY e.exercise_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify("Failed to fetch exercise statistics"))?;

        Ok(TrainingTotals {
            workouts,
            entries: per_exercise.iter().map(|(_, count)| count).sum(),
            exercise_ids: per_exercise.into_iter().map(|(id, _)| id).collect(),
        })
    }
}
