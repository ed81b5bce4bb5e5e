use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{ExerciseFilter, ExerciseInput, ExerciseModel};
use crate::aggregate::{distinct_ids, invalid_exercises};
use crate::db::{begin, classify, finish, Tx};
use crate::shared::{pagination::PageParams, AppError};

const EXERCISE_COLUMNS: &str =
    "id, name, description, category, primary_muscle, equipment, created_at, updated_at, deleted_at";

/// Exercise catalog. Only live exercises are visible.
#[async_trait]
pub trait ExerciseRepository: Send + Sync {
    /// A name already used by a live exercise yields `DuplicateEntry`
    async fn create_exercise(&self, input: &ExerciseInput) -> Result<ExerciseModel, AppError>;
    async fn get_exercise(&self, exercise_id: i64) -> Result<Option<ExerciseModel>, AppError>;
    /// Returns `None` when the exercise does not exist
    async fn update_exercise(
        &self,
        exercise_id: i64,
        input: &ExerciseInput,
    ) -> Result<Option<ExerciseModel>, AppError>;
    /// Soft delete. Returns whether a live exercise was removed. Refused with
    /// `Validation` where the store can see a live template line or workout
    /// entry still referencing the exercise.
    async fn delete_exercise(&self, exercise_id: i64) -> Result<bool, AppError>;
    /// One page of the filtered catalog ordered by id, plus the filtered total
    async fn list_exercises(
        &self,
        filter: &ExerciseFilter,
        page: PageParams,
    ) -> Result<(Vec<ExerciseModel>, i64), AppError>;
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ExerciseModel>, AppError>;
    /// Number of distinct live exercises among `ids`
    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError>;
}

pub fn exercise_not_found() -> AppError {
    AppError::NotFound("Exercise not found".to_string())
}

pub fn exercise_in_use() -> AppError {
    AppError::Validation("Exercise is used by existing templates or workouts".to_string())
}

fn duplicate_exercise() -> AppError {
    AppError::DuplicateEntry("Exercise with the given name already exists".to_string())
}

/// In-memory implementation of ExerciseRepository for development and testing
pub struct InMemoryExerciseRepository {
    exercises: Mutex<BTreeMap<i64, ExerciseModel>>,
}

impl Default for InMemoryExerciseRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExerciseRepository {
    pub fn new() -> Self {
        Self {
            exercises: Mutex::new(BTreeMap::new()),
        }
    }

    fn name_taken(
        exercises: &BTreeMap<i64, ExerciseModel>,
        name: &str,
        except: Option<i64>,
    ) -> bool {
        exercises
            .values()
            .any(|e| e.deleted_at.is_none() && e.name == name && Some(e.id) != except)
    }
}

#[async_trait]
impl ExerciseRepository for InMemoryExerciseRepository {
    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_exercise(&self, input: &ExerciseInput) -> Result<ExerciseModel, AppError> {
        let mut exercises = self.exercises.lock().unwrap();

        if Self::name_taken(&exercises, &input.name, None) {
            warn!("Exercise name already exists in memory");
            return Err(duplicate_exercise());
        }

        let now = Utc::now();
        let id = exercises.keys().next_back().copied().unwrap_or(0) + 1;
        let exercise = ExerciseModel {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            category: input.category.clone(),
            primary_muscle: input.primary_muscle.clone(),
            equipment: input.equipment.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        exercises.insert(id, exercise.clone());

        debug!(exercise_id = id, "Exercise created in memory");
        Ok(exercise)
    }

    async fn get_exercise(&self, exercise_id: i64) -> Result<Option<ExerciseModel>, AppError> {
        let exercises = self.exercises.lock().unwrap();
        Ok(exercises
            .get(&exercise_id)
            .filter(|e| e.deleted_at.is_none())
            .cloned())
    }

    async fn update_exercise(
        &self,
        exercise_id: i64,
        input: &ExerciseInput,
    ) -> Result<Option<ExerciseModel>, AppError> {
        let mut exercises = self.exercises.lock().unwrap();

        let live = exercises
            .get(&exercise_id)
            .is_some_and(|e| e.deleted_at.is_none());
        if !live {
            return Ok(None);
        }
        if Self::name_taken(&exercises, &input.name, Some(exercise_id)) {
            return Err(duplicate_exercise());
        }

        let Some(exercise) = exercises.get_mut(&exercise_id) else {
            return Ok(None);
        };
        exercise.name = input.name.clone();
        exercise.description = input.description.clone();
        exercise.category = input.category.clone();
        exercise.primary_muscle = input.primary_muscle.clone();
        exercise.equipment = input.equipment.clone();
        exercise.updated_at = Utc::now();

        Ok(Some(exercise.clone()))
    }

    async fn delete_exercise(&self, exercise_id: i64) -> Result<bool, AppError> {
        let mut exercises = self.exercises.lock().unwrap();
        match exercises
            .get_mut(&exercise_id)
            .filter(|e| e.deleted_at.is_none())
        {
            Some(exercise) => {
                exercise.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_exercises(
        &self,
        filter: &ExerciseFilter,
        page: PageParams,
    ) -> Result<(Vec<ExerciseModel>, i64), AppError> {
        let exercises = self.exercises.lock().unwrap();
        let matching: Vec<ExerciseModel> = exercises
            .values()
            .filter(|e| e.deleted_at.is_none() && filter.matches(e))
            .cloned()
            .collect();

        Ok((page.slice(&matching), matching.len() as i64))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ExerciseModel>, AppError> {
        let exercises = self.exercises.lock().unwrap();
        Ok(distinct_ids(ids)
            .iter()
            .filter_map(|id| exercises.get(id))
            .filter(|e| e.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let exercises = self.exercises.lock().unwrap();
        let count = distinct_ids(ids)
            .iter()
            .filter(|id| {
                exercises
                    .get(*id)
                    .is_some_and(|e| e.deleted_at.is_none())
            })
            .count();
        Ok(count as i64)
    }
}

/// PostgreSQL implementation of the exercise catalog
pub struct PostgresExerciseRepository {
    pool: PgPool,
}

impl PostgresExerciseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExerciseFilter) {
    builder.push(" WHERE deleted_at IS NULL");
    if let Some(category) = filter.category() {
        builder.push(" AND category = ").push_bind(category.to_string());
    }
    if let Some(pattern) = filter.search_pattern() {
        builder
            .push(" AND name ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\'");
    }
}

fn map_write_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| match classify(context)(e) {
        AppError::DuplicateEntry(_) => duplicate_exercise(),
        other => other,
    }
}

#[async_trait]
impl ExerciseRepository for PostgresExerciseRepository {
    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_exercise(&self, input: &ExerciseInput) -> Result<ExerciseModel, AppError> {
        let sql = format!(
            "INSERT INTO exercises (name, description, category, primary_muscle, equipment) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            EXERCISE_COLUMNS
        );

        sqlx::query_as::<_, ExerciseModel>(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.category)
            .bind(&input.primary_muscle)
            .bind(&input.equipment)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error("Failed to create exercise"))
    }

    #[instrument(skip(self))]
    async fn get_exercise(&self, exercise_id: i64) -> Result<Option<ExerciseModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM exercises WHERE id = $1 AND deleted_at IS NULL",
            EXERCISE_COLUMNS
        );

        sqlx::query_as::<_, ExerciseModel>(&sql)
            .bind(exercise_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify("Failed to retrieve exercise"))
    }

    #[instrument(skip(self, input))]
    async fn update_exercise(
        &self,
        exercise_id: i64,
        input: &ExerciseInput,
    ) -> Result<Option<ExerciseModel>, AppError> {
        let sql = format!(
            "UPDATE exercises SET name = $1, description = $2, category = $3, \
             primary_muscle = $4, equipment = $5, updated_at = NOW() \
             WHERE id = $6 AND deleted_at IS NULL RETURNING {}",
            EXERCISE_COLUMNS
        );

        sqlx::query_as::<_, ExerciseModel>(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.category)
            .bind(&input.primary_muscle)
            .bind(&input.equipment)
            .bind(exercise_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error("Failed to update exercise"))
    }

    /// Runs as one unit with the exercise row locked `FOR UPDATE`, so aggregate
    /// writers holding `FOR SHARE` either commit first (and are counted) or
    /// find the exercise gone.
    #[instrument(skip(self))]
    async fn delete_exercise(&self, exercise_id: i64) -> Result<bool, AppError> {
        let mut tx = begin(&self.pool).await?;
        let result = remove_exercise(&mut tx, exercise_id).await;
        finish(tx, result).await
    }

    #[instrument(skip(self))]
    async fn list_exercises(
        &self,
        filter: &ExerciseFilter,
        page: PageParams,
    ) -> Result<(Vec<ExerciseModel>, i64), AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exercises");
        push_filters(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify("Failed to count exercises"))?;

        let mut list_query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM exercises", EXERCISE_COLUMNS));
        push_filters(&mut list_query, filter);
        list_query
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let exercises = list_query
            .build_query_as::<ExerciseModel>()
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to retrieve exercises"))?;

        Ok((exercises, total))
    }

    #[instrument(skip(self))]
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ExerciseModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM exercises WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id",
            EXERCISE_COLUMNS
        );

        sqlx::query_as::<_, ExerciseModel>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to retrieve exercises"))
    }

    #[instrument(skip(self))]
    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM exercises WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to verify exercises"))
    }
}

async fn remove_exercise(tx: &mut Tx, exercise_id: i64) -> Result<bool, AppError> {
    let locked = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM exercises WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(exercise_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify("Failed to delete exercise"))?;
    if locked.is_none() {
        return Ok(false);
    }

    let references = sqlx::query_scalar::<_, i64>(
        "SELECT (SELECT COUNT(*) FROM template_exercises te \
                 JOIN templates t ON t.id = te.template_id \
                 WHERE te.exercise_id = $1 AND te.deleted_at IS NULL AND t.deleted_at IS NULL) \
              + (SELECT COUNT(*) FROM workout_entries we \
                 JOIN workouts w ON w.id = we.workout_id \
                 WHERE we.exercise_id = $1 AND we.deleted_at IS NULL AND w.deleted_at IS NULL)",
    )
    .bind(exercise_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(classify("Failed to check exercise usage"))?;
    if references > 0 {
        warn!(exercise_id, references, "Exercise referenced inside delete unit");
        return Err(exercise_in_use());
    }

    sqlx::query("UPDATE exercises SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(exercise_id)
        .execute(&mut **tx)
        .await
        .map_err(classify("Failed to delete exercise"))?;

    debug!(exercise_id, "Exercise soft-deleted");
    Ok(true)
}

/// Share-locks the referenced exercises inside an aggregate write so they cannot
/// be deleted before the unit commits. Fails when any of them is not live.
pub async fn lock_live_exercises(tx: &mut Tx, ids: &[i64]) -> Result<(), AppError> {
    let wanted: BTreeSet<i64> = ids.iter().copied().collect();
    let wanted: Vec<i64> = wanted.into_iter().collect();

    let locked = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM exercises WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id FOR SHARE",
    )
    .bind(&wanted)
    .fetch_all(&mut **tx)
    .await
    .map_err(classify("Failed to verify exercises"))?;

    if locked.len() != wanted.len() {
        warn!(
            requested = wanted.len(),
            found = locked.len(),
            "Exercise disappeared before commit"
        );
        return Err(invalid_exercises());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, category: &str) -> ExerciseInput {
        ExerciseInput {
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            primary_muscle: "chest".to_string(),
            equipment: "barbell".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let repo = InMemoryExerciseRepository::new();
        repo.create_exercise(&input("Bench Press", "strength"))
            .await
            .unwrap();

        let result = repo.create_exercise(&input("Bench Press", "strength")).await;
        assert!(matches!(result, Err(AppError::DuplicateEntry(_))));
    }

    #[tokio::test]
    async fn test_deleted_name_can_be_reused() {
        let repo = InMemoryExerciseRepository::new();
        let first = repo.create_exercise(&input("Squat", "strength")).await.unwrap();
        assert!(repo.delete_exercise(first.id).await.unwrap());

        let second = repo.create_exercise(&input("Squat", "strength")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(repo.get_exercise(first.id).await.unwrap().is_none());
        assert!(!repo.delete_exercise(first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_exercise() {
        let repo = InMemoryExerciseRepository::new();
        let bench = repo.create_exercise(&input("Bench", "strength")).await.unwrap();
        repo.create_exercise(&input("Row", "strength")).await.unwrap();

        let updated = repo
            .update_exercise(bench.id, &input("Bench Press", "strength"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Bench Press");

        let clash = repo.update_exercise(bench.id, &input("Row", "strength")).await;
        assert!(matches!(clash, Err(AppError::DuplicateEntry(_))));

        assert!(repo
            .update_exercise(99, &input("Ghost", "strength"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let repo = InMemoryExerciseRepository::new();
        for name in ["Bench Press", "Incline Press", "Overhead Press"] {
            repo.create_exercise(&input(name, "strength")).await.unwrap();
        }
        repo.create_exercise(&input("Rowing", "cardio")).await.unwrap();

        let filter = ExerciseFilter {
            category: Some("strength".to_string()),
            search: Some("press".to_string()),
        };
        let (page, total) = repo
            .list_exercises(&filter, PageParams { page: 2, limit: 2 })
            .await
            .unwrap();

        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "Overhead Press");
    }

    #[tokio::test]
    async fn test_count_existing_ignores_duplicates_and_deleted() {
        let repo = InMemoryExerciseRepository::new();
        let a = repo.create_exercise(&input("A", "strength")).await.unwrap();
        let b = repo.create_exercise(&input("B", "strength")).await.unwrap();
        repo.delete_exercise(b.id).await.unwrap();

        assert_eq!(repo.count_existing(&[a.id, a.id]).await.unwrap(), 1);
        assert_eq!(repo.count_existing(&[a.id, b.id, 42]).await.unwrap(), 1);

        let found = repo.find_by_ids(&[a.id, b.id, a.id]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
