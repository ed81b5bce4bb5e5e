use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::models::{NewTemplateExercise, TemplateDraft, TemplateExerciseModel, TemplateModel};
use crate::db::{self, classify, Tx};
use crate::exercise::repository::lock_live_exercises;
use crate::shared::{pagination::PageParams, AppError};

const TEMPLATE_COLUMNS: &str = "id, name, description, user_id, created_at, updated_at, deleted_at";
const TEMPLATE_EXERCISE_COLUMNS: &str =
    "id, template_id, exercise_id, sets, created_at, updated_at, deleted_at";

pub fn template_not_found() -> AppError {
    AppError::NotFound("Template not found".to_string())
}

pub fn template_in_use() -> AppError {
    AppError::Validation("Template is used by existing workouts".to_string())
}

/// Storage for the template aggregate (template row plus its exercise lines).
/// Writes to an aggregate are atomic: every row is stored or none is.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Inserts the template and all of its lines as one unit
    async fn create_with_exercises(
        &self,
        user_id: i64,
        draft: &TemplateDraft,
        exercises: &[NewTemplateExercise],
    ) -> Result<TemplateModel, AppError>;
    async fn find_owned(
        &self,
        template_id: i64,
        user_id: i64,
    ) -> Result<Option<TemplateModel>, AppError>;
    /// Live lines of a template in insertion order
    async fn exercises_for(&self, template_id: i64) -> Result<Vec<TemplateExerciseModel>, AppError>;
    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<TemplateModel>, i64), AppError>;
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<TemplateModel>, AppError>;
    /// Removes the lines and then the template as one unit.
    /// `NotFound` when the caller does not own the template.
    async fn delete_owned(&self, template_id: i64, user_id: i64) -> Result<(), AppError>;
    /// Number of live template lines pointing at the exercise
    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError>;
}

#[derive(Default)]
struct TemplateStore {
    templates: BTreeMap<i64, TemplateModel>,
    exercises: BTreeMap<i64, TemplateExerciseModel>,
}

/// In-memory implementation of TemplateRepository for development and testing.
/// Aggregate writes are staged and only applied once every row passes the
/// checks the database schema enforces.
pub struct InMemoryTemplateRepository {
    store: Mutex<TemplateStore>,
}

impl Default for InMemoryTemplateRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(TemplateStore::default()),
        }
    }

    /// Number of template lines stored, live or not
    pub fn line_count(&self) -> usize {
        self.store.lock().unwrap().exercises.len()
    }

    pub fn template_count(&self) -> usize {
        self.store.lock().unwrap().templates.len()
    }
}

fn next_id<T>(rows: &BTreeMap<i64, T>) -> i64 {
    rows.keys().next_back().copied().unwrap_or(0) + 1
}

/// Mirrors the CHECK and unique constraints on template_exercises
fn check_lines(exercises: &[NewTemplateExercise]) -> Result<(), AppError> {
    let mut seen = BTreeSet::new();
    for line in exercises {
        if line.sets <= 0 {
            return Err(AppError::InvalidInput(
                "Value violates a constraint".to_string(),
            ));
        }
        if !seen.insert(line.exercise_id) {
            return Err(AppError::DuplicateEntry("Record already exists".to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    #[instrument(skip(self, draft, exercises), fields(lines = exercises.len()))]
    async fn create_with_exercises(
        &self,
        user_id: i64,
        draft: &TemplateDraft,
        exercises: &[NewTemplateExercise],
    ) -> Result<TemplateModel, AppError> {
        let mut store = self.store.lock().unwrap();

        check_lines(exercises)?;

        let now = Utc::now();
        let template = TemplateModel {
            id: next_id(&store.templates),
            name: draft.name.clone(),
            description: draft.description.clone(),
            user_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let first_line = next_id(&store.exercises);
        let lines: Vec<TemplateExerciseModel> = exercises
            .iter()
            .zip(first_line..)
            .map(|(line, id)| TemplateExerciseModel {
                id,
                template_id: template.id,
                exercise_id: line.exercise_id,
                sets: line.sets,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .collect();

        store.templates.insert(template.id, template.clone());
        for line in lines {
            store.exercises.insert(line.id, line);
        }

        debug!(template_id = template.id, "Template created in memory");
        Ok(template)
    }

    async fn find_owned(
        &self,
        template_id: i64,
        user_id: i64,
    ) -> Result<Option<TemplateModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .templates
            .get(&template_id)
            .filter(|t| t.deleted_at.is_none() && t.user_id == user_id)
            .cloned())
    }

    async fn exercises_for(&self, template_id: i64) -> Result<Vec<TemplateExerciseModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .exercises
            .values()
            .filter(|line| line.template_id == template_id && line.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<TemplateModel>, i64), AppError> {
        let store = self.store.lock().unwrap();
        let owned: Vec<TemplateModel> = store
            .templates
            .values()
            .filter(|t| t.deleted_at.is_none() && t.user_id == user_id)
            .cloned()
            .collect();

        Ok((page.slice(&owned), owned.len() as i64))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<TemplateModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .templates
            .values()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_owned(&self, template_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();

        let owned = store
            .templates
            .get(&template_id)
            .is_some_and(|t| t.deleted_at.is_none() && t.user_id == user_id);
        if !owned {
            return Err(template_not_found());
        }

        let now = Utc::now();
        for line in store
            .exercises
            .values_mut()
            .filter(|line| line.template_id == template_id && line.deleted_at.is_none())
        {
            line.deleted_at = Some(now);
        }
        if let Some(template) = store.templates.get_mut(&template_id) {
            template.deleted_at = Some(now);
        }

        debug!(template_id, "Template deleted in memory");
        Ok(())
    }

    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError> {
        let store = self.store.lock().unwrap();
        let count = store
            .exercises
            .values()
            .filter(|line| line.exercise_id == exercise_id && line.deleted_at.is_none())
            .count();
        Ok(count as i64)
    }
}

/// PostgreSQL implementation of the template aggregate store
pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_template(
    tx: &mut Tx,
    user_id: i64,
    draft: &TemplateDraft,
    exercises: &[NewTemplateExercise],
) -> Result<TemplateModel, AppError> {
    let ids: Vec<i64> = exercises.iter().map(|line| line.exercise_id).collect();
    lock_live_exercises(tx, &ids).await?;

    let sql = format!(
        "INSERT INTO templates (name, description, user_id) VALUES ($1, $2, $3) RETURNING {}",
        TEMPLATE_COLUMNS
    );
    let template = sqlx::query_as::<_, TemplateModel>(&sql)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify("Failed to create template"))?;

    if !exercises.is_empty() {
        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO template_exercises (template_id, exercise_id, sets) ",
        );
        insert.push_values(exercises, |mut row, line| {
            row.push_bind(template.id)
                .push_bind(line.exercise_id)
                .push_bind(line.sets);
        });
        insert
            .build()
            .execute(&mut **tx)
            .await
            .map_err(classify("Failed to create template exercises"))?;
    }

    Ok(template)
}

async fn remove_template(tx: &mut Tx, template_id: i64, user_id: i64) -> Result<(), AppError> {
    let locked = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM templates WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify("Failed to find template"))?;

    if locked.is_none() {
        return Err(template_not_found());
    }

    // Workout writers share-lock the template, so this count is stable until commit
    let workouts = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM workouts WHERE template_id = $1 AND deleted_at IS NULL",
    )
    .bind(template_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(classify("Failed to check template usage"))?;

    if workouts > 0 {
        warn!(template_id, workouts, "Template still referenced by workouts");
        return Err(template_in_use());
    }

    sqlx::query(
        "UPDATE template_exercises SET deleted_at = NOW() \
         WHERE template_id = $1 AND deleted_at IS NULL",
    )
    .bind(template_id)
    .execute(&mut **tx)
    .await
    .map_err(classify("Failed to delete template exercises"))?;

    sqlx::query("UPDATE templates SET deleted_at = NOW() WHERE id = $1")
        .bind(template_id)
        .execute(&mut **tx)
        .await
        .map_err(classify("Failed to delete template"))?;

    Ok(())
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    #[instrument(skip(self, draft, exercises), fields(lines = exercises.len()))]
    async fn create_with_exercises(
        &self,
        user_id: i64,
        draft: &TemplateDraft,
        exercises: &[NewTemplateExercise],
    ) -> Result<TemplateModel, AppError> {
        let mut tx = db::begin(&self.pool).await?;
        let result = insert_template(&mut tx, user_id, draft, exercises).await;
        let template = db::finish(tx, result).await?;

        info!(template_id = template.id, "Template stored");
        Ok(template)
    }

    #[instrument(skip(self))]
    async fn find_owned(
        &self,
        template_id: i64,
        user_id: i64,
    ) -> Result<Option<TemplateModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM templates WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            TEMPLATE_COLUMNS
        );

        sqlx::query_as::<_, TemplateModel>(&sql)
            .bind(template_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify("Failed to fetch template"))
    }

    #[instrument(skip(self))]
    async fn exercises_for(&self, template_id: i64) -> Result<Vec<TemplateExerciseModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM template_exercises WHERE template_id = $1 AND deleted_at IS NULL \
             ORDER BY id",
            TEMPLATE_EXERCISE_COLUMNS
        );

        sqlx::query_as::<_, TemplateExerciseModel>(&sql)
            .bind(template_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to fetch template exercises"))
    }

    #[instrument(skip(self))]
    async fn list_owned(
        &self,
        user_id: i64,
        page: PageParams,
    ) -> Result<(Vec<TemplateModel>, i64), AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM templates WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to count templates"))?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let sql = format!(
            "SELECT {} FROM templates WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY id LIMIT $2 OFFSET $3",
            TEMPLATE_COLUMNS
        );
        let templates = sqlx::query_as::<_, TemplateModel>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to fetch templates"))?;

        Ok((templates, total))
    }

    #[instrument(skip(self))]
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<TemplateModel>, AppError> {
        let sql = format!(
            "SELECT {} FROM templates WHERE id = ANY($1)",
            TEMPLATE_COLUMNS
        );

        sqlx::query_as::<_, TemplateModel>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify("Failed to fetch templates"))
    }

    #[instrument(skip(self))]
    async fn delete_owned(&self, template_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut tx = db::begin(&self.pool).await?;
        let result = remove_template(&mut tx, template_id, user_id).await;
        db::finish(tx, result).await?;

        info!(template_id, "Template deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_exercise_references(&self, exercise_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM template_exercises te \
             JOIN templates t ON t.id = te.template_id \
             WHERE te.exercise_id = $1 AND te.deleted_at IS NULL AND t.deleted_at IS NULL",
        )
        .bind(exercise_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify("Failed to check exercise usage"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> TemplateDraft {
        TemplateDraft {
            name: name.to_string(),
            description: String::new(),
        }
    }

    fn line(exercise_id: i64, sets: i32) -> NewTemplateExercise {
        NewTemplateExercise { exercise_id, sets }
    }

    #[tokio::test]
    async fn test_create_stores_template_and_lines() {
        let repo = InMemoryTemplateRepository::new();
        let template = repo
            .create_with_exercises(1, &draft("Push"), &[line(1, 3), line(2, 4)])
            .await
            .unwrap();

        let lines = repo.exercises_for(template.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].exercise_id, 1);
        assert_eq!(lines[1].sets, 4);
        assert!(lines.iter().all(|l| l.template_id == template.id));
    }

    #[tokio::test]
    async fn test_failing_line_stores_nothing() {
        let repo = InMemoryTemplateRepository::new();

        let bad_sets = repo
            .create_with_exercises(1, &draft("Push"), &[line(1, 3), line(2, 0)])
            .await;
        assert!(matches!(bad_sets, Err(AppError::InvalidInput(_))));

        let repeated = repo
            .create_with_exercises(1, &draft("Push"), &[line(1, 3), line(1, 5)])
            .await;
        assert!(matches!(repeated, Err(AppError::DuplicateEntry(_))));

        assert_eq!(repo.template_count(), 0);
        assert_eq!(repo.line_count(), 0);
    }

    #[tokio::test]
    async fn test_ownership_filter() {
        let repo = InMemoryTemplateRepository::new();
        let template = repo
            .create_with_exercises(1, &draft("Push"), &[line(1, 3)])
            .await
            .unwrap();

        assert!(repo.find_owned(template.id, 1).await.unwrap().is_some());
        assert!(repo.find_owned(template.id, 2).await.unwrap().is_none());

        let stranger = repo.delete_owned(template.id, 2).await;
        assert!(matches!(stranger, Err(AppError::NotFound(_))));
        assert!(repo.find_owned(template.id, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_lines_then_template() {
        let repo = InMemoryTemplateRepository::new();
        let template = repo
            .create_with_exercises(1, &draft("Push"), &[line(1, 3), line(2, 3)])
            .await
            .unwrap();
        assert_eq!(repo.count_exercise_references(1).await.unwrap(), 1);

        repo.delete_owned(template.id, 1).await.unwrap();

        assert!(repo.find_owned(template.id, 1).await.unwrap().is_none());
        assert!(repo.exercises_for(template.id).await.unwrap().is_empty());
        assert_eq!(repo.count_exercise_references(1).await.unwrap(), 0);

        let again = repo.delete_owned(template.id, 1).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_owned_paginates() {
        let repo = InMemoryTemplateRepository::new();
        for name in ["A", "B", "C"] {
            repo.create_with_exercises(1, &draft(name), &[line(1, 1)])
                .await
                .unwrap();
        }
        repo.create_with_exercises(2, &draft("Other"), &[line(1, 1)])
            .await
            .unwrap();

        let (page, total) = repo
            .list_owned(1, PageParams { page: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }
}
