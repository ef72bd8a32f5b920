use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use crate::db::now_iso;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkType {
    Flashcard,
    Course,
    Assignment,
    Resource,
    Notice,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub assigned_works: Vec<WorkType>,
}

impl TeacherRecord {
    pub fn is_assigned(&self, work: WorkType) -> bool {
        self.assigned_works.contains(&work)
    }
}

pub async fn category_exists<'e, E>(executor: E, category_id: &str) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let found: Option<String> =
        sqlx::query_scalar(r#"SELECT "id" FROM "categories" WHERE "id" = ? LIMIT 1"#)
            .bind(category_id)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

pub async fn find_student_by_user_id<'e, E>(
    executor: E,
    user_id: &str,
) -> Result<Option<StudentRecord>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"SELECT "id","userId","name" FROM "students" WHERE "userId" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_student).transpose()
}

fn map_student(row: &SqliteRow) -> Result<StudentRecord, sqlx::Error> {
    Ok(StudentRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        name: row.try_get("name")?,
    })
}

pub async fn find_teacher_by_user_id<'e, E>(
    executor: E,
    user_id: &str,
) -> Result<Option<TeacherRecord>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"SELECT "id","userId","name","assignedWorks" FROM "teachers" WHERE "userId" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_teacher).transpose()
}

fn map_teacher(row: &SqliteRow) -> Result<TeacherRecord, sqlx::Error> {
    let raw_works: String = row.try_get("assignedWorks")?;
    let assigned_works = serde_json::from_str::<Vec<WorkType>>(&raw_works).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "unreadable assignedWorks, treating as empty");
        Vec::new()
    });

    Ok(TeacherRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        name: row.try_get("name")?,
        assigned_works,
    })
}

/// Inserts a category unless one with the same id already exists.
pub async fn upsert_category<'e, E>(executor: E, category: &CategoryRecord) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"INSERT INTO "categories" ("id","name","createdAt") VALUES (?, ?, ?) ON CONFLICT ("id") DO NOTHING"#,
    )
    .bind(&category.id)
    .bind(&category.name)
    .bind(now_iso())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_student<'e, E>(executor: E, student: &StudentRecord) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"INSERT INTO "students" ("id","userId","name","createdAt") VALUES (?, ?, ?, ?) ON CONFLICT ("id") DO NOTHING"#,
    )
    .bind(&student.id)
    .bind(&student.user_id)
    .bind(&student.name)
    .bind(now_iso())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_teacher<'e, E>(executor: E, teacher: &TeacherRecord) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let works = serde_json::to_string(&teacher.assigned_works)
        .map_err(|err| sqlx::Error::Protocol(format!("assignedWorks: {err}")))?;
    let result = sqlx::query(
        r#"INSERT INTO "teachers" ("id","userId","name","assignedWorks","createdAt") VALUES (?, ?, ?, ?, ?) ON CONFLICT ("id") DO NOTHING"#,
    )
    .bind(&teacher.id)
    .bind(&teacher.user_id)
    .bind(&teacher.name)
    .bind(works)
    .bind(now_iso())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
