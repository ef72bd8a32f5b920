use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor};

use crate::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    OnlyMe,
    Everyone,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::OnlyMe => "ONLY_ME",
            Visibility::Everyone => "EVERYONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONLY_ME" => Some(Visibility::OnlyMe),
            "EVERYONE" => Some(Visibility::Everyone),
            _ => None,
        }
    }

    /// Private decks need no review; public ones wait for a teacher.
    pub fn approved_on_arrival(self) -> bool {
        matches!(self, Visibility::OnlyMe)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub title: String,
    pub visibility: Visibility,
    pub category_id: String,
    pub student_id: String,
    pub is_approved: bool,
    pub approved_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Exact-match filters combined with an optional case-insensitive title search.
#[derive(Debug, Clone, Default)]
pub struct FlashcardFilter {
    pub search_term: Option<String>,
    pub title: Option<String>,
    pub student_id: Option<String>,
    pub category_id: Option<String>,
    pub visibility: Option<Visibility>,
    pub is_approved: Option<bool>,
}

pub const FLASHCARD_SORTABLE: &[(&str, &str)] = &[
    ("createdAt", "createdAt"),
    ("updatedAt", "updatedAt"),
    ("title", "title"),
];

const FLASHCARD_COLUMNS: &str = r#""id","title","visibility","categoryId","studentId","isApproved","approvedBy","createdAt","updatedAt""#;

pub async fn insert_flashcard<'e, E>(executor: E, flashcard: &Flashcard) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO "flashcards"
            ("id","title","visibility","categoryId","studentId","isApproved","approvedBy","createdAt","updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&flashcard.id)
    .bind(&flashcard.title)
    .bind(flashcard.visibility.as_str())
    .bind(&flashcard.category_id)
    .bind(&flashcard.student_id)
    .bind(flashcard.is_approved)
    .bind(flashcard.approved_by.as_deref())
    .bind(&flashcard.created_at)
    .bind(&flashcard.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_flashcard<'e, E>(executor: E, id: &str) -> Result<Option<Flashcard>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(r#"SELECT {FLASHCARD_COLUMNS} FROM "flashcards" WHERE "id" = ? LIMIT 1"#);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(map_flashcard).transpose()
}

/// Writes back every mutable column of the deck.
pub async fn save_flashcard<'e, E>(executor: E, flashcard: &Flashcard) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE "flashcards"
        SET "title" = ?, "visibility" = ?, "isApproved" = ?, "approvedBy" = ?, "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(&flashcard.title)
    .bind(flashcard.visibility.as_str())
    .bind(flashcard.is_approved)
    .bind(flashcard.approved_by.as_deref())
    .bind(&flashcard.updated_at)
    .bind(&flashcard.id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Flips a pending public deck to approved. Returns false when nothing was eligible.
pub async fn approve_pending_flashcard<'e, E>(
    executor: E,
    id: &str,
    teacher_id: &str,
    now: &str,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE "flashcards"
        SET "isApproved" = 1, "approvedBy" = ?, "updatedAt" = ?
        WHERE "id" = ? AND "visibility" = 'EVERYONE' AND "isApproved" = 0
        "#,
    )
    .bind(teacher_id)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns one page of decks plus the total number of matches.
pub async fn list_flashcards(
    pool: &sqlx::SqlitePool,
    filter: &FlashcardFilter,
    pagination: &Pagination,
) -> Result<(Vec<Flashcard>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::<Sqlite>::new(r#"SELECT COUNT(*) AS "count" FROM "flashcards""#);
    push_filters(&mut count_qb, filter);
    let count: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!(r#"SELECT {FLASHCARD_COLUMNS} FROM "flashcards""#));
    push_filters(&mut qb, filter);
    qb.push(format!(
        r#" ORDER BY "{}" {}, rowid {} LIMIT "#,
        pagination.sort_column,
        pagination.sort_order.as_sql(),
        pagination.sort_order.as_sql()
    ));
    qb.push_bind(pagination.limit);
    qb.push(" OFFSET ");
    qb.push_bind(pagination.offset());

    let rows = qb.build().fetch_all(pool).await?;
    let flashcards = rows
        .iter()
        .map(map_flashcard)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((flashcards, count))
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FlashcardFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(term) = filter
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
    {
        qb.push(r#" AND instr(lower("title"), lower("#);
        qb.push_bind(term.to_string());
        qb.push(")) > 0");
    }
    if let Some(title) = &filter.title {
        qb.push(r#" AND "title" = "#);
        qb.push_bind(title.clone());
    }
    if let Some(student_id) = &filter.student_id {
        qb.push(r#" AND "studentId" = "#);
        qb.push_bind(student_id.clone());
    }
    if let Some(category_id) = &filter.category_id {
        qb.push(r#" AND "categoryId" = "#);
        qb.push_bind(category_id.clone());
    }
    if let Some(visibility) = filter.visibility {
        qb.push(r#" AND "visibility" = "#);
        qb.push_bind(visibility.as_str());
    }
    if let Some(is_approved) = filter.is_approved {
        qb.push(r#" AND "isApproved" = "#);
        qb.push_bind(is_approved);
    }
}

fn map_flashcard(row: &SqliteRow) -> Result<Flashcard, sqlx::Error> {
    let raw_visibility: String = row.try_get("visibility")?;
    let visibility = Visibility::parse(&raw_visibility).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "visibility".to_string(),
        source: format!("unknown visibility {raw_visibility}").into(),
    })?;

    Ok(Flashcard {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        visibility,
        category_id: row.try_get("categoryId")?,
        student_id: row.try_get("studentId")?,
        is_approved: row.try_get("isApproved")?,
        approved_by: row.try_get("approvedBy")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
