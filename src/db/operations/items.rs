use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardItem {
    pub id: String,
    pub flashcard_id: String,
    pub term: String,
    pub answer: String,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// An item together with whether one particular student has favorited it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerItem {
    pub item: FlashcardItem,
    pub is_favorite: bool,
}

const ITEM_COLUMNS: &str =
    r#"i."id", i."flashcardId", i."term", i."answer", i."viewCount", i."createdAt", i."updatedAt""#;

pub async fn insert_item<'e, E>(executor: E, item: &FlashcardItem) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO "flashcard_items" ("id","flashcardId","term","answer","viewCount","createdAt","updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.id)
    .bind(&item.flashcard_id)
    .bind(&item.term)
    .bind(&item.answer)
    .bind(item.view_count)
    .bind(&item.created_at)
    .bind(&item.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_item<'e, E>(executor: E, id: &str) -> Result<Option<FlashcardItem>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(r#"SELECT {ITEM_COLUMNS} FROM "flashcard_items" i WHERE i."id" = ? LIMIT 1"#);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(map_item).transpose()
}

/// Items of a deck in creation order.
pub async fn list_items<'e, E>(executor: E, flashcard_id: &str) -> Result<Vec<FlashcardItem>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"SELECT {ITEM_COLUMNS} FROM "flashcard_items" i WHERE i."flashcardId" = ? ORDER BY i."createdAt" ASC, i.rowid ASC"#
    );
    let rows = sqlx::query(&sql).bind(flashcard_id).fetch_all(executor).await?;
    rows.iter().map(map_item).collect()
}

/// Items of a deck in creation order, flagged with the viewer's favorite state.
pub async fn list_items_for_viewer<'e, E>(
    executor: E,
    flashcard_id: &str,
    viewer_student_id: Option<&str>,
) -> Result<Vec<ViewerItem>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {ITEM_COLUMNS},
            EXISTS (
                SELECT 1 FROM "flashcard_item_favorites" f
                WHERE f."itemId" = i."id" AND f."studentId" = ?
            ) AS "isFavorite"
        FROM "flashcard_items" i
        WHERE i."flashcardId" = ?
        ORDER BY i."createdAt" ASC, i.rowid ASC
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(viewer_student_id)
        .bind(flashcard_id)
        .fetch_all(executor)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(ViewerItem {
                item: map_item(row)?,
                is_favorite: row.try_get::<bool, _>("isFavorite")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
}

pub async fn update_item_content<'e, E>(
    executor: E,
    id: &str,
    term: &str,
    answer: &str,
    now: &str,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"UPDATE "flashcard_items" SET "term" = ?, "answer" = ?, "updatedAt" = ? WHERE "id" = ?"#,
    )
    .bind(term)
    .bind(answer)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Bumps the shared view counter in a single statement so concurrent swipes never lose an update.
pub async fn increment_view_count<'e, E>(executor: E, id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result =
        sqlx::query(r#"UPDATE "flashcard_items" SET "viewCount" = "viewCount" + 1 WHERE "id" = ?"#)
            .bind(id)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}

pub async fn delete_item<'e, E>(executor: E, id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(r#"DELETE FROM "flashcard_items" WHERE "id" = ?"#)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn add_favorite<'e, E>(
    executor: E,
    item_id: &str,
    student_id: &str,
    now: &str,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"INSERT INTO "flashcard_item_favorites" ("itemId","studentId","createdAt") VALUES (?, ?, ?) ON CONFLICT ("itemId","studentId") DO NOTHING"#,
    )
    .bind(item_id)
    .bind(student_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn remove_favorite<'e, E>(executor: E, item_id: &str, student_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"DELETE FROM "flashcard_item_favorites" WHERE "itemId" = ? AND "studentId" = ?"#,
    )
    .bind(item_id)
    .bind(student_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_favorites_for_item<'e, E>(executor: E, item_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(r#"DELETE FROM "flashcard_item_favorites" WHERE "itemId" = ?"#)
        .bind(item_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Students currently holding the item in their favorites.
pub async fn list_favorited_by<'e, E>(executor: E, item_id: &str) -> Result<Vec<String>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar(
        r#"SELECT "studentId" FROM "flashcard_item_favorites" WHERE "itemId" = ? ORDER BY "studentId""#,
    )
    .bind(item_id)
    .fetch_all(executor)
    .await
}

/// Every item the student has favorited, most recently favorited first.
pub async fn list_favorite_items<'e, E>(executor: E, student_id: &str) -> Result<Vec<FlashcardItem>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM "flashcard_items" i
        JOIN "flashcard_item_favorites" f ON f."itemId" = i."id"
        WHERE f."studentId" = ?
        ORDER BY f."createdAt" DESC, f.rowid DESC
        "#
    );
    let rows = sqlx::query(&sql).bind(student_id).fetch_all(executor).await?;
    rows.iter().map(map_item).collect()
}

fn map_item(row: &SqliteRow) -> Result<FlashcardItem, sqlx::Error> {
    Ok(FlashcardItem {
        id: row.try_get("id")?,
        flashcard_id: row.try_get("flashcardId")?,
        term: row.try_get("term")?,
        answer: row.try_get("answer")?,
        view_count: row.try_get("viewCount")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
