use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInteraction {
    pub card_id: String,
    pub is_known: bool,
    pub is_learned: bool,
}

impl CardInteraction {
    pub fn fresh(card_id: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            is_known: false,
            is_learned: false,
        }
    }
}

/// Learning progress of one student across one deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardHistory {
    pub id: String,
    pub student_id: String,
    pub flashcard_id: String,
    pub interactions: Vec<CardInteraction>,
    pub created_at: String,
    pub updated_at: String,
}

impl FlashcardHistory {
    pub fn interaction(&self, card_id: &str) -> Option<&CardInteraction> {
        self.interactions.iter().find(|entry| entry.card_id == card_id)
    }
}

pub async fn find_history(
    conn: &mut SqliteConnection,
    student_id: &str,
    flashcard_id: &str,
) -> Result<Option<FlashcardHistory>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id","studentId","flashcardId","createdAt","updatedAt"
        FROM "flashcard_histories"
        WHERE "studentId" = ? AND "flashcardId" = ?
        LIMIT 1
        "#,
    )
    .bind(student_id)
    .bind(flashcard_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut history = map_history(&row)?;
    history.interactions = load_interactions(&mut *conn, &history.id).await?;
    Ok(Some(history))
}

/// Inserts the (student, deck) history if absent, then reads back whichever row won.
///
/// The boolean is true when this call created the row.
pub async fn ensure_history(
    conn: &mut SqliteConnection,
    student_id: &str,
    flashcard_id: &str,
    now: &str,
) -> Result<(FlashcardHistory, bool), sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO "flashcard_histories" ("id","studentId","flashcardId","createdAt","updatedAt")
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT ("studentId","flashcardId") DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(student_id)
    .bind(flashcard_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    let history = find_history(conn, student_id, flashcard_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((history, inserted))
}

/// Every history recorded against a deck.
pub async fn list_histories_for_flashcard(
    conn: &mut SqliteConnection,
    flashcard_id: &str,
) -> Result<Vec<FlashcardHistory>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id","studentId","flashcardId","createdAt","updatedAt"
        FROM "flashcard_histories"
        WHERE "flashcardId" = ?
        ORDER BY "createdAt" ASC, rowid ASC
        "#,
    )
    .bind(flashcard_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut histories = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut history = map_history(row)?;
        history.interactions = load_interactions(&mut *conn, &history.id).await?;
        histories.push(history);
    }
    Ok(histories)
}

async fn load_interactions(
    conn: &mut SqliteConnection,
    history_id: &str,
) -> Result<Vec<CardInteraction>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "cardId","isKnown","isLearned"
        FROM "flashcard_interactions"
        WHERE "historyId" = ?
        ORDER BY "position" ASC, rowid ASC
        "#,
    )
    .bind(history_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_interaction).collect()
}

/// Appends interactions after the existing ones; entries already present are left alone.
pub async fn append_interactions(
    conn: &mut SqliteConnection,
    history_id: &str,
    first_position: usize,
    interactions: &[CardInteraction],
) -> Result<(), sqlx::Error> {
    for (offset, interaction) in interactions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO "flashcard_interactions" ("historyId","cardId","isKnown","isLearned","position")
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT ("historyId","cardId") DO NOTHING
            "#,
        )
        .bind(history_id)
        .bind(&interaction.card_id)
        .bind(interaction.is_known)
        .bind(interaction.is_learned)
        .bind((first_position + offset) as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn save_interaction<'e, E>(
    executor: E,
    history_id: &str,
    interaction: &CardInteraction,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE "flashcard_interactions"
        SET "isKnown" = ?, "isLearned" = ?
        WHERE "historyId" = ? AND "cardId" = ?
        "#,
    )
    .bind(interaction.is_known)
    .bind(interaction.is_learned)
    .bind(history_id)
    .bind(&interaction.card_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn touch_history<'e, E>(executor: E, history_id: &str, now: &str) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(r#"UPDATE "flashcard_histories" SET "updatedAt" = ? WHERE "id" = ?"#)
        .bind(now)
        .bind(history_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Drops the card's entry from every history that references it.
pub async fn prune_card_from_histories<'e, E>(executor: E, card_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(r#"DELETE FROM "flashcard_interactions" WHERE "cardId" = ?"#)
        .bind(card_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

fn map_history(row: &SqliteRow) -> Result<FlashcardHistory, sqlx::Error> {
    Ok(FlashcardHistory {
        id: row.try_get("id")?,
        student_id: row.try_get("studentId")?,
        flashcard_id: row.try_get("flashcardId")?,
        interactions: Vec::new(),
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

fn map_interaction(row: &SqliteRow) -> Result<CardInteraction, sqlx::Error> {
    Ok(CardInteraction {
        card_id: row.try_get("cardId")?,
        is_known: row.try_get("isKnown")?,
        is_learned: row.try_get("isLearned")?,
    })
}
