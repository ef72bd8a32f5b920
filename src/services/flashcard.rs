use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::db::operations::{
    add_favorite, append_interactions, approve_pending_flashcard, category_exists,
    delete_favorites_for_item, delete_item, ensure_history, find_flashcard, find_history,
    find_item, find_student_by_user_id, find_teacher_by_user_id, increment_view_count,
    insert_flashcard, insert_item, list_favorite_items, list_histories_for_flashcard, list_items,
    list_items_for_viewer, prune_card_from_histories, remove_favorite, save_flashcard,
    save_interaction, touch_history, update_item_content, CardInteraction, Flashcard,
    FlashcardFilter, FlashcardHistory, FlashcardItem, StudentRecord, TeacherRecord, ViewerItem,
    Visibility, WorkType, FLASHCARD_SORTABLE,
};
use crate::db::{now_iso, DatabaseProxy, UnitOfWork};
use crate::pagination::{PageMeta, PageParams, Pagination};
use crate::response::{AppError, ErrorSource};
use crate::services::history_sync::{is_in_sync, reconcile, SwipeDirection};

pub const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum FlashcardError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed")]
    Validation(Vec<ErrorSource>),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

impl FlashcardError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<FlashcardError> for AppError {
    fn from(err: FlashcardError) -> Self {
        match err {
            FlashcardError::NotFound(message) => AppError::not_found(message),
            FlashcardError::BadRequest(message) => AppError::bad_request(message),
            FlashcardError::Forbidden(message) => AppError::forbidden(message),
            FlashcardError::Conflict(message) => AppError::conflict(message),
            FlashcardError::Validation(sources) => AppError::validation(sources),
            FlashcardError::Integrity(message) => {
                tracing::warn!(error = %message, "flashcard integrity violation");
                AppError::internal(message)
            }
            FlashcardError::Sql(err) => AppError::internal(err.to_string()),
        }
    }
}

/// Unique-title violations surface as a conflict; everything else stays a database error.
fn title_conflict(err: sqlx::Error) -> FlashcardError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            FlashcardError::Conflict("A flashcard with this title already exists".to_string())
        }
        _ => FlashcardError::Sql(err),
    }
}

// ========== Payloads ==========

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItemInput {
    pub term: String,
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlashcardInput {
    pub title: String,
    pub visibility: Visibility,
    pub category_id: String,
    #[serde(default)]
    pub items: Vec<NewItemInput>,
}

/// An entry of the mixed-mode item list: with an id it edits, without one it creates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChangeInput {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub term: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlashcardInput {
    pub title: Option<String>,
    pub visibility: Option<Visibility>,
    pub items: Option<Vec<ItemChangeInput>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardWithItems {
    #[serde(flatten)]
    pub flashcard: Flashcard,
    pub items: Vec<FlashcardItem>,
}

/// One card as the caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub term: String,
    pub answer: String,
    pub view_count: i64,
    pub is_favorite: bool,
    pub is_known: bool,
    pub is_learned: bool,
}

impl ItemView {
    fn unstudied(entry: &ViewerItem) -> Self {
        Self::with_progress(entry, &CardInteraction::fresh(entry.item.id.clone()))
    }

    fn with_progress(entry: &ViewerItem, interaction: &CardInteraction) -> Self {
        Self {
            id: entry.item.id.clone(),
            term: entry.item.term.clone(),
            answer: entry.item.answer.clone(),
            view_count: entry.item.view_count,
            is_favorite: entry.is_favorite,
            is_known: interaction.is_known,
            is_learned: interaction.is_learned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardView {
    #[serde(flatten)]
    pub flashcard: Flashcard,
    pub items: Vec<ItemView>,
    pub has_history: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    #[serde(flatten)]
    pub item: FlashcardItem,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub item_id: String,
    pub is_favorite: bool,
}

// ========== Callers ==========

/// The authenticated user resolved against the directory.
#[derive(Debug, Clone)]
pub enum Actor {
    Student(StudentRecord),
    Teacher(TeacherRecord),
    Admin { user_id: String },
}

impl Actor {
    pub fn student(&self) -> Option<&StudentRecord> {
        match self {
            Actor::Student(student) => Some(student),
            _ => None,
        }
    }

    /// Owner, teacher assigned to flashcards, or any admin.
    pub fn can_modify(&self, flashcard: &Flashcard) -> bool {
        match self {
            Actor::Student(student) => student.id == flashcard.student_id,
            Actor::Teacher(teacher) => teacher.is_assigned(WorkType::Flashcard),
            Actor::Admin { .. } => true,
        }
    }
}

pub async fn resolve_actor(pool: &SqlitePool, user: &AuthUser) -> Result<Actor, FlashcardError> {
    match user.role {
        Role::Student => find_student_by_user_id(pool, &user.id)
            .await?
            .map(Actor::Student)
            .ok_or_else(|| FlashcardError::not_found("Student not found")),
        Role::Teacher => find_teacher_by_user_id(pool, &user.id)
            .await?
            .map(Actor::Teacher)
            .ok_or_else(|| FlashcardError::not_found("Teacher not found")),
        Role::Admin | Role::SuperAdmin => Ok(Actor::Admin {
            user_id: user.id.clone(),
        }),
    }
}

async fn require_student(pool: &SqlitePool, user: &AuthUser) -> Result<StudentRecord, FlashcardError> {
    find_student_by_user_id(pool, &user.id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Student not found"))
}

fn ensure_visible(flashcard: &Flashcard, student: &StudentRecord) -> Result<(), FlashcardError> {
    if flashcard.visibility == Visibility::OnlyMe && flashcard.student_id != student.id {
        return Err(FlashcardError::Forbidden(
            "This flashcard is private to its owner".to_string(),
        ));
    }
    Ok(())
}

// ========== Validation ==========

fn checked_title(raw: &str, sources: &mut Vec<ErrorSource>) -> String {
    let title = raw.trim();
    if title.is_empty() {
        sources.push(ErrorSource::new("title", "Title is required"));
    } else if title.chars().count() > TITLE_MAX_CHARS {
        sources.push(ErrorSource::new(
            "title",
            format!("Title must be at most {TITLE_MAX_CHARS} characters"),
        ));
    }
    title.to_string()
}

fn checked_item(
    index: usize,
    term: &str,
    answer: &str,
    sources: &mut Vec<ErrorSource>,
) -> (String, String) {
    let term = term.trim();
    let answer = answer.trim();
    if term.is_empty() {
        sources.push(ErrorSource::new(format!("items.{index}.term"), "Term is required"));
    }
    if answer.is_empty() {
        sources.push(ErrorSource::new(
            format!("items.{index}.answer"),
            "Answer is required",
        ));
    }
    (term.to_string(), answer.to_string())
}

fn new_item(flashcard_id: &str, term: String, answer: String, now: &str) -> FlashcardItem {
    FlashcardItem {
        id: Uuid::new_v4().to_string(),
        flashcard_id: flashcard_id.to_string(),
        term,
        answer,
        view_count: 0,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

// ========== History alignment shared by view, update and swipe ==========

async fn reconcile_in(
    uow: &mut UnitOfWork,
    history: FlashcardHistory,
    current_item_ids: &[String],
    now: &str,
) -> Result<FlashcardHistory, FlashcardError> {
    let reconciliation = reconcile(history, current_item_ids);
    if reconciliation.appended.is_empty() {
        return Ok(reconciliation.history);
    }

    append_interactions(
        uow.conn(),
        &reconciliation.history.id,
        reconciliation.first_appended_position(),
        &reconciliation.appended,
    )
    .await?;
    touch_history(uow.conn(), &reconciliation.history.id, now).await?;

    tracing::debug!(
        history_id = %reconciliation.history.id,
        appended = reconciliation.appended.len(),
        "history backfilled"
    );

    let mut history = reconciliation.history;
    history.updated_at = now.to_string();
    Ok(history)
}

// ========== Operations ==========

/// Creates a deck with its cards for the calling student, all or nothing.
pub async fn create_flashcard(
    db: &DatabaseProxy,
    user: &AuthUser,
    input: CreateFlashcardInput,
) -> Result<FlashcardWithItems, FlashcardError> {
    if input.items.is_empty() {
        return Err(FlashcardError::BadRequest(
            "At least one flashcard item is required".to_string(),
        ));
    }

    let mut sources = Vec::new();
    let title = checked_title(&input.title, &mut sources);
    let contents: Vec<(String, String)> = input
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| checked_item(index, &item.term, &item.answer, &mut sources))
        .collect();
    if !sources.is_empty() {
        return Err(FlashcardError::Validation(sources));
    }

    if !category_exists(db.pool(), &input.category_id).await? {
        return Err(FlashcardError::not_found("Category not found"));
    }
    let student = require_student(db.pool(), user).await?;

    let now = now_iso();
    let flashcard = Flashcard {
        id: Uuid::new_v4().to_string(),
        title,
        visibility: input.visibility,
        category_id: input.category_id,
        student_id: student.id,
        is_approved: input.visibility.approved_on_arrival(),
        approved_by: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    };
    let items: Vec<FlashcardItem> = contents
        .into_iter()
        .map(|(term, answer)| new_item(&flashcard.id, term, answer, &now))
        .collect();

    let mut uow = db.begin("create_flashcard").await?;
    let result = persist_new_deck(&mut uow, &flashcard, &items).await;
    uow.finish(result).await?;

    tracing::info!(
        flashcard_id = %flashcard.id,
        student_id = %flashcard.student_id,
        items = items.len(),
        visibility = flashcard.visibility.as_str(),
        "flashcard created"
    );

    Ok(FlashcardWithItems { flashcard, items })
}

async fn persist_new_deck(
    uow: &mut UnitOfWork,
    flashcard: &Flashcard,
    items: &[FlashcardItem],
) -> Result<(), FlashcardError> {
    insert_flashcard(uow.conn(), flashcard)
        .await
        .map_err(title_conflict)?;
    for item in items {
        insert_item(uow.conn(), item).await?;
    }
    Ok(())
}

pub async fn list_flashcards(
    db: &DatabaseProxy,
    filter: &FlashcardFilter,
    params: &PageParams,
) -> Result<(Vec<Flashcard>, PageMeta), FlashcardError> {
    let pagination = Pagination::resolve(params, FLASHCARD_SORTABLE);
    let (flashcards, count) =
        crate::db::operations::list_flashcards(db.pool(), filter, &pagination).await?;
    Ok((flashcards, pagination.meta(count)))
}

/// Assembles a deck for the caller.
///
/// Teachers, admins and students without progress see every card with
/// default flags. A student with a history sees the cards in history order
/// with their own flags; cards added since the history was started are
/// appended to it first.
pub async fn get_flashcard_view(
    db: &DatabaseProxy,
    user: &AuthUser,
    flashcard_id: &str,
) -> Result<FlashcardView, FlashcardError> {
    let flashcard = find_flashcard(db.pool(), flashcard_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard not found"))?;

    let actor = resolve_actor(db.pool(), user).await?;
    if let Some(student) = actor.student() {
        ensure_visible(&flashcard, student)?;
    }

    let viewer_id = actor.student().map(|student| student.id.as_str());
    let entries = list_items_for_viewer(db.pool(), &flashcard.id, viewer_id).await?;
    if entries.is_empty() {
        return Err(FlashcardError::not_found("Flashcard items not found"));
    }

    let history = match actor.student() {
        Some(student) => {
            let mut conn = db.pool().acquire().await?;
            find_history(&mut conn, &student.id, &flashcard.id).await?
        }
        None => None,
    };

    let Some(history) = history else {
        let items = entries.iter().map(ItemView::unstudied).collect();
        return Ok(FlashcardView {
            flashcard,
            items,
            has_history: false,
        });
    };

    let current_ids: Vec<String> = entries.iter().map(|entry| entry.item.id.clone()).collect();
    let history = if is_in_sync(&history.interactions, &current_ids) {
        history
    } else {
        let mut uow = db.begin("backfill_history").await?;
        let result = reconcile_in(&mut uow, history, &current_ids, &now_iso()).await;
        uow.finish(result).await?
    };

    let by_id: HashMap<&str, &ViewerItem> = entries
        .iter()
        .map(|entry| (entry.item.id.as_str(), entry))
        .collect();
    let items = history
        .interactions
        .iter()
        .filter_map(|interaction| {
            by_id
                .get(interaction.card_id.as_str())
                .map(|entry| ItemView::with_progress(entry, interaction))
        })
        .collect();

    Ok(FlashcardView {
        flashcard,
        items,
        has_history: true,
    })
}

/// Edits deck fields and applies mixed-mode item changes in one unit of work.
pub async fn update_flashcard(
    db: &DatabaseProxy,
    user: &AuthUser,
    flashcard_id: &str,
    input: UpdateFlashcardInput,
) -> Result<FlashcardWithItems, FlashcardError> {
    let mut sources = Vec::new();
    let title = input
        .title
        .as_deref()
        .map(|raw| checked_title(raw, &mut sources));
    let changes: Vec<(Option<String>, String, String)> = input
        .items
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, change)| {
            let (term, answer) = checked_item(index, &change.term, &change.answer, &mut sources);
            (change.id, term, answer)
        })
        .collect();
    if !sources.is_empty() {
        return Err(FlashcardError::Validation(sources));
    }

    let mut flashcard = find_flashcard(db.pool(), flashcard_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard not found"))?;
    let actor = resolve_actor(db.pool(), user).await?;
    if !actor.can_modify(&flashcard) {
        return Err(FlashcardError::Forbidden(
            "You are not allowed to modify this flashcard".to_string(),
        ));
    }

    let now = now_iso();
    if let Some(title) = title {
        flashcard.title = title;
    }
    if let Some(visibility) = input.visibility {
        if visibility != flashcard.visibility {
            flashcard.visibility = visibility;
            flashcard.is_approved = visibility.approved_on_arrival();
            flashcard.approved_by = None;
        }
    }
    flashcard.updated_at = now.clone();

    let mut uow = db.begin("update_flashcard").await?;
    let result = apply_deck_update(&mut uow, &flashcard, &changes, &now).await;
    let created = uow.finish(result).await?;

    let items = list_items(db.pool(), &flashcard.id).await?;
    tracing::info!(
        flashcard_id = %flashcard.id,
        user_id = %user.id,
        changed_items = changes.len(),
        created_items = created,
        "flashcard updated"
    );

    Ok(FlashcardWithItems { flashcard, items })
}

async fn apply_deck_update(
    uow: &mut UnitOfWork,
    flashcard: &Flashcard,
    changes: &[(Option<String>, String, String)],
    now: &str,
) -> Result<usize, FlashcardError> {
    // Deck row first: the transaction must own the write lock before reading items.
    save_flashcard(uow.conn(), flashcard)
        .await
        .map_err(title_conflict)?;
    if changes.is_empty() {
        return Ok(0);
    }

    let existing: HashSet<String> = list_items(uow.conn(), &flashcard.id)
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();

    let mut created = 0;
    for (id, term, answer) in changes {
        match id {
            Some(item_id) => {
                if !existing.contains(item_id) {
                    return Err(FlashcardError::BadRequest(format!(
                        "Flashcard item {item_id} does not belong to this flashcard"
                    )));
                }
                update_item_content(uow.conn(), item_id, term, answer, now).await?;
            }
            None => {
                let item = new_item(&flashcard.id, term.clone(), answer.clone(), now);
                insert_item(uow.conn(), &item).await?;
                created += 1;
            }
        }
    }

    if created > 0 {
        let current_ids: Vec<String> = list_items(uow.conn(), &flashcard.id)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        let histories = list_histories_for_flashcard(uow.conn(), &flashcard.id).await?;
        for history in histories {
            reconcile_in(uow, history, &current_ids, now).await?;
        }
    }

    Ok(created)
}

/// Removes one card, its favorites and every history entry pointing at it.
pub async fn delete_flashcard_item(
    db: &DatabaseProxy,
    user: &AuthUser,
    item_id: &str,
) -> Result<FlashcardItem, FlashcardError> {
    let item = find_item(db.pool(), item_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard item not found"))?;
    let flashcard = find_flashcard(db.pool(), &item.flashcard_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard not found"))?;

    let actor = resolve_actor(db.pool(), user).await?;
    if !actor.can_modify(&flashcard) {
        return Err(FlashcardError::Forbidden(
            "You are not allowed to modify this flashcard".to_string(),
        ));
    }

    let mut uow = db.begin("delete_flashcard_item").await?;
    let result = remove_item(&mut uow, &item.id).await;
    let pruned = uow.finish(result).await?;

    tracing::info!(
        item_id = %item.id,
        flashcard_id = %flashcard.id,
        pruned_interactions = pruned,
        "flashcard item deleted"
    );

    Ok(item)
}

async fn remove_item(uow: &mut UnitOfWork, item_id: &str) -> Result<u64, FlashcardError> {
    if delete_item(uow.conn(), item_id).await? == 0 {
        return Err(FlashcardError::not_found("Flashcard item not found"));
    }
    delete_favorites_for_item(uow.conn(), item_id).await?;
    let pruned = prune_card_from_histories(uow.conn(), item_id).await?;
    Ok(pruned)
}

/// Approves a pending public deck on behalf of the calling teacher.
pub async fn approve_flashcard(
    db: &DatabaseProxy,
    user: &AuthUser,
    flashcard_id: &str,
) -> Result<Flashcard, FlashcardError> {
    let teacher = find_teacher_by_user_id(db.pool(), &user.id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Teacher not found"))?;

    let approved =
        approve_pending_flashcard(db.pool(), flashcard_id, &teacher.id, &now_iso()).await?;
    if !approved {
        return Err(FlashcardError::not_found(
            "No pending public flashcard found to approve",
        ));
    }

    let flashcard = find_flashcard(db.pool(), flashcard_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard not found"))?;

    tracing::info!(flashcard_id = %flashcard.id, teacher_id = %teacher.id, "flashcard approved");
    Ok(flashcard)
}

/// Records a swipe on one card and returns the student's updated history.
pub async fn swipe_item(
    db: &DatabaseProxy,
    user: &AuthUser,
    item_id: &str,
    direction: SwipeDirection,
) -> Result<FlashcardHistory, FlashcardError> {
    let item = find_item(db.pool(), item_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard item not found"))?;
    let flashcard = find_flashcard(db.pool(), &item.flashcard_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard not found"))?;
    let student = require_student(db.pool(), user).await?;
    ensure_visible(&flashcard, &student)?;

    let mut uow = db.begin("swipe_flashcard_item").await?;
    let result = record_swipe(&mut uow, &student.id, &flashcard.id, &item.id, direction).await;
    let history = uow.finish(result).await?;

    tracing::info!(
        item_id = %item.id,
        student_id = %student.id,
        direction = ?direction,
        "flashcard item swiped"
    );

    Ok(history)
}

async fn record_swipe(
    uow: &mut UnitOfWork,
    student_id: &str,
    flashcard_id: &str,
    card_id: &str,
    direction: SwipeDirection,
) -> Result<FlashcardHistory, FlashcardError> {
    let now = now_iso();

    // Insert-if-absent comes first so the transaction starts with a write.
    let (history, created) = ensure_history(uow.conn(), student_id, flashcard_id, &now).await?;
    if created {
        tracing::debug!(history_id = %history.id, student_id, flashcard_id, "history started");
    }

    let current_ids: Vec<String> = list_items(uow.conn(), flashcard_id)
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();
    let mut history = reconcile_in(uow, history, &current_ids, &now).await?;

    let Some(interaction) = history
        .interactions
        .iter_mut()
        .find(|entry| entry.card_id == card_id)
    else {
        return Err(FlashcardError::Integrity(format!(
            "card {card_id} missing from history {} after sync",
            history.id
        )));
    };

    let effect = direction.apply(interaction);
    save_interaction(uow.conn(), &history.id, interaction).await?;
    if effect.counts_view {
        increment_view_count(uow.conn(), card_id).await?;
    }
    touch_history(uow.conn(), &history.id, &now).await?;
    history.updated_at = now;

    Ok(history)
}

/// Adds the card to the student's favorites, or removes it if already there.
pub async fn toggle_favorite(
    db: &DatabaseProxy,
    user: &AuthUser,
    item_id: &str,
) -> Result<FavoriteToggle, FlashcardError> {
    let item = find_item(db.pool(), item_id)
        .await?
        .ok_or_else(|| FlashcardError::not_found("Flashcard item not found"))?;
    let student = require_student(db.pool(), user).await?;

    let removed = remove_favorite(db.pool(), &item.id, &student.id).await? > 0;
    if !removed {
        add_favorite(db.pool(), &item.id, &student.id, &now_iso()).await?;
    }

    tracing::info!(item_id = %item.id, student_id = %student.id, favorite = !removed, "favorite toggled");
    Ok(FavoriteToggle {
        item_id: item.id,
        is_favorite: !removed,
    })
}

pub async fn list_favorites(
    db: &DatabaseProxy,
    user: &AuthUser,
) -> Result<Vec<FavoriteItem>, FlashcardError> {
    let student = require_student(db.pool(), user).await?;
    let items = list_favorite_items(db.pool(), &student.id).await?;
    Ok(items
        .into_iter()
        .map(|item| FavoriteItem {
            item,
            is_favorite: true,
        })
        .collect())
}
